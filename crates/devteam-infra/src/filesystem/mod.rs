//! Filesystem layout helpers for devteam.

use std::path::{Path, PathBuf};

/// Environment variable that overrides the data directory.
pub const DATA_DIR_ENV: &str = "DEVTEAM_DATA_DIR";

/// Resolve the data directory from environment or platform defaults.
///
/// Priority:
/// 1. `DEVTEAM_DATA_DIR` environment variable
/// 2. `~/.devteam`
/// 3. `./.devteam`
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".devteam");
    }

    PathBuf::from(".devteam")
}

/// Path of the append-only JSON error log.
pub fn error_log_path(data_dir: &Path) -> PathBuf {
    data_dir.join("workflow-errors.log")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_data_dir_from_env() {
        // SAFETY: This test is the only one touching this variable and restores it immediately.
        unsafe {
            std::env::set_var(DATA_DIR_ENV, "/tmp/test-devteam");
        }
        let dir = resolve_data_dir();
        assert_eq!(dir, PathBuf::from("/tmp/test-devteam"));
        unsafe {
            std::env::remove_var(DATA_DIR_ENV);
        }
    }

    #[test]
    fn test_error_log_path() {
        assert_eq!(
            error_log_path(Path::new("/home/dev/.devteam")),
            PathBuf::from("/home/dev/.devteam/workflow-errors.log")
        );
    }
}
