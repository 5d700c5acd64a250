//! Workflow state repository trait definition.
//!
//! Defines the storage interface for the persisted workflow record. The
//! infrastructure layer (devteam-infra) implements this trait with SQLite
//! persistence.

use devteam_types::error::RepositoryError;
use devteam_types::workflow::WorkflowSnapshot;

/// Repository trait for the persisted workflow record.
///
/// One record per session key holds the whole [`WorkflowSnapshot`]. Writes
/// are full replacements, never partial field updates, so a concurrent reader
/// sees either the previous snapshot or the new one.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait WorkflowStateRepository: Send + Sync {
    /// Load the record for `key`, or `None` if it was never written.
    fn load(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<Option<WorkflowSnapshot>, RepositoryError>> + Send;

    /// Replace the record for `key` with `snapshot`.
    fn save(
        &self,
        key: &str,
        snapshot: &WorkflowSnapshot,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}
