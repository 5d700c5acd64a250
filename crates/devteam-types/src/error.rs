use thiserror::Error;

/// Errors from repository operations (used by trait definitions in devteam-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_display() {
        let err = RepositoryError::Query("syntax error".to_string());
        assert_eq!(err.to_string(), "query error: syntax error");
    }

    #[test]
    fn test_corrupt_error_display() {
        let err = RepositoryError::Corrupt("invalid context json".to_string());
        assert_eq!(err.to_string(), "corrupt record: invalid context json");
    }
}
