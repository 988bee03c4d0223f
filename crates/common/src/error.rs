use thiserror::Error;

/// Common error types used across the application.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Delivery error: {0}")]
    Delivery(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether the error came from the storage layer.
    pub fn is_store_failure(&self) -> bool {
        matches!(self, AppError::Database(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_failure_classification() {
        assert!(AppError::Database(sqlx::Error::PoolTimedOut).is_store_failure());
        assert!(!AppError::Validation("bad".to_string()).is_store_failure());
    }

    #[test]
    fn test_display_includes_context() {
        let err = AppError::NotFound("Notification 42 not found".to_string());
        assert_eq!(err.to_string(), "Not found: Notification 42 not found");
    }
}
