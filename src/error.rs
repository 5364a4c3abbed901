//! Error types.
//!
//! `StoreError` is what a persistence backend reports. `SyncError` is the
//! taxonomy the rest of the crate works with:
//! - validation failures, caught before anything is mutated
//! - missing entities
//! - transient network / backend failures
//! - writes the backend refused
//! - deadlines that elapsed

use std::time::Duration;

/// Message shown to the user for every non-validation failure.
pub const SYNC_FAILED_MESSAGE: &str = "sync failed, please refresh";

/// Failure reported by a persistence backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No document with this id in the collection
    #[error("{collection}/{id} not found")]
    NotFound { collection: String, id: String },

    /// Backend could not be reached
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// Backend accepted the request but refused the write
    #[error("write rejected: {0}")]
    Rejected(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed document: {0}")]
    Json(#[from] serde_json::Error),
}

/// Error taxonomy for board and sync operations.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Missing or invalid input; nothing was applied
    #[error("validation failed: {0}")]
    Validation(String),

    /// Referenced entity is absent server-side
    #[error("not found: {0}")]
    NotFound(String),

    /// Network failure or unreachable backend
    #[error("transient failure: {0}")]
    Transient(String),

    /// The authoritative store refused the write
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// The request did not complete within the deadline
    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
}

impl SyncError {
    #[inline]
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, SyncError::Validation(_))
    }

    /// Validation errors speak for themselves; everything else collapses
    /// into one retry/refresh message.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            SyncError::Validation(msg) => msg.clone(),
            _ => SYNC_FAILED_MESSAGE.to_string(),
        }
    }

    /// HTTP status used by the endpoint layer.
    #[must_use]
    pub fn status_code(&self) -> http::StatusCode {
        match self {
            SyncError::Validation(_) => http::StatusCode::BAD_REQUEST,
            SyncError::NotFound(_) => http::StatusCode::NOT_FOUND,
            SyncError::Timeout(_) => http::StatusCode::GATEWAY_TIMEOUT,
            SyncError::Transient(_) | SyncError::Persistence(_) => {
                http::StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => SyncError::NotFound(err.to_string()),
            StoreError::Unavailable(_) | StoreError::Io(_) => SyncError::Transient(err.to_string()),
            StoreError::Rejected(_) | StoreError::Json(_) => SyncError::Persistence(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_map_onto_taxonomy() {
        let nf: SyncError = StoreError::NotFound { collection: "tasks".into(), id: "t1".into() }.into();
        assert!(matches!(nf, SyncError::NotFound(_)));
        let down: SyncError = StoreError::Unavailable("offline".into()).into();
        assert!(matches!(down, SyncError::Transient(_)));
        let refused: SyncError = StoreError::Rejected("constraint".into()).into();
        assert!(matches!(refused, SyncError::Persistence(_)));
    }

    #[test]
    fn test_user_message_collapses_non_validation_errors() {
        assert_eq!(SyncError::Validation("title is required".into()).user_message(), "title is required");
        assert_eq!(SyncError::Timeout(Duration::from_secs(1)).user_message(), SYNC_FAILED_MESSAGE);
        assert_eq!(SyncError::NotFound("x".into()).status_code(), http::StatusCode::NOT_FOUND);
    }
}
