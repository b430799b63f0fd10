use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StashError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("No quorum answer: {0}")]
    QuorumFailure(String),

    #[error("Block placement failed: {0}")]
    PlacementFailure(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Consensus error: {0}")]
    Consensus(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error classes that survive a trip through a contract reply or an RPC
/// error body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Conflict,
    QuorumFailure,
    PlacementFailure,
    Decode,
    InvalidRequest,
    Internal,
}

impl StashError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::QuorumFailure(_) => ErrorKind::QuorumFailure,
            Self::PlacementFailure(_) => ErrorKind::PlacementFailure,
            Self::Decode(_) | Self::Serialization(_) => ErrorKind::Decode,
            Self::InvalidRequest(_) | Self::Config(_) => ErrorKind::InvalidRequest,
            Self::Consensus(_)
            | Self::Database(_)
            | Self::Io(_)
            | Self::Http(_)
            | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Rebuild an error from a kind and message received from a peer.
    pub fn from_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            ErrorKind::NotFound => Self::NotFound(message),
            ErrorKind::Conflict => Self::Conflict(message),
            ErrorKind::QuorumFailure => Self::QuorumFailure(message),
            ErrorKind::PlacementFailure => Self::PlacementFailure(message),
            ErrorKind::Decode => Self::Decode(message),
            ErrorKind::InvalidRequest => Self::InvalidRequest(message),
            ErrorKind::Internal => Self::Internal(message),
        }
    }

    /// Misses and missing answers may resolve on retry; conflicts and bad
    /// payloads need the caller to change the request.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::NotFound | ErrorKind::QuorumFailure | ErrorKind::PlacementFailure
        )
    }
}

pub type Result<T> = std::result::Result<T, StashError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trip_keeps_class() {
        let err = StashError::Conflict("lock already acquired".to_string());
        let rebuilt = StashError::from_kind(err.kind(), err.to_string());
        assert_eq!(rebuilt.kind(), ErrorKind::Conflict);
        assert!(!rebuilt.is_retryable());
    }

    #[test]
    fn test_retryable_classes() {
        assert!(StashError::NotFound("file".into()).is_retryable());
        assert!(StashError::QuorumFailure("no votes".into()).is_retryable());
        assert!(StashError::PlacementFailure("no hosts".into()).is_retryable());
        assert!(!StashError::Decode("garbage".into()).is_retryable());
    }
}
