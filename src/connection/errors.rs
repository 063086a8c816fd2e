use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConnectionError {
    #[error("connection refused by {0}")]
    Refused(String),

    #[error("handshake timed out after {0:?}")]
    Timeout(Duration),

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("no client in the pool accepted the mission")]
    NoClientAvailable,

    #[error("invalid scenario: {0}")]
    InvalidScenario(String),

    #[error("a mission is already running")]
    AlreadyRunning,

    #[error("commands connection is not open; is the mission running?")]
    NotRunning,
}

impl ConnectionError {
    /// Transient failures worth another start attempt. A malformed scenario
    /// or a busy connection fails the same way every time.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ConnectionError::Refused(_)
                | ConnectionError::Timeout(_)
                | ConnectionError::Handshake(_)
                | ConnectionError::Transport(_)
                | ConnectionError::NoClientAvailable
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ConnectionError::Refused("127.0.0.1:10000".into()).is_retryable());
        assert!(ConnectionError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(ConnectionError::NoClientAvailable.is_retryable());
        assert!(!ConnectionError::InvalidScenario("bad".into()).is_retryable());
        assert!(!ConnectionError::AlreadyRunning.is_retryable());
        assert!(!ConnectionError::NotRunning.is_retryable());
    }
}
