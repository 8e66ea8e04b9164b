use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Temporarily unavailable: {0}")]
    Transient(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// How a failed bridge call should be treated by callers that retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    /// Network or storage temporarily unavailable; the call may be re-issued.
    Transient,
    /// The target is already absent.
    NotFound,
    /// Auth failure, corrupt data, disk full. Retrying will not help.
    Permanent,
}

impl BridgeError {
    /// Classify this error for retry decisions.
    pub fn classify(&self) -> FailureClass {
        match self {
            BridgeError::NotFound(_) => FailureClass::NotFound,
            BridgeError::Transient(_) => FailureClass::Transient,
            BridgeError::Io(e) => match e.kind() {
                std::io::ErrorKind::NotFound => FailureClass::NotFound,
                std::io::ErrorKind::Interrupted
                | std::io::ErrorKind::TimedOut
                | std::io::ErrorKind::WouldBlock
                | std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::ConnectionAborted
                | std::io::ErrorKind::ConnectionRefused => FailureClass::Transient,
                _ => FailureClass::Permanent,
            },
            BridgeError::NotAvailable(_)
            | BridgeError::OperationFailed(_)
            | BridgeError::DatabaseError(_)
            | BridgeError::Unauthorized(_) => FailureClass::Permanent,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.classify() == FailureClass::NotFound
    }

    pub fn is_retryable(&self) -> bool {
        self.classify() == FailureClass::Transient
    }

    /// Map an HTTP status code to the matching error variant.
    pub fn from_status(status: u16, context: impl Into<String>) -> Self {
        let context = context.into();
        match status {
            404 | 410 => BridgeError::NotFound(context),
            401 | 403 => BridgeError::Unauthorized(context),
            408 | 429 | 500..=599 => {
                BridgeError::Transient(format!("HTTP {}: {}", status, context))
            }
            _ => BridgeError::OperationFailed(format!("HTTP {}: {}", status, context)),
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_io_errors() {
        let missing = BridgeError::Io(std::io::Error::from(std::io::ErrorKind::NotFound));
        assert_eq!(missing.classify(), FailureClass::NotFound);

        let timed_out = BridgeError::Io(std::io::Error::from(std::io::ErrorKind::TimedOut));
        assert!(timed_out.is_retryable());

        let denied = BridgeError::Io(std::io::Error::from(std::io::ErrorKind::PermissionDenied));
        assert_eq!(denied.classify(), FailureClass::Permanent);
    }

    #[test]
    fn test_from_status() {
        assert!(BridgeError::from_status(404, "a.txt").is_not_found());
        assert!(BridgeError::from_status(503, "a.txt").is_retryable());
        assert!(BridgeError::from_status(429, "a.txt").is_retryable());
        assert_eq!(
            BridgeError::from_status(401, "a.txt").classify(),
            FailureClass::Permanent
        );
        assert_eq!(
            BridgeError::from_status(400, "a.txt").classify(),
            FailureClass::Permanent
        );
    }
}
