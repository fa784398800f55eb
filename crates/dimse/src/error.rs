//! Error types for DIMSE operations

use thiserror::Error;

/// Result type alias for DIMSE operations
pub type Result<T> = std::result::Result<T, DimseError>;

/// Error types that can occur while serving an association
#[derive(Error, Debug)]
pub enum DimseError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] std::io::Error),

    #[error("DICOM parsing error: {0}")]
    DicomParsing(String),

    #[error("DICOM object error: {0}")]
    DicomObject(String),

    #[error("DICOM UL error: {0}")]
    DicomUl(String),

    #[error("Association rejected: {0}")]
    AssociationRejected(String),

    #[error("Unexpected PDU: {0}")]
    UnexpectedPdu(String),

    #[error("Bad command type: 0x{0:04X}")]
    BadCommandType(u16),

    #[error("Timeout occurred: {0}")]
    Timeout(String),

    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DimseError {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new parsing error
    pub fn parsing(msg: impl Into<String>) -> Self {
        Self::DicomParsing(msg.into())
    }

    /// Create a new upper layer error
    pub fn ul(msg: impl Into<String>) -> Self {
        Self::DicomUl(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if this error is recoverable
    ///
    /// Recoverable errors end the current association but leave the
    /// listener and every other association untouched.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DimseError::Network(_)
                | DimseError::Timeout(_)
                | DimseError::AssociationRejected(_)
                | DimseError::ChannelClosed(_)
        )
    }

    /// Check if this error is a protocol violation by the peer
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            DimseError::BadCommandType(_)
                | DimseError::UnexpectedPdu(_)
                | DimseError::DicomParsing(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(DimseError::Timeout("dimse".into()).is_recoverable());
        assert!(!DimseError::BadCommandType(0x0001).is_recoverable());
        assert!(DimseError::BadCommandType(0x0001).is_protocol_violation());
        assert!(!DimseError::config("bad").is_protocol_violation());
    }

    #[test]
    fn test_bad_command_display() {
        let err = DimseError::BadCommandType(0x0020);
        assert_eq!(err.to_string(), "Bad command type: 0x0020");
    }
}
