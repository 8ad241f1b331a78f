//! Error types for duplex-rpc.

use std::time::Duration;

use thiserror::Error;

use crate::envelope::RemoteError;

/// Main error type for all duplex-rpc operations.
#[derive(Debug, Error)]
pub enum RpcError {
    /// I/O error on the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error (JSON codec, config, announcement).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// Protocol error (malformed frame, limit exceeded, bad handshake).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The remote side answered with an error response.
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    /// The stream was closed, either by the peer or locally.
    #[error("Connection closed")]
    ConnectionClosed,

    /// An I/O phase did not complete in time.
    #[error("Timed out during {phase} after {after:?}")]
    Timeout {
        /// Which phase of the exchange timed out.
        phase: &'static str,
        /// The limit that was exceeded.
        after: Duration,
    },

    /// The operation was interrupted by a shutdown handle.
    #[error("Operation cancelled")]
    Cancelled,

    /// Two operations of one contract share a name.
    #[error("Contract {contract} declares operation {operation} more than once")]
    DuplicateOperation {
        /// Contract name.
        contract: &'static str,
        /// The duplicated operation name.
        operation: String,
    },

    /// A spawned task failed to complete.
    #[error("Task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// Configuration values are out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl RpcError {
    /// True for failures of the stream itself: the exchange cannot continue.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            RpcError::Io(_) | RpcError::ConnectionClosed | RpcError::Timeout { .. } | RpcError::Cancelled
        )
    }

    /// True when the peer reported an error for this call.
    pub fn is_remote(&self) -> bool {
        matches!(self, RpcError::Remote(_))
    }

    /// The remote error, if this is one.
    pub fn as_remote(&self) -> Option<&RemoteError> {
        match self {
            RpcError::Remote(remote) => Some(remote),
            _ => None,
        }
    }

    /// Whether the stream position is unknown after this error.
    ///
    /// A remote error or a payload decoding error happens after a complete
    /// frame was consumed, so the stream is still usable.
    pub(crate) fn desyncs_stream(&self) -> bool {
        self.is_transport() || matches!(self, RpcError::Protocol(_))
    }
}

/// Result type alias using RpcError.
pub type Result<T> = std::result::Result<T, RpcError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::ErrorEnvelope;

    #[test]
    fn test_transport_classification() {
        assert!(RpcError::ConnectionClosed.is_transport());
        assert!(RpcError::Cancelled.is_transport());
        assert!(RpcError::Timeout {
            phase: "read response",
            after: Duration::from_millis(5)
        }
        .is_transport());
        assert!(RpcError::Io(std::io::Error::from(std::io::ErrorKind::BrokenPipe)).is_transport());
        assert!(!RpcError::Protocol("bad".to_string()).is_transport());
    }

    #[test]
    fn test_remote_accessors() {
        let err = RpcError::from(RemoteError::from_envelope(ErrorEnvelope::new("boom", None)));
        assert!(err.is_remote());
        assert!(!err.is_transport());
        assert!(!err.desyncs_stream());
        assert_eq!(err.as_remote().unwrap().message(), "boom");
        assert!(RpcError::ConnectionClosed.as_remote().is_none());
    }

    #[test]
    fn test_display_messages() {
        let err = RpcError::DuplicateOperation {
            contract: "Ping",
            operation: "ping".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Contract Ping declares operation ping more than once"
        );

        let err = RpcError::Timeout {
            phase: "write request",
            after: Duration::from_secs(1),
        };
        assert!(err.to_string().contains("write request"));
    }
}
