//! Request and response frames.
//!
//! Frames own their payload as `bytes::Bytes`, so handing a payload from
//! the reader to a handler task never copies it.
//!
//! # Example
//!
//! ```
//! use duplex_rpc::protocol::{RequestFrame, ResponseFrame};
//! use bytes::Bytes;
//!
//! let request = RequestFrame::new("ping", Bytes::from_static(b"\x91\x29"));
//! assert_eq!(request.method(), "ping");
//!
//! let response = ResponseFrame::void();
//! assert!(!response.is_error());
//! assert!(response.payload().is_empty());
//! ```

use bytes::Bytes;

use super::wire_format::{ResponseHeader, ResponseStatus};
use crate::error::{Result, RpcError};

/// A call: operation name plus encoded arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFrame {
    method: String,
    payload: Bytes,
}

impl RequestFrame {
    /// Create a new request frame.
    pub fn new(method: impl Into<String>, payload: Bytes) -> Self {
        Self {
            method: method.into(),
            payload,
        }
    }

    /// The operation name.
    #[inline]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The encoded arguments.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get a clone of the payload as Bytes (cheap, zero-copy).
    #[inline]
    pub fn payload_bytes(&self) -> Bytes {
        self.payload.clone()
    }

    /// Consume into name and payload.
    pub fn into_parts(self) -> (String, Bytes) {
        (self.method, self.payload)
    }
}

/// The answer to a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    status: ResponseStatus,
    payload: Bytes,
}

impl ResponseFrame {
    /// Successful response. An empty payload means the operation returns nothing.
    pub fn success(payload: Bytes) -> Self {
        Self {
            status: ResponseStatus::Success,
            payload,
        }
    }

    /// Successful response of a void operation.
    pub fn void() -> Self {
        Self::success(Bytes::new())
    }

    /// Error response carrying an encoded envelope.
    ///
    /// Fails on an empty payload, which would be indistinguishable from void.
    pub fn error(envelope: Bytes) -> Result<Self> {
        if envelope.is_empty() {
            return Err(RpcError::Protocol(
                "Error response must carry an envelope".to_string(),
            ));
        }
        Ok(Self {
            status: ResponseStatus::Error,
            payload: envelope,
        })
    }

    pub(crate) fn from_header(header: ResponseHeader, payload: Bytes) -> Self {
        Self {
            status: header.status,
            payload,
        }
    }

    /// Success or error.
    #[inline]
    pub fn status(&self) -> ResponseStatus {
        self.status
    }

    /// Check if this is an error response.
    #[inline]
    pub fn is_error(&self) -> bool {
        self.status == ResponseStatus::Error
    }

    /// The payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Consume into the payload.
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// The status prefix for this frame.
    pub fn header(&self) -> Result<ResponseHeader> {
        let len = u32::try_from(self.payload.len()).map_err(|_| {
            RpcError::Protocol(format!(
                "Response payload size {} does not fit into i32",
                self.payload.len()
            ))
        })?;
        Ok(ResponseHeader::new(self.status, len))
    }
}
