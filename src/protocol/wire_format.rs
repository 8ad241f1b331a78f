//! Wire format encoding and decoding.
//!
//! Every integer on the wire is a 4-byte little-endian prefix. A request is:
//! ```text
//! ┌──────────┬──────────────┬─────────────┬─────────────┐
//! │ Name Len │ Name (UTF-8) │ Payload Len │ Payload     │
//! │ u32 LE   │ name_len B   │ u32 LE      │ payload_len │
//! └──────────┴──────────────┴─────────────┴─────────────┘
//! ```
//!
//! A response is a signed length followed by that many bytes:
//! ```text
//! ┌──────────┬───────────────────────────────┐
//! │ Status   │ Payload                       │
//! │ i32 LE   │ |status| bytes                │
//! └──────────┴───────────────────────────────┘
//!   > 0  success carrying a return value
//!   = 0  success without a value (void operation)
//!   < 0  error, payload is an encoded error envelope
//! ```

use crate::error::{Result, RpcError};

/// Size of every length prefix in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Default maximum payload size (1 GB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: u32 = 1_073_741_824;

/// Absolute maximum payload size (~2 GB, max i32).
///
/// The response status is a signed 32-bit length, so nothing larger fits.
pub const ABSOLUTE_MAX_PAYLOAD_SIZE: u32 = i32::MAX as u32;

/// Default maximum operation name length in bytes.
pub const DEFAULT_MAX_METHOD_NAME_LEN: u32 = 1024;

/// Size limits enforced while reading frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLimits {
    /// Largest accepted payload in bytes.
    pub max_payload_size: u32,
    /// Largest accepted operation name in bytes.
    pub max_method_name_len: u32,
}

impl Default for FrameLimits {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            max_method_name_len: DEFAULT_MAX_METHOD_NAME_LEN,
        }
    }
}

impl FrameLimits {
    /// Reject a payload length above the limit.
    pub fn check_payload(&self, len: u64) -> Result<()> {
        if len > u64::from(self.max_payload_size) {
            return Err(RpcError::Protocol(format!(
                "Payload size {} exceeds maximum {}",
                len, self.max_payload_size
            )));
        }
        Ok(())
    }

    /// Reject an operation name length above the limit.
    pub fn check_method_name(&self, len: u64) -> Result<()> {
        if len > u64::from(self.max_method_name_len) {
            return Err(RpcError::Protocol(format!(
                "Method name length {} exceeds maximum {}",
                len, self.max_method_name_len
            )));
        }
        Ok(())
    }
}

/// Outcome carried by a response status prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    /// The call completed; the payload is the encoded return value.
    Success,
    /// The call failed; the payload is an encoded error envelope.
    Error,
}

/// Decoded response status prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    /// Success or error.
    pub status: ResponseStatus,
    /// Length of the payload that follows.
    pub payload_length: u32,
}

impl ResponseHeader {
    /// Create a new response header.
    pub fn new(status: ResponseStatus, payload_length: u32) -> Self {
        Self {
            status,
            payload_length,
        }
    }

    /// Encode to the signed little-endian prefix.
    ///
    /// # Example
    ///
    /// ```
    /// use duplex_rpc::protocol::{ResponseHeader, ResponseStatus};
    ///
    /// let header = ResponseHeader::new(ResponseStatus::Error, 3);
    /// assert_eq!(header.encode().unwrap(), (-3i32).to_le_bytes());
    /// ```
    pub fn encode(&self) -> Result<[u8; LENGTH_PREFIX_SIZE]> {
        if self.payload_length > ABSOLUTE_MAX_PAYLOAD_SIZE {
            return Err(RpcError::Protocol(format!(
                "Response payload size {} exceeds maximum {}",
                self.payload_length, ABSOLUTE_MAX_PAYLOAD_SIZE
            )));
        }
        let len = self.payload_length as i32;
        let signed = match self.status {
            ResponseStatus::Success => len,
            ResponseStatus::Error => {
                if len == 0 {
                    return Err(RpcError::Protocol(
                        "Error response must carry an envelope".to_string(),
                    ));
                }
                -len
            }
        };
        Ok(signed.to_le_bytes())
    }

    /// Decode from the signed little-endian prefix.
    pub fn decode(buf: [u8; LENGTH_PREFIX_SIZE]) -> Result<Self> {
        let signed = i32::from_le_bytes(buf);
        if signed == i32::MIN {
            return Err(RpcError::Protocol(
                "Response status i32::MIN has no valid length".to_string(),
            ));
        }
        let header = if signed < 0 {
            Self::new(ResponseStatus::Error, signed.unsigned_abs())
        } else {
            Self::new(ResponseStatus::Success, signed as u32)
        };
        Ok(header)
    }

    /// Check if this is an error response.
    #[inline]
    pub fn is_error(&self) -> bool {
        self.status == ResponseStatus::Error
    }
}

/// Encode an unsigned length prefix.
///
/// Fails if the length does not fit into 32 bits.
#[inline]
pub fn encode_length(len: usize) -> Result<[u8; LENGTH_PREFIX_SIZE]> {
    let len = u32::try_from(len)
        .map_err(|_| RpcError::Protocol(format!("Length {} does not fit into u32", len)))?;
    Ok(len.to_le_bytes())
}

/// Decode an unsigned length prefix.
#[inline]
pub fn decode_length(buf: [u8; LENGTH_PREFIX_SIZE]) -> u32 {
    u32::from_le_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_little_endian_byte_order() {
        let bytes = encode_length(0x0403_0201).unwrap();
        assert_eq!(bytes, [0x01, 0x02, 0x03, 0x04]);
        assert_eq!(decode_length(bytes), 0x0403_0201);
    }

    #[test]
    fn test_success_header() {
        let header = ResponseHeader::new(ResponseStatus::Success, 5);
        let bytes = header.encode().unwrap();
        assert_eq!(bytes, [5, 0, 0, 0]);
        assert_eq!(ResponseHeader::decode(bytes).unwrap(), header);
    }

    #[test]
    fn test_void_header_is_zero() {
        let header = ResponseHeader::new(ResponseStatus::Success, 0);
        assert_eq!(header.encode().unwrap(), [0, 0, 0, 0]);
        let decoded = ResponseHeader::decode([0, 0, 0, 0]).unwrap();
        assert!(!decoded.is_error());
        assert_eq!(decoded.payload_length, 0);
    }

    #[test]
    fn test_error_header_is_negative() {
        let header = ResponseHeader::new(ResponseStatus::Error, 300);
        let bytes = header.encode().unwrap();
        assert_eq!(i32::from_le_bytes(bytes), -300);

        let decoded = ResponseHeader::decode(bytes).unwrap();
        assert!(decoded.is_error());
        assert_eq!(decoded.payload_length, 300);
    }

    #[test]
    fn test_empty_error_rejected() {
        let header = ResponseHeader::new(ResponseStatus::Error, 0);
        assert!(header.encode().is_err());
    }

    #[test]
    fn test_i32_min_rejected() {
        let result = ResponseHeader::decode(i32::MIN.to_le_bytes());
        assert!(matches!(result, Err(RpcError::Protocol(_))));
    }

    #[test]
    fn test_extreme_lengths() {
        let max = ResponseHeader::new(ResponseStatus::Error, ABSOLUTE_MAX_PAYLOAD_SIZE);
        let decoded = ResponseHeader::decode(max.encode().unwrap()).unwrap();
        assert_eq!(decoded, max);

        let too_big = ResponseHeader::new(ResponseStatus::Success, ABSOLUTE_MAX_PAYLOAD_SIZE + 1);
        assert!(too_big.encode().is_err());
    }

    #[test]
    fn test_limits() {
        let limits = FrameLimits {
            max_payload_size: 100,
            max_method_name_len: 8,
        };
        assert!(limits.check_payload(100).is_ok());
        let err = limits.check_payload(101).unwrap_err();
        assert!(err.to_string().contains("exceeds maximum"));
        assert!(limits.check_method_name(8).is_ok());
        assert!(limits.check_method_name(9).is_err());
    }

    #[test]
    fn test_default_limits() {
        let limits = FrameLimits::default();
        assert_eq!(limits.max_payload_size, DEFAULT_MAX_PAYLOAD_SIZE);
        assert_eq!(limits.max_method_name_len, DEFAULT_MAX_METHOD_NAME_LEN);
    }
}
