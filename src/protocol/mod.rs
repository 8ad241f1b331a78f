//! Protocol module - wire format, frames, and stream I/O.
//!
//! This module implements the binary framing shared by both directions:
//! - Little-endian length prefixes and the signed response status
//! - Request and response frame types
//! - Async reading and writing of whole frames over any byte stream

mod frame;
mod io;
mod wire_format;

pub use frame::{RequestFrame, ResponseFrame};
pub use io::{
    read_request, read_request_buffered, read_response, write_request, write_response,
};
pub use wire_format::{
    decode_length, encode_length, FrameLimits, ResponseHeader, ResponseStatus,
    ABSOLUTE_MAX_PAYLOAD_SIZE, DEFAULT_MAX_METHOD_NAME_LEN, DEFAULT_MAX_PAYLOAD_SIZE,
    LENGTH_PREFIX_SIZE,
};
