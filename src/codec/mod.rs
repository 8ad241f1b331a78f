//! Codec module - serialization of call arguments and return values.
//!
//! - [`MsgPackCodec`] - MessagePack using `rmp-serde` (default, bit-exact floats)
//! - [`JsonCodec`] - JSON using `serde_json` (readable, for debugging peers)
//!
//! # Design
//!
//! Codecs are marker structs implementing [`PayloadCodec`] with associated
//! functions rather than trait objects. Generated clients and dispatch tables
//! are generic over the codec, so the choice is made at compile time.
//!
//! # Example
//!
//! ```
//! use duplex_rpc::codec::{MsgPackCodec, PayloadCodec};
//!
//! let encoded = MsgPackCodec::encode(&(41i32, "ping")).unwrap();
//! let (count, name): (i32, String) = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!((count, name.as_str()), (41, "ping"));
//! ```

mod json;
mod msgpack;

pub use json::JsonCodec;
pub use msgpack::MsgPackCodec;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// A payload serializer usable for contract arguments and return values.
pub trait PayloadCodec: Send + Sync + 'static {
    /// Short codec name, used in logs.
    const NAME: &'static str;

    /// Encode a value.
    fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>>;

    /// Decode a value.
    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T>;
}
