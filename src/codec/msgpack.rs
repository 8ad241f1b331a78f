//! MsgPack codec using `rmp-serde`.
//!
//! Uses `to_vec_named` so structs travel as maps keyed by field name. A peer
//! that adds or reorders fields still decodes, and an encoded struct is never
//! an empty byte string.
//!
//! Argument lists are encoded as tuples, which MessagePack writes as arrays.
//!
//! # Example
//!
//! ```
//! use duplex_rpc::codec::{MsgPackCodec, PayloadCodec};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Vec3 {
//!     x: f32,
//!     y: f32,
//!     z: f32,
//! }
//!
//! let v = Vec3 { x: 1.0, y: -2.5, z: 0.125 };
//! let encoded = MsgPackCodec::encode(&v).unwrap();
//! let decoded: Vec3 = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, v);
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::PayloadCodec;
use crate::error::Result;

/// MessagePack codec for structured data.
pub struct MsgPackCodec;

impl PayloadCodec for MsgPackCodec {
    const NAME: &'static str = "msgpack";

    #[inline]
    fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    #[inline]
    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}
