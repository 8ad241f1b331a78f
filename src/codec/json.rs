//! JSON codec using `serde_json`.
//!
//! Handy when one side of the pipe is a script or when payloads need to be
//! read in a packet capture. Floats are printed in shortest round-trip form,
//! but NaN and infinities cannot be represented; use [`MsgPackCodec`] for
//! numeric payloads.
//!
//! [`MsgPackCodec`]: super::MsgPackCodec

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::PayloadCodec;
use crate::error::Result;

/// JSON codec for structured data.
pub struct JsonCodec;

impl PayloadCodec for JsonCodec {
    const NAME: &'static str = "json";

    #[inline]
    fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    #[inline]
    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
