//! Limits and timeouts shared by callers and dispatchers.
//!
//! Every timeout is optional. `None` waits forever, which is the right
//! setting for a dispatcher whose peer may stay quiet for a long time.
//!
//! Settings can be built with the fluent setters or loaded from JSON:
//!
//! ```
//! use duplex_rpc::RpcConfig;
//!
//! let config = RpcConfig::from_json(r#"{ "response_timeout_ms": 250 }"#).unwrap();
//! assert_eq!(config.response_timeout.unwrap().as_millis(), 250);
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, RpcError};
use crate::protocol::{
    FrameLimits, ABSOLUTE_MAX_PAYLOAD_SIZE, DEFAULT_MAX_METHOD_NAME_LEN, DEFAULT_MAX_PAYLOAD_SIZE,
};

/// Default timeout for establishing a pipe connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default timeout for writing one frame.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(30);

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcConfig {
    /// Largest payload accepted or sent.
    pub max_payload_size: u32,
    /// Longest operation name accepted or sent.
    pub max_method_name_len: u32,
    /// Limit for connecting to or accepting a pipe.
    pub connect_timeout: Option<Duration>,
    /// Limit for writing one frame.
    pub write_timeout: Option<Duration>,
    /// Limit for the caller waiting on a response.
    pub response_timeout: Option<Duration>,
    /// Limit for the dispatcher waiting on the next request.
    pub idle_timeout: Option<Duration>,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            max_method_name_len: DEFAULT_MAX_METHOD_NAME_LEN,
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
            write_timeout: Some(DEFAULT_WRITE_TIMEOUT),
            response_timeout: None,
            idle_timeout: None,
        }
    }
}

impl RpcConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum payload size.
    ///
    /// Default: 1 GB. Cannot exceed `i32::MAX`.
    pub fn max_payload_size(mut self, size: u32) -> Self {
        self.max_payload_size = size;
        self
    }

    /// Set the maximum operation name length.
    ///
    /// Default: 1024 bytes
    pub fn max_method_name_len(mut self, len: u32) -> Self {
        self.max_method_name_len = len;
        self
    }

    /// Set the connect/accept timeout.
    pub fn connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the per-frame write timeout.
    pub fn write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set how long a caller waits for a response.
    pub fn response_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Set how long a dispatcher waits for the next request.
    pub fn idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Check that all values are in range.
    pub fn validate(&self) -> Result<()> {
        if self.max_payload_size == 0 || self.max_payload_size > ABSOLUTE_MAX_PAYLOAD_SIZE {
            return Err(RpcError::InvalidConfig(format!(
                "max_payload_size must be in 1..={}, got {}",
                ABSOLUTE_MAX_PAYLOAD_SIZE, self.max_payload_size
            )));
        }
        if self.max_method_name_len == 0 {
            return Err(RpcError::InvalidConfig(
                "max_method_name_len must be at least 1".to_string(),
            ));
        }
        let timeouts = [
            ("connect_timeout", self.connect_timeout),
            ("write_timeout", self.write_timeout),
            ("response_timeout", self.response_timeout),
            ("idle_timeout", self.idle_timeout),
        ];
        for (name, value) in timeouts {
            if value == Some(Duration::ZERO) {
                return Err(RpcError::InvalidConfig(format!(
                    "{} must be non-zero, use None to disable it",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Frame size limits derived from this configuration.
    pub fn frame_limits(&self) -> FrameLimits {
        FrameLimits {
            max_payload_size: self.max_payload_size,
            max_method_name_len: self.max_method_name_len,
        }
    }

    /// Parse a JSON document. Missing keys keep their defaults.
    ///
    /// Timeouts are given in milliseconds; `null` disables a timeout.
    pub fn from_json(json: &str) -> Result<Self> {
        let file: ConfigFile = serde_json::from_str(json)?;
        let config = file.apply(Self::default());
        config.validate()?;
        Ok(config)
    }
}

/// On-disk shape of [`RpcConfig`].
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    max_payload_size: Option<u32>,
    max_method_name_len: Option<u32>,
    #[serde(default, deserialize_with = "explicit")]
    connect_timeout_ms: Option<Option<u64>>,
    #[serde(default, deserialize_with = "explicit")]
    write_timeout_ms: Option<Option<u64>>,
    #[serde(default, deserialize_with = "explicit")]
    response_timeout_ms: Option<Option<u64>>,
    #[serde(default, deserialize_with = "explicit")]
    idle_timeout_ms: Option<Option<u64>>,
}

/// Distinguish an explicit `null` from a missing key.
fn explicit<'de, D>(deserializer: D) -> std::result::Result<Option<Option<u64>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<u64>::deserialize(deserializer).map(Some)
}

impl ConfigFile {
    fn apply(self, mut config: RpcConfig) -> RpcConfig {
        let millis = |v: Option<u64>| v.map(Duration::from_millis);
        if let Some(size) = self.max_payload_size {
            config.max_payload_size = size;
        }
        if let Some(len) = self.max_method_name_len {
            config.max_method_name_len = len;
        }
        if let Some(v) = self.connect_timeout_ms {
            config.connect_timeout = millis(v);
        }
        if let Some(v) = self.write_timeout_ms {
            config.write_timeout = millis(v);
        }
        if let Some(v) = self.response_timeout_ms {
            config.response_timeout = millis(v);
        }
        if let Some(v) = self.idle_timeout_ms {
            config.idle_timeout = millis(v);
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RpcConfig::default();
        assert_eq!(config.max_payload_size, DEFAULT_MAX_PAYLOAD_SIZE);
        assert_eq!(config.connect_timeout, Some(DEFAULT_CONNECT_TIMEOUT));
        assert!(config.response_timeout.is_none());
        assert!(config.idle_timeout.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_chain() {
        let config = RpcConfig::new()
            .max_payload_size(4096)
            .max_method_name_len(64)
            .response_timeout(Some(Duration::from_millis(100)))
            .write_timeout(None);
        assert_eq!(config.frame_limits().max_payload_size, 4096);
        assert_eq!(config.frame_limits().max_method_name_len, 64);
        assert_eq!(config.response_timeout, Some(Duration::from_millis(100)));
        assert!(config.write_timeout.is_none());
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        assert!(RpcConfig::new().max_payload_size(0).validate().is_err());
        assert!(RpcConfig::new()
            .max_payload_size(ABSOLUTE_MAX_PAYLOAD_SIZE + 1)
            .validate()
            .is_err());
        assert!(RpcConfig::new().max_method_name_len(0).validate().is_err());
        let err = RpcConfig::new()
            .idle_timeout(Some(Duration::ZERO))
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("idle_timeout"));
    }

    #[test]
    fn test_from_json_partial() {
        let config = RpcConfig::from_json(
            r#"{ "max_payload_size": 1024, "write_timeout_ms": null, "idle_timeout_ms": 2000 }"#,
        )
        .unwrap();
        assert_eq!(config.max_payload_size, 1024);
        assert!(config.write_timeout.is_none());
        assert_eq!(config.idle_timeout, Some(Duration::from_secs(2)));
        // Untouched keys keep defaults.
        assert_eq!(config.connect_timeout, Some(DEFAULT_CONNECT_TIMEOUT));
    }

    #[test]
    fn test_from_json_rejects_unknown_and_invalid() {
        assert!(matches!(
            RpcConfig::from_json(r#"{ "max_payload": 1 }"#),
            Err(RpcError::Json(_))
        ));
        assert!(matches!(
            RpcConfig::from_json(r#"{ "max_payload_size": 0 }"#),
            Err(RpcError::InvalidConfig(_))
        ));
    }
}
