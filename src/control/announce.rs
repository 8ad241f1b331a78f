//! `$announce` message builder and parser.
//!
//! The hosting process prints one `$announce` line to stdout telling the
//! connecting process:
//! - The pipe path to connect to
//! - The contract it serves (operations, parameter and return types)
//! - Protocol version
//!
//! # Example
//!
//! ```
//! use duplex_rpc::control::{build_announce_message, parse_announcement};
//! use duplex_rpc::contract::Contract;
//!
//! duplex_rpc::contract! {
//!     #[contract(Pinger, client = PingClient)]
//!     pub trait Ping {
//!         fn ping(&self, value: i32) -> i32;
//!     }
//! }
//!
//! let line = build_announce_message("/tmp/ping.sock", Pinger::descriptor()).unwrap();
//! assert!(line.contains("$announce"));
//!
//! let announcement = parse_announcement(&line).unwrap();
//! assert_eq!(announcement.pipe, "/tmp/ping.sock");
//! announcement.ensure_compatible(Pinger::descriptor()).unwrap();
//! ```

use serde::Deserialize;
use serde_json::json;

use crate::contract::ContractDescriptor;
use crate::error::{Result, RpcError};

/// Protocol version string. Peers must agree on the major component.
pub const PROTOCOL_VERSION: &str = "1.0.0";

/// JSON-RPC method name of the announcement line.
pub const ANNOUNCE_METHOD: &str = "$announce";

/// Build the `$announce` JSON-RPC line for a pipe and contract.
pub fn build_announce_message(pipe_path: &str, contract: &ContractDescriptor) -> Result<String> {
    let msg = json!({
        "jsonrpc": "2.0",
        "method": ANNOUNCE_METHOD,
        "params": {
            "pipe": pipe_path,
            "contract": contract,
            "version": PROTOCOL_VERSION
        }
    });

    Ok(serde_json::to_string(&msg)?)
}

/// Parameter as announced by the host.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AnnouncedParam {
    /// Parameter name.
    pub name: String,
    /// Parameter type as written in the host's contract.
    pub ty: String,
}

/// Operation as announced by the host.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AnnouncedOperation {
    /// Operation name.
    pub name: String,
    /// Ordered parameters.
    #[serde(default)]
    pub params: Vec<AnnouncedParam>,
    /// Return type, `None` for void.
    #[serde(default)]
    pub returns: Option<String>,
}

/// Contract as announced by the host.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AnnouncedContract {
    /// Contract name.
    pub name: String,
    /// Operations in declaration order.
    pub operations: Vec<AnnouncedOperation>,
}

/// Parsed `$announce` parameters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Announcement {
    /// Pipe path to connect to.
    pub pipe: String,
    /// The served contract.
    pub contract: AnnouncedContract,
    /// Host protocol version.
    pub version: String,
}

#[derive(Deserialize)]
struct AnnounceLine {
    jsonrpc: String,
    method: String,
    params: Announcement,
}

/// Parse one line read from the host's stdout.
pub fn parse_announcement(line: &str) -> Result<Announcement> {
    let msg: AnnounceLine = serde_json::from_str(line.trim_end())?;
    if msg.jsonrpc != "2.0" {
        return Err(RpcError::Protocol(format!(
            "Unsupported JSON-RPC version {}",
            msg.jsonrpc
        )));
    }
    if msg.method != ANNOUNCE_METHOD {
        return Err(RpcError::Protocol(format!(
            "Expected {} message, got {}",
            ANNOUNCE_METHOD, msg.method
        )));
    }
    Ok(msg.params)
}

impl Announcement {
    /// Check that the host speaks this protocol and serves `expected`.
    ///
    /// Every operation of `expected` must exist on the host with the same
    /// parameter types and return type. The host may offer more operations.
    pub fn ensure_compatible(&self, expected: &ContractDescriptor) -> Result<()> {
        if major(&self.version) != major(PROTOCOL_VERSION) {
            return Err(RpcError::Protocol(format!(
                "Protocol version {} is incompatible with {}",
                self.version, PROTOCOL_VERSION
            )));
        }
        if self.contract.name != expected.name {
            return Err(RpcError::Protocol(format!(
                "Host serves contract {}, expected {}",
                self.contract.name, expected.name
            )));
        }

        for op in expected.operations {
            let announced = self
                .contract
                .operations
                .iter()
                .find(|a| a.name == op.name)
                .ok_or_else(|| {
                    RpcError::Protocol(format!(
                        "Host contract {} lacks operation {}",
                        expected.name, op.name
                    ))
                })?;

            let same_params = announced.params.len() == op.params.len()
                && announced
                    .params
                    .iter()
                    .zip(op.params)
                    .all(|(a, p)| a.ty == p.ty);
            let same_return = announced.returns.as_deref() == op.returns;
            if !same_params || !same_return {
                return Err(RpcError::Protocol(format!(
                    "Operation {} has a different signature on the host",
                    op.name
                )));
            }
        }
        Ok(())
    }
}

fn major(version: &str) -> &str {
    version.split('.').next().unwrap_or(version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{OperationDescriptor, ParamDescriptor};

    static OPS: [OperationDescriptor; 2] = [
        OperationDescriptor {
            name: "set_listener",
            params: &[ParamDescriptor {
                name: "pipe_path",
                ty: "String",
            }],
            returns: None,
        },
        OperationDescriptor {
            name: "frame_rate",
            params: &[],
            returns: Some("u32"),
        },
    ];

    static CONTRACT: ContractDescriptor = ContractDescriptor {
        name: "SensorControl",
        operations: &OPS,
    };

    #[test]
    fn test_build_announce_message_shape() {
        let json = build_announce_message("/tmp/test.sock", &CONTRACT).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed["jsonrpc"], "2.0");
        assert_eq!(parsed["method"], "$announce");
        assert_eq!(parsed["params"]["pipe"], "/tmp/test.sock");
        assert_eq!(parsed["params"]["version"], PROTOCOL_VERSION);
        assert_eq!(parsed["params"]["contract"]["name"], "SensorControl");
        assert_eq!(
            parsed["params"]["contract"]["operations"][0]["params"][0]["name"],
            "pipe_path"
        );
        assert!(!json.contains('\n'));
    }

    #[test]
    fn test_parse_roundtrip_and_compatible() {
        let line = format!(
            "{}\n",
            build_announce_message("/tmp/test.sock", &CONTRACT).unwrap()
        );
        let announcement = parse_announcement(&line).unwrap();
        assert_eq!(announcement.contract.operations.len(), 2);
        assert!(announcement.ensure_compatible(&CONTRACT).is_ok());
    }

    #[test]
    fn test_wrong_method_rejected() {
        let line = r#"{"jsonrpc":"2.0","method":"$init","params":{"pipe":"p","version":"1.0.0","contract":{"name":"X","operations":[]}}}"#;
        assert!(matches!(
            parse_announcement(line),
            Err(RpcError::Protocol(_))
        ));
        assert!(matches!(parse_announcement("not json"), Err(RpcError::Json(_))));
    }

    #[test]
    fn test_incompatible_hosts() {
        let line = build_announce_message("/tmp/test.sock", &CONTRACT).unwrap();
        let good = parse_announcement(&line).unwrap();

        let mut old = good.clone();
        old.version = "0.9.0".to_string();
        assert!(old.ensure_compatible(&CONTRACT).is_err());

        let mut renamed = good.clone();
        renamed.contract.name = "Other".to_string();
        assert!(renamed.ensure_compatible(&CONTRACT).is_err());

        let mut changed = good.clone();
        changed.contract.operations[1].returns = Some("u64".to_string());
        let err = changed.ensure_compatible(&CONTRACT).unwrap_err();
        assert!(err.to_string().contains("frame_rate"));

        let mut missing = good;
        missing.contract.operations.remove(0);
        let err = missing.ensure_compatible(&CONTRACT).unwrap_err();
        assert!(err.to_string().contains("set_listener"));
    }
}
