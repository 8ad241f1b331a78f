//! Contract module - service contracts, client proxies, and dispatch tables.
//!
//! A contract is declared once with the [`contract!`](crate::contract!)
//! macro. The macro produces:
//! - the service trait that implementations provide,
//! - a marker type implementing [`Contract`] and [`Dispatch`],
//! - a client proxy that turns method calls into [`RemoteCall::invoke`].
//!
//! On the serving side, [`DispatchTable::build`] turns the marker into an
//! immutable `name -> handler` map that any number of dispatchers share.
//!
//! # Example
//!
//! ```
//! use duplex_rpc::contract::{Contract, DispatchTable};
//! use duplex_rpc::ServiceError;
//!
//! duplex_rpc::contract! {
//!     #[contract(Pinger, client = PingClient)]
//!     pub trait Ping {
//!         fn ping(&self, value: i32) -> i32;
//!     }
//! }
//!
//! struct Plus;
//!
//! impl Ping for Plus {
//!     async fn ping(&self, value: i32) -> Result<i32, ServiceError> {
//!         Ok(value.max(-1) + 1)
//!     }
//! }
//!
//! let table = DispatchTable::<Plus>::for_contract::<Pinger>().unwrap();
//! assert_eq!(table.contract().name, "Ping");
//! assert!(table.lookup("ping").is_some());
//! assert_eq!(Pinger::descriptor().operation("ping").unwrap().params[0].ty, "i32");
//! ```

mod macros;
mod table;

pub use table::DispatchTable;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;

use crate::codec::PayloadCodec;
use crate::envelope::ServiceError;
use crate::error::{Result, RpcError};

/// Boxed future used at the type-erased seams.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Why a handler produced no success payload.
#[derive(Debug)]
pub enum HandlerFailure {
    /// The implementation reported an error; it goes back to the caller.
    Service(ServiceError),
    /// Arguments or the return value could not be (de)serialized.
    Fatal(RpcError),
}

/// Result of running one handler: the encoded return value on success.
pub type HandlerResult = std::result::Result<Bytes, HandlerFailure>;

/// A type-erased operation handler for implementation `S`.
pub type HandlerFn<S> = fn(Arc<S>, Bytes) -> BoxFuture<'static, HandlerResult>;

/// Description of one parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ParamDescriptor {
    /// Parameter name as declared.
    pub name: &'static str,
    /// Parameter type as written in the contract.
    pub ty: &'static str,
}

/// Description of one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OperationDescriptor {
    /// Operation name; this is the name sent on the wire.
    pub name: &'static str,
    /// Ordered parameter list.
    pub params: &'static [ParamDescriptor],
    /// Return type, `None` for void operations.
    pub returns: Option<&'static str>,
}

impl OperationDescriptor {
    /// True when the operation returns nothing.
    pub fn is_void(&self) -> bool {
        self.returns.is_none()
    }
}

/// Description of a whole contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ContractDescriptor {
    /// Contract name.
    pub name: &'static str,
    /// Operations in declaration order.
    pub operations: &'static [OperationDescriptor],
}

impl ContractDescriptor {
    /// Find an operation by name.
    pub fn operation(&self, name: &str) -> Option<&'static OperationDescriptor> {
        self.operations.iter().find(|op| op.name == name)
    }

    /// Operation names in declaration order.
    pub fn operation_names(&self) -> impl Iterator<Item = &'static str> {
        self.operations.iter().map(|op| op.name)
    }

    /// Reject contracts that declare an operation name twice.
    pub fn validate(&self) -> Result<()> {
        for (i, op) in self.operations.iter().enumerate() {
            if self.operations[..i].iter().any(|prev| prev.name == op.name) {
                return Err(RpcError::DuplicateOperation {
                    contract: self.name,
                    operation: op.name.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// A service contract with a static descriptor.
pub trait Contract {
    /// The contract's descriptor.
    fn descriptor() -> &'static ContractDescriptor;
}

/// Produces the handlers of a contract for implementation `S`.
pub trait Dispatch<S>: Contract {
    /// One `(operation name, handler)` pair per operation, using codec `C`.
    fn handlers<C: PayloadCodec>() -> Vec<(&'static str, HandlerFn<S>)>;
}

/// The send function behind a client proxy.
///
/// Implemented by [`ServiceSender`](crate::ServiceSender) and by any closure
/// `Fn(&str, Bytes) -> BoxFuture<'static, Result<Bytes>>`.
pub trait RemoteCall: Send + Sync {
    /// Send one call and return the encoded reply.
    fn invoke<'a>(&'a self, operation: &'a str, payload: Bytes) -> BoxFuture<'a, Result<Bytes>>;
}

impl<F> RemoteCall for F
where
    F: Fn(&str, Bytes) -> BoxFuture<'static, Result<Bytes>> + Send + Sync,
{
    fn invoke<'a>(&'a self, operation: &'a str, payload: Bytes) -> BoxFuture<'a, Result<Bytes>> {
        self(operation, payload)
    }
}

/// A generated client proxy that can be built around a remote `R`.
pub trait ClientProxy<R>: Sized {
    /// The contract this proxy calls.
    type Contract: Contract;

    /// Wrap a remote.
    fn from_remote(remote: R) -> Self;
}

#[cfg(test)]
mod tests {
    use super::*;

    static OPS: [OperationDescriptor; 2] = [
        OperationDescriptor {
            name: "start",
            params: &[],
            returns: None,
        },
        OperationDescriptor {
            name: "scale",
            params: &[ParamDescriptor {
                name: "factor",
                ty: "f32",
            }],
            returns: Some("f32"),
        },
    ];

    static DUPLICATED: [OperationDescriptor; 2] = [
        OperationDescriptor {
            name: "start",
            params: &[],
            returns: None,
        },
        OperationDescriptor {
            name: "start",
            params: &[],
            returns: None,
        },
    ];

    #[test]
    fn test_descriptor_lookup() {
        let contract = ContractDescriptor {
            name: "Scaler",
            operations: &OPS,
        };
        assert!(contract.validate().is_ok());
        assert!(contract.operation("start").unwrap().is_void());
        assert!(!contract.operation("scale").unwrap().is_void());
        assert!(contract.operation("Scale").is_none());
        assert_eq!(contract.operation_names().collect::<Vec<_>>(), ["start", "scale"]);
    }

    #[test]
    fn test_duplicate_operation_rejected() {
        let contract = ContractDescriptor {
            name: "Broken",
            operations: &DUPLICATED,
        };
        match contract.validate() {
            Err(RpcError::DuplicateOperation { contract, operation }) => {
                assert_eq!(contract, "Broken");
                assert_eq!(operation, "start");
            }
            other => panic!("expected duplicate error, got {:?}", other),
        }
    }

    #[test]
    fn test_descriptor_serializes() {
        let contract = ContractDescriptor {
            name: "Scaler",
            operations: &OPS,
        };
        let json = serde_json::to_value(contract).unwrap();
        assert_eq!(json["name"], "Scaler");
        assert_eq!(json["operations"][1]["params"][0]["ty"], "f32");
        assert!(json["operations"][0]["returns"].is_null());
    }

    #[tokio::test]
    async fn test_closure_is_remote_call() {
        let remote = |operation: &str, payload: Bytes| -> BoxFuture<'static, Result<Bytes>> {
            let echoed = format!("{}:{}", operation, payload.len());
            Box::pin(async move { Ok(Bytes::from(echoed)) })
        };
        let reply = remote.invoke("ping", Bytes::from_static(b"abc")).await.unwrap();
        assert_eq!(reply.as_ref(), b"ping:3");
    }
}
