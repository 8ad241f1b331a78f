//! Immutable operation-name to handler map.
//!
//! Built once per (contract, codec, implementation) triple and shared as
//! `Arc<DispatchTable<S>>` by every dispatcher serving that implementation.

use std::collections::HashMap;
use std::fmt;

use super::{ContractDescriptor, Dispatch, HandlerFn};
use crate::codec::{MsgPackCodec, PayloadCodec};
use crate::error::{Result, RpcError};

/// Handlers of one contract for implementation `S`.
pub struct DispatchTable<S> {
    contract: &'static ContractDescriptor,
    codec: &'static str,
    handlers: HashMap<&'static str, HandlerFn<S>>,
}

impl<S> DispatchTable<S> {
    /// Build the table for contract `D` with payload codec `C`.
    ///
    /// Fails on duplicate operation names and on any declared operation
    /// without a handler.
    pub fn build<D, C>() -> Result<Self>
    where
        D: Dispatch<S>,
        C: PayloadCodec,
    {
        let contract = D::descriptor();
        contract.validate()?;

        let mut handlers = HashMap::with_capacity(contract.operations.len());
        for (name, handler) in D::handlers::<C>() {
            if contract.operation(name).is_none() {
                return Err(RpcError::InvalidConfig(format!(
                    "Handler {} is not an operation of contract {}",
                    name, contract.name
                )));
            }
            if handlers.insert(name, handler).is_some() {
                return Err(RpcError::DuplicateOperation {
                    contract: contract.name,
                    operation: name.to_string(),
                });
            }
        }

        if let Some(missing) = contract
            .operations
            .iter()
            .find(|op| !handlers.contains_key(op.name))
        {
            return Err(RpcError::InvalidConfig(format!(
                "Contract {} has no handler for operation {}",
                contract.name, missing.name
            )));
        }

        Ok(Self {
            contract,
            codec: C::NAME,
            handlers,
        })
    }

    /// Build the table with the default MsgPack codec.
    pub fn for_contract<D>() -> Result<Self>
    where
        D: Dispatch<S>,
    {
        Self::build::<D, MsgPackCodec>()
    }

    /// Handler for an operation name (case-sensitive).
    #[inline]
    pub fn lookup(&self, operation: &str) -> Option<HandlerFn<S>> {
        self.handlers.get(operation).copied()
    }

    /// The contract this table serves.
    #[inline]
    pub fn contract(&self) -> &'static ContractDescriptor {
        self.contract
    }

    /// Name of the payload codec.
    #[inline]
    pub fn codec(&self) -> &'static str {
        self.codec
    }

    /// Number of operations.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// True for a contract without operations.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<S> fmt::Debug for DispatchTable<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.handlers.keys().collect();
        names.sort();
        f.debug_struct("DispatchTable")
            .field("contract", &self.contract.name)
            .field("codec", &self.codec)
            .field("operations", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;

    use super::*;
    use crate::codec::JsonCodec;
    use crate::contract::{
        BoxFuture, Contract, HandlerFailure, HandlerResult, OperationDescriptor,
    };
    use crate::envelope::ServiceError;

    crate::contract! {
        #[contract(Counter, client = CounterClient)]
        trait Counting {
            fn add(&self, a: u32, b: u32) -> u32;
            fn reset(&self);
        }
    }

    struct Adder;

    impl Counting for Adder {
        async fn add(&self, a: u32, b: u32) -> std::result::Result<u32, ServiceError> {
            a.checked_add(b)
                .ok_or_else(|| ServiceError::message_only("overflow"))
        }

        async fn reset(&self) -> std::result::Result<(), ServiceError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_generated_handlers() {
        let table = DispatchTable::<Adder>::for_contract::<Counter>().unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.codec(), "msgpack");

        let add = table.lookup("add").unwrap();
        let args = Bytes::from(MsgPackCodec::encode(&(2u32, 40u32)).unwrap());
        let reply = add(Arc::new(Adder), args).await.unwrap();
        let sum: u32 = MsgPackCodec::decode(&reply).unwrap();
        assert_eq!(sum, 42);

        let reset = table.lookup("reset").unwrap();
        let reply = reset(Arc::new(Adder), Bytes::new()).await.unwrap();
        assert!(reply.is_empty());
    }

    #[tokio::test]
    async fn test_service_error_and_bad_payload() {
        let table = DispatchTable::<Adder>::build::<Counter, JsonCodec>().unwrap();
        let add = table.lookup("add").unwrap();

        let overflow = Bytes::from(JsonCodec::encode(&(u32::MAX, 1u32)).unwrap());
        match add(Arc::new(Adder), overflow).await {
            Err(HandlerFailure::Service(e)) => assert_eq!(e.message(), "overflow"),
            other => panic!("expected service error, got {:?}", other),
        }

        let garbage = Bytes::from_static(b"[1,");
        assert!(matches!(
            add(Arc::new(Adder), garbage).await,
            Err(HandlerFailure::Fatal(RpcError::Json(_)))
        ));
    }

    #[test]
    fn test_lookup_is_case_sensitive() {
        let table = DispatchTable::<Adder>::for_contract::<Counter>().unwrap();
        assert!(table.lookup("Add").is_none());
        assert!(table.lookup("").is_none());
        assert!(format!("{:?}", table).contains("Counting"));
    }

    struct Unhandled;

    static UNHANDLED_OPS: [OperationDescriptor; 1] = [OperationDescriptor {
        name: "orphan",
        params: &[],
        returns: None,
    }];

    static UNHANDLED: ContractDescriptor = ContractDescriptor {
        name: "Unhandled",
        operations: &UNHANDLED_OPS,
    };

    impl Contract for Unhandled {
        fn descriptor() -> &'static ContractDescriptor {
            &UNHANDLED
        }
    }

    impl Dispatch<Adder> for Unhandled {
        fn handlers<C: PayloadCodec>() -> Vec<(&'static str, HandlerFn<Adder>)> {
            Vec::new()
        }
    }

    #[test]
    fn test_missing_handler_rejected() {
        let err = DispatchTable::<Adder>::for_contract::<Unhandled>().unwrap_err();
        assert!(err.to_string().contains("orphan"));
    }

    struct Twice;

    impl Contract for Twice {
        fn descriptor() -> &'static ContractDescriptor {
            &UNHANDLED
        }
    }

    fn noop(_: Arc<Adder>, _: Bytes) -> BoxFuture<'static, HandlerResult> {
        Box::pin(async { Ok(Bytes::new()) })
    }

    impl Dispatch<Adder> for Twice {
        fn handlers<C: PayloadCodec>() -> Vec<(&'static str, HandlerFn<Adder>)> {
            vec![("orphan", noop as HandlerFn<Adder>), ("orphan", noop)]
        }
    }

    #[test]
    fn test_duplicate_handler_rejected() {
        assert!(matches!(
            DispatchTable::<Adder>::for_contract::<Twice>(),
            Err(RpcError::DuplicateOperation { .. })
        ));
    }
}
