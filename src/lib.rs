//! # duplex-rpc
//!
//! Contract-driven remote procedure calls between two processes over one
//! duplex byte stream (Unix domain socket, Windows named pipe, or any
//! `AsyncRead + AsyncWrite` stream).
//!
//! ## Architecture
//!
//! - **Contracts** ([`contract!`]): a trait declares the operations; the
//!   macro generates the client proxy and the dispatch handlers.
//! - **Caller** ([`ServiceSender`]): one call at a time over its stream.
//! - **Dispatcher** ([`ServiceReceiver`]): answers calls in arrival order.
//! - **Control Plane** (stdio, optional): one `$announce` JSON line naming the pipe.
//!
//! A bidirectional relationship uses two streams; each process is a caller
//! on one and a dispatcher on the other.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use duplex_rpc::{DispatchTable, ServiceError, ServiceReceiver, ServiceSender};
//!
//! duplex_rpc::contract! {
//!     #[contract(Pinger, client = PingClient)]
//!     pub trait Ping {
//!         fn ping(&self, value: i32) -> i32;
//!     }
//! }
//!
//! struct PlusOne;
//!
//! impl Ping for PlusOne {
//!     async fn ping(&self, value: i32) -> Result<i32, ServiceError> {
//!         Ok(value.max(-1) + 1)
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> duplex_rpc::Result<()> {
//! let (near, far) = tokio::io::duplex(4096);
//! let table = Arc::new(DispatchTable::for_contract::<Pinger>()?);
//! let handle = ServiceReceiver::new(far, Arc::new(PlusOne), table).spawn();
//!
//! let sender = ServiceSender::new(near);
//! let client = sender.client::<PingClient<_>>();
//! assert_eq!(client.ping(41).await?, 42);
//!
//! sender.close().await?;
//! handle.join().await
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod contract;
pub mod control;
pub mod envelope;
pub mod error;
pub mod host;
pub mod protocol;
pub mod transport;

mod receiver;
mod sender;
mod shutdown;

pub use bytes;

pub use codec::{JsonCodec, MsgPackCodec, PayloadCodec};
pub use config::RpcConfig;
pub use contract::{Contract, DispatchTable, RemoteCall};
pub use envelope::{ErrorEnvelope, RemoteError, ServiceError};
pub use error::{Result, RpcError};
pub use host::{Host, HostBuilder};
pub use receiver::{ReceiverHandle, ServiceReceiver};
pub use sender::ServiceSender;
pub use shutdown::Shutdown;
pub use transport::ByteStream;
