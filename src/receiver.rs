//! Dispatcher side: reads calls from one stream and answers each in turn.
//!
//! A [`ServiceReceiver`] owns one stream, one implementation and a shared
//! [`DispatchTable`]. Requests are handled strictly one at a time in arrival
//! order. Each handler runs on its own task so a panic inside an
//! implementation becomes an error response instead of ending the loop.
//!
//! # Lifecycle
//!
//! ```text
//! new ─► serve() / spawn() ─► process_one() ... ─► close()
//!                 ▲                    │
//!                 └── stop flag, peer close, cancel, fatal error
//! ```

use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::RpcConfig;
use crate::contract::{DispatchTable, HandlerFailure};
use crate::envelope::{ErrorEnvelope, PanicSite, ServiceError};
use crate::error::{Result, RpcError};
use crate::protocol::{read_request_buffered, write_response, ResponseFrame};
use crate::shutdown::{guard, Shutdown};
use crate::transport::ByteStream;

/// Dispatcher bound to one stream and one implementation.
pub struct ServiceReceiver<S, T> {
    /// `None` once closed.
    stream: Option<T>,
    /// `None` once closed.
    service: Option<Arc<S>>,
    /// Request bytes read but not yet parsed.
    read_buf: BytesMut,
    table: Arc<DispatchTable<S>>,
    config: RpcConfig,
    shutdown: Shutdown,
}

impl<S, T> ServiceReceiver<S, T>
where
    S: Send + Sync + 'static,
    T: ByteStream,
{
    /// Create a dispatcher with the default configuration.
    pub fn new(stream: T, service: Arc<S>, table: Arc<DispatchTable<S>>) -> Self {
        Self::with_config(stream, service, table, RpcConfig::default())
    }

    /// Create a dispatcher with a custom configuration.
    pub fn with_config(
        stream: T,
        service: Arc<S>,
        table: Arc<DispatchTable<S>>,
        config: RpcConfig,
    ) -> Self {
        Self {
            stream: Some(stream),
            service: Some(service),
            read_buf: BytesMut::new(),
            table,
            config,
            shutdown: Shutdown::new(),
        }
    }

    /// The dispatcher's stop/cancel handle.
    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    /// The contract being served.
    pub fn contract_name(&self) -> &'static str {
        self.table.contract().name
    }

    /// Read one request and write its response.
    ///
    /// Unknown operations, implementation errors and panics are answered
    /// with an error response and return `Ok(())`. Transport failures and
    /// payload (de)serialization failures return `Err`.
    ///
    /// Dropping the future while it waits for a request is safe: partial
    /// input is kept and the next call resumes it. Dropping it after a
    /// request was read drops the stream, so the peer sees the connection
    /// close instead of waiting for an answer that never comes.
    pub async fn process_one(&mut self) -> Result<()> {
        let limits = self.config.frame_limits();
        let (request, service) = match (self.stream.as_mut(), self.service.as_ref()) {
            (Some(stream), Some(service)) => {
                let request = guard(
                    "read request",
                    self.config.idle_timeout,
                    &self.shutdown,
                    read_request_buffered(stream, &mut self.read_buf, &limits),
                )
                .await?;
                (request, Arc::clone(service))
            }
            _ => return Err(RpcError::ConnectionClosed),
        };

        // Put back only once the response is fully written.
        let mut stream = match self.stream.take() {
            Some(stream) => stream,
            None => return Err(RpcError::ConnectionClosed),
        };

        let (method, payload) = request.into_parts();
        let contract = self.table.contract().name;

        let response = match self.table.lookup(&method) {
            None => {
                warn!(contract, operation = %method, "Unknown operation");
                let envelope = ErrorEnvelope::new(
                    format!(
                        "Method {} is not implemented by the {} contract",
                        method, contract
                    ),
                    None,
                );
                ResponseFrame::error(envelope.encode()?)?
            }
            Some(handler) => {
                debug!(contract, operation = %method, payload_len = payload.len(), "Dispatching request");

                let site = PanicSite::default();
                let mut task = tokio::spawn(site.scope(handler(service, payload)));
                let joined = tokio::select! {
                    biased;
                    _ = self.shutdown.cancelled() => {
                        task.abort();
                        return Err(RpcError::Cancelled);
                    }
                    joined = &mut task => joined,
                };

                match joined {
                    Ok(Ok(value)) => ResponseFrame::success(value),
                    Ok(Err(HandlerFailure::Fatal(e))) => return Err(e),
                    Ok(Err(HandlerFailure::Service(e))) => failure_response(contract, &method, e)?,
                    Err(e) if e.is_panic() => {
                        let err = ServiceError::from_panic(e.into_panic(), site.take());
                        failure_response(contract, &method, err)?
                    }
                    Err(e) => return Err(RpcError::Task(e)),
                }
            }
        };

        guard(
            "write response",
            self.config.write_timeout,
            &self.shutdown,
            write_response(&mut stream, &response),
        )
        .await?;
        self.stream = Some(stream);
        Ok(())
    }

    /// Process requests until stopped, then close.
    ///
    /// Returns `Ok(())` when the stop flag is observed, the peer closes the
    /// stream or stays idle past `idle_timeout` between requests, or the
    /// shutdown handle is cancelled.
    pub async fn serve(mut self) -> Result<()> {
        let contract = self.contract_name();
        debug!(contract, "Dispatcher started");

        let result = loop {
            if self.shutdown.is_stop_requested() {
                debug!(contract, "Dispatcher stopping");
                break Ok(());
            }
            match self.process_one().await {
                Ok(()) => {}
                Err(RpcError::ConnectionClosed) => {
                    info!(contract, "Peer closed the stream");
                    break Ok(());
                }
                Err(RpcError::Cancelled) => {
                    debug!(contract, "Dispatcher cancelled");
                    break Ok(());
                }
                Err(RpcError::Timeout {
                    phase: "read request",
                    after,
                }) if self.read_buf.is_empty() => {
                    info!(contract, ?after, "Peer idle, closing");
                    break Ok(());
                }
                Err(e) => {
                    error!(contract, error = %e, "Dispatcher stopped on fatal error");
                    break Err(e);
                }
            }
        };

        if let Err(e) = self.close().await {
            debug!(contract, error = %e, "Error while closing dispatcher stream");
        }
        result
    }

    /// Run [`serve`](Self::serve) on its own task.
    pub fn spawn(self) -> ReceiverHandle {
        let shutdown = self.shutdown.clone();
        let task = tokio::spawn(self.serve());
        ReceiverHandle { shutdown, task }
    }

    /// Drop the implementation and shut the stream down. Only the first
    /// call has an effect.
    pub async fn close(&mut self) -> Result<()> {
        self.service = None;
        if let Some(mut stream) = self.stream.take() {
            stream.shutdown().await?;
        }
        Ok(())
    }

    /// Whether [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }
}

fn failure_response(contract: &str, method: &str, err: ServiceError) -> Result<ResponseFrame> {
    debug!(contract, operation = method, error = %err, "Operation failed");
    ResponseFrame::error(ErrorEnvelope::from(err).encode()?)
}

/// Handle to a dispatcher running on its own task.
pub struct ReceiverHandle {
    shutdown: Shutdown,
    task: JoinHandle<Result<()>>,
}

impl ReceiverHandle {
    /// End the loop after the current request.
    ///
    /// A dispatcher waiting for a request only notices once one arrives or
    /// the peer closes; see [`stop`](Self::stop).
    pub fn request_stop(&self) {
        self.shutdown.request_stop();
    }

    /// Interrupt the dispatcher, including a pending read.
    pub fn cancel(&self) {
        self.shutdown.cancel();
    }

    /// The dispatcher's stop/cancel handle.
    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    /// Whether the dispatcher task has ended.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Request a stop, then cancel if the loop has not ended within `grace`.
    pub async fn stop(mut self, grace: Duration) -> Result<()> {
        self.shutdown.request_stop();
        match tokio::time::timeout(grace, &mut self.task).await {
            Ok(joined) => joined?,
            Err(_) => {
                debug!(?grace, "Dispatcher did not stop in time, cancelling");
                self.shutdown.cancel();
                self.task.await?
            }
        }
    }

    /// Wait for the dispatcher to end.
    pub async fn join(self) -> Result<()> {
        self.task.await?
    }
}
