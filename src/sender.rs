//! Caller side: sends calls over one stream and waits for each answer.
//!
//! A [`ServiceSender`] owns one duplex stream. Every call holds the stream
//! for the whole request/response exchange, so concurrent calls from any
//! number of tasks reach the wire strictly one after another.
//!
//! # Example
//!
//! ```ignore
//! let sender = ServiceSender::new(stream);
//! let client = sender.client::<PingClient<_>>();
//! assert_eq!(client.ping(41).await?, 42);
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::RpcConfig;
use crate::contract::{BoxFuture, ClientProxy, RemoteCall};
use crate::envelope::{ErrorEnvelope, RemoteError};
use crate::error::{Result, RpcError};
use crate::protocol::{read_response, write_request, RequestFrame};
use crate::shutdown::{guard, Shutdown};
use crate::transport::{ByteStream, PipeStream};

struct Inner<T> {
    /// `None` once closed, poisoned, or while a call is on the wire.
    stream: Mutex<Option<T>>,
    /// Set by `close` and whenever the stream is dropped.
    closed: AtomicBool,
    config: RpcConfig,
    shutdown: Shutdown,
}

/// Caller bound to one stream. Cheap to clone; clones share the stream.
pub struct ServiceSender<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for ServiceSender<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: ByteStream> ServiceSender<T> {
    /// Create a caller with the default configuration.
    pub fn new(stream: T) -> Self {
        Self::with_config(stream, RpcConfig::default())
    }

    /// Create a caller with a custom configuration.
    pub fn with_config(stream: T, config: RpcConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                stream: Mutex::new(Some(stream)),
                closed: AtomicBool::new(false),
                config,
                shutdown: Shutdown::new(),
            }),
        }
    }

    /// Build a client proxy that sends through this caller.
    pub fn client<P>(&self) -> P
    where
        P: ClientProxy<Self>,
    {
        P::from_remote(self.clone())
    }

    /// Send one call and wait for its answer.
    ///
    /// Returns the encoded return value (empty for void operations), or
    /// [`RpcError::Remote`] when the callee answered with an error.
    pub async fn invoke(&self, operation: &str, payload: Bytes) -> Result<Bytes> {
        let inner = &*self.inner;
        let limits = inner.config.frame_limits();

        let mut slot = guard("acquire stream", None, &inner.shutdown, async {
            Ok::<_, RpcError>(inner.stream.lock().await)
        })
        .await?;

        // Taken out of the slot for the exchange: if this future is dropped
        // mid-call the stream goes with it and later calls see ConnectionClosed.
        let mut stream = match slot.take() {
            Some(stream) => stream,
            None => return Err(RpcError::ConnectionClosed),
        };
        let mut in_flight = InFlight {
            closed: &inner.closed,
            done: false,
        };

        debug!(operation, payload_len = payload.len(), "Sending call");

        let frame = RequestFrame::new(operation, payload);
        let exchange = async {
            guard(
                "write request",
                inner.config.write_timeout,
                &inner.shutdown,
                write_request(&mut stream, &frame, &limits),
            )
            .await?;
            guard(
                "read response",
                inner.config.response_timeout,
                &inner.shutdown,
                read_response(&mut stream, &limits),
            )
            .await
        };

        let response = match exchange.await {
            Ok(response) => response,
            Err(e) => {
                if e.desyncs_stream() {
                    warn!(operation, error = %e, "Dropping caller stream");
                } else {
                    in_flight.done = true;
                    *slot = Some(stream);
                }
                return Err(e);
            }
        };
        in_flight.done = true;
        *slot = Some(stream);
        drop(slot);

        if response.is_error() {
            let envelope = ErrorEnvelope::decode(response.payload())?;
            debug!(operation, message = %envelope.message, "Call failed remotely");
            return Err(RemoteError::from_envelope(envelope).into());
        }

        Ok(response.into_payload())
    }

    /// Shut the stream down. Only the first call has an effect.
    ///
    /// Waits for an in-flight call to finish; use [`Shutdown::cancel`] on
    /// [`shutdown`](Self::shutdown) to interrupt it first.
    pub async fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let stream = self.inner.stream.lock().await.take();
        if let Some(mut stream) = stream {
            debug!("Closing caller stream");
            stream.shutdown().await?;
        }
        Ok(())
    }

    /// Whether [`close`](Self::close) was called or the stream was dropped
    /// after a failed or abandoned call.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// The caller's stop/cancel handle.
    pub fn shutdown(&self) -> &Shutdown {
        &self.inner.shutdown
    }

    /// The caller's configuration.
    pub fn config(&self) -> &RpcConfig {
        &self.inner.config
    }
}

/// Marks the caller closed unless the exchange completes with the stream
/// back in its slot.
struct InFlight<'a> {
    closed: &'a AtomicBool,
    done: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.closed.store(true, Ordering::Release);
        }
    }
}

impl ServiceSender<PipeStream> {
    /// Connect to a pipe, waiting up to the configured connect timeout.
    pub async fn connect(path: &str, config: RpcConfig) -> Result<Self> {
        config.validate()?;
        let stream = PipeStream::connect_timeout(path, config.connect_timeout).await?;
        debug!(path, "Connected caller");
        Ok(Self::with_config(stream, config))
    }
}

impl<T: ByteStream> RemoteCall for ServiceSender<T> {
    fn invoke<'a>(&'a self, operation: &'a str, payload: Bytes) -> BoxFuture<'a, Result<Bytes>> {
        Box::pin(ServiceSender::invoke(self, operation, payload))
    }
}
