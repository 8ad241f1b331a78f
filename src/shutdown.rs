//! Stop and cancel signals for callers and dispatchers.
//!
//! A [`Shutdown`] handle carries two signals:
//! - **stop**: finish the current exchange, then end the loop.
//! - **cancel**: interrupt whatever is blocked right now. Cancel implies stop.
//!
//! Handles are cheap to clone and every clone observes the same signals.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::error::{Result, RpcError};

struct Inner {
    stop: AtomicBool,
    cancel: watch::Sender<bool>,
}

/// Shared stop/cancel handle.
#[derive(Clone)]
pub struct Shutdown {
    inner: Arc<Inner>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Shutdown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shutdown")
            .field("stop_requested", &self.is_stop_requested())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl Shutdown {
    /// Create a handle with neither signal raised.
    pub fn new() -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                stop: AtomicBool::new(false),
                cancel,
            }),
        }
    }

    /// Ask the loop to end after the current exchange.
    pub fn request_stop(&self) {
        self.inner.stop.store(true, Ordering::Release);
    }

    /// Whether a stop (or cancel) was requested.
    pub fn is_stop_requested(&self) -> bool {
        self.inner.stop.load(Ordering::Acquire)
    }

    /// Interrupt any blocked operation. Also requests stop.
    pub fn cancel(&self) {
        self.request_stop();
        self.inner.cancel.send_replace(true);
    }

    /// Whether cancel was requested.
    pub fn is_cancelled(&self) -> bool {
        *self.inner.cancel.borrow()
    }

    /// Resolves once cancel is requested.
    pub async fn cancelled(&self) {
        let mut rx = self.inner.cancel.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

/// Run `fut` unless it is cancelled or exceeds `limit`.
pub(crate) async fn guard<T, F>(
    phase: &'static str,
    limit: Option<Duration>,
    shutdown: &Shutdown,
    fut: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if shutdown.is_cancelled() {
        return Err(RpcError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => Err(RpcError::Cancelled),
        result = with_limit(phase, limit, fut) => result,
    }
}

async fn with_limit<T, F>(phase: &'static str, limit: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match limit {
        Some(after) => tokio::time::timeout(after, fut)
            .await
            .map_err(|_| RpcError::Timeout { phase, after })?,
        None => fut.await,
    }
}
