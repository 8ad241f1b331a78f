//! Failures that cross the process boundary.
//!
//! - [`ServiceError`] is returned by contract implementations on the callee side.
//! - [`ErrorEnvelope`] is the payload of every error response on the wire.
//! - [`RemoteError`] is what the caller observes for an error response.
//!
//! The envelope is always MsgPack with named fields, whatever codec the
//! contract arguments use, so an encoded envelope is never empty.

use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, Once};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::codec::{MsgPackCodec, PayloadCodec};
use crate::error::Result;

/// Structured description of a failure, as carried by an error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Human-readable failure message.
    pub message: String,
    /// Stack trace captured on the side that failed, if any.
    #[serde(default)]
    pub stack_trace: Option<String>,
}

impl ErrorEnvelope {
    /// Create a new envelope.
    pub fn new(message: impl Into<String>, stack_trace: Option<String>) -> Self {
        Self {
            message: message.into(),
            stack_trace,
        }
    }

    /// Encode to the wire representation.
    pub fn encode(&self) -> Result<Bytes> {
        MsgPackCodec::encode(self).map(Bytes::from)
    }

    /// Decode from the wire representation.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        MsgPackCodec::decode(bytes)
    }
}

impl From<ServiceError> for ErrorEnvelope {
    fn from(err: ServiceError) -> Self {
        Self {
            message: err.message,
            stack_trace: err.stack_trace,
        }
    }
}

/// Error returned by a contract implementation.
///
/// Any `std::error::Error` converts into a `ServiceError` with `?`, so
/// implementations can propagate their own errors directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceError {
    message: String,
    stack_trace: Option<String>,
}

impl ServiceError {
    /// Create an error, capturing a backtrace when backtraces are enabled.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack_trace: captured_backtrace(),
        }
    }

    /// Create an error with an explicit stack trace.
    pub fn with_stack_trace(message: impl Into<String>, stack_trace: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack_trace: Some(stack_trace.into()),
        }
    }

    /// Create an error without any stack trace.
    pub fn message_only(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack_trace: None,
        }
    }

    /// Build an error from the payload of a caught panic and the trace
    /// recorded where it was raised.
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>, stack_trace: Option<String>) -> Self {
        let detail = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self {
            message: format!("handler panicked: {}", detail),
            stack_trace,
        }
    }

    /// The failure message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The stack trace, if one was captured or supplied.
    pub fn stack_trace(&self) -> Option<&str> {
        self.stack_trace.as_deref()
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl<E: std::error::Error> From<E> for ServiceError {
    fn from(err: E) -> Self {
        Self::new(err.to_string())
    }
}

tokio::task_local! {
    static PANIC_SITE: PanicSite;
}

/// Slot the panic hook fills with the location and backtrace of a panic
/// raised inside [`PanicSite::scope`].
#[derive(Debug, Clone, Default)]
pub(crate) struct PanicSite(Arc<Mutex<Option<String>>>);

impl PanicSite {
    /// Run `fut` with panics inside it recorded here.
    pub(crate) fn scope<F: Future>(&self, fut: F) -> impl Future<Output = F::Output> {
        install_panic_hook();
        PANIC_SITE.scope(self.clone(), fut)
    }

    /// The recorded trace, if a panic happened.
    pub(crate) fn take(&self) -> Option<String> {
        self.0.lock().ok().and_then(|mut trace| trace.take())
    }
}

/// Chain a hook in front of the current one. Panics outside a scope only
/// reach the previous hook.
fn install_panic_hook() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let _ = PANIC_SITE.try_with(|site| {
                let location = info
                    .location()
                    .map(|l| l.to_string())
                    .unwrap_or_else(|| "unknown location".to_string());
                let trace = match captured_backtrace() {
                    Some(backtrace) => format!("panicked at {}\n{}", location, backtrace),
                    None => format!("panicked at {}", location),
                };
                if let Ok(mut slot) = site.0.lock() {
                    *slot = Some(trace);
                }
            });
            previous(info);
        }));
    });
}

fn captured_backtrace() -> Option<String> {
    let backtrace = Backtrace::capture();
    match backtrace.status() {
        BacktraceStatus::Captured => Some(backtrace.to_string()),
        _ => None,
    }
}

/// Error reported by the remote side of a call.
///
/// The remote stack trace and the local backtrace are kept apart: the first
/// says where the callee failed, the second where this process made the call.
#[derive(Debug)]
pub struct RemoteError {
    message: String,
    remote_stack_trace: Option<String>,
    local_backtrace: Backtrace,
}

impl RemoteError {
    /// Build the caller-side error for a decoded envelope.
    pub fn from_envelope(envelope: ErrorEnvelope) -> Self {
        Self {
            message: envelope.message,
            remote_stack_trace: envelope.stack_trace,
            local_backtrace: Backtrace::capture(),
        }
    }

    /// Message reported by the remote side.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Stack trace reported by the remote side.
    pub fn remote_stack_trace(&self) -> Option<&str> {
        self.remote_stack_trace.as_deref()
    }

    /// Backtrace of the local call site (only populated when enabled).
    pub fn local_backtrace(&self) -> &Backtrace {
        &self.local_backtrace
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for RemoteError {}
