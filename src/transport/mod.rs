//! Transport module - byte streams and platform-specific pipes.
//!
//! Callers and dispatchers work over any [`ByteStream`]. This module also
//! provides a ready-made local transport:
//! - Unix Domain Sockets (Linux/macOS)
//! - Named Pipes (Windows)

mod pipe;

pub use pipe::{generate_pipe_path, pipe_path_for, PipeListener, PipeStream};

use tokio::io::{AsyncRead, AsyncWrite};

/// A duplex byte stream usable by a caller or dispatcher.
///
/// Blanket-implemented for Unix sockets, named pipes, TCP streams and
/// `tokio::io::DuplexStream`.
pub trait ByteStream: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> ByteStream for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}
