//! Platform-specific pipe/socket implementation.
//!
//! - Unix: Unix Domain Socket
//! - Windows: Named Pipe
//!
//! # Example
//!
//! ```ignore
//! use duplex_rpc::transport::{generate_pipe_path, PipeListener, PipeStream};
//!
//! let path = generate_pipe_path("sensor");
//! let listener = PipeListener::bind(&path).await?;
//! let (server, client) = tokio::join!(listener.accept(), PipeStream::connect(&path));
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{Result, RpcError};

/// Delay between connection attempts while the server is not ready yet.
const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(20);

static PATH_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a unique pipe path for this process.
///
/// Format:
/// - Unix: `{tmp}/{prefix}-{pid}-{random}.sock`
/// - Windows: `\\.\pipe\{prefix}-{pid}-{random}`
pub fn generate_pipe_path(prefix: &str) -> String {
    let pid = std::process::id();
    let unique = rand_u64() ^ PATH_COUNTER.fetch_add(1, Ordering::Relaxed);
    pipe_path_for(&format!("{}-{}-{:x}", prefix, pid, unique))
}

/// Platform path for a pipe with a well-known name.
///
/// Two processes agreeing on `name` agree on the path.
pub fn pipe_path_for(name: &str) -> String {
    #[cfg(unix)]
    {
        std::env::temp_dir()
            .join(format!("{}.sock", name))
            .to_string_lossy()
            .into_owned()
    }

    #[cfg(windows)]
    {
        format!(r"\\.\pipe\{}", name)
    }
}

/// Simple random u64 using system time and process ID.
fn rand_u64() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);

    let pid = std::process::id() as u64;
    nanos.wrapping_mul(0x517cc1b727220a95) ^ pid
}

// ============================================================================
// Unix Implementation
// ============================================================================

#[cfg(unix)]
mod unix_impl {
    use super::*;
    use std::path::Path;
    use tokio::net::{UnixListener, UnixStream};

    /// Unix Domain Socket listener.
    pub struct PipeListener {
        listener: UnixListener,
        path: String,
    }

    /// Unix Domain Socket stream (connected).
    pub struct PipeStream {
        stream: UnixStream,
    }

    impl PipeListener {
        /// Bind to a Unix socket path.
        ///
        /// Removes any existing socket file at the path before binding.
        pub async fn bind(path: &str) -> Result<Self> {
            if Path::new(path).exists() {
                std::fs::remove_file(path)?;
            }

            let listener = UnixListener::bind(path)?;

            Ok(Self {
                listener,
                path: path.to_string(),
            })
        }

        /// Accept a single connection.
        pub async fn accept(&self) -> Result<PipeStream> {
            let (stream, _addr) = self.listener.accept().await?;
            Ok(PipeStream { stream })
        }

        /// Get the socket path.
        pub fn path(&self) -> &str {
            &self.path
        }
    }

    impl Drop for PipeListener {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.path);
        }
    }

    impl PipeStream {
        /// Connect to a listening socket.
        pub async fn connect(path: &str) -> Result<Self> {
            let stream = UnixStream::connect(path).await?;
            Ok(Self { stream })
        }

        pub(super) fn is_not_ready(err: &std::io::Error) -> bool {
            matches!(
                err.kind(),
                std::io::ErrorKind::NotFound | std::io::ErrorKind::ConnectionRefused
            )
        }
    }

    impl AsyncRead for PipeStream {
        fn poll_read(
            mut self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
            buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::pin::Pin::new(&mut self.stream).poll_read(cx, buf)
        }
    }

    impl AsyncWrite for PipeStream {
        fn poll_write(
            mut self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
            buf: &[u8],
        ) -> std::task::Poll<std::io::Result<usize>> {
            std::pin::Pin::new(&mut self.stream).poll_write(cx, buf)
        }

        fn poll_write_vectored(
            mut self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
            bufs: &[std::io::IoSlice<'_>],
        ) -> std::task::Poll<std::io::Result<usize>> {
            std::pin::Pin::new(&mut self.stream).poll_write_vectored(cx, bufs)
        }

        fn is_write_vectored(&self) -> bool {
            self.stream.is_write_vectored()
        }

        fn poll_flush(
            mut self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::pin::Pin::new(&mut self.stream).poll_flush(cx)
        }

        fn poll_shutdown(
            mut self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::pin::Pin::new(&mut self.stream).poll_shutdown(cx)
        }
    }
}

// ============================================================================
// Windows Implementation
// ============================================================================

#[cfg(windows)]
mod windows_impl {
    use super::*;
    use std::sync::Mutex;
    use tokio::net::windows::named_pipe::{
        ClientOptions, NamedPipeClient, NamedPipeServer, ServerOptions,
    };

    /// `ERROR_PIPE_BUSY`: every server instance is taken.
    const ERROR_PIPE_BUSY: i32 = 231;

    /// Windows Named Pipe listener.
    pub struct PipeListener {
        path: String,
        first: Mutex<Option<NamedPipeServer>>,
    }

    /// Windows Named Pipe stream (connected), server or client end.
    pub enum PipeStream {
        /// Accepted by a [`PipeListener`].
        Server(NamedPipeServer),
        /// Opened with [`PipeStream::connect`].
        Client(NamedPipeClient),
    }

    impl PipeListener {
        /// Create a Named Pipe server.
        ///
        /// The first instance is created right away so that clients can
        /// open the pipe before `accept` is called.
        pub async fn bind(path: &str) -> Result<Self> {
            let first = ServerOptions::new()
                .first_pipe_instance(true)
                .create(path)
                .map_err(RpcError::Io)?;

            Ok(Self {
                path: path.to_string(),
                first: Mutex::new(Some(first)),
            })
        }

        /// Accept a single connection.
        pub async fn accept(&self) -> Result<PipeStream> {
            let pending = self.first.lock().ok().and_then(|mut first| first.take());
            let server = match pending {
                Some(server) => server,
                None => ServerOptions::new()
                    .first_pipe_instance(false)
                    .create(&self.path)
                    .map_err(RpcError::Io)?,
            };

            server.connect().await?;

            Ok(PipeStream::Server(server))
        }

        /// Get the pipe path.
        pub fn path(&self) -> &str {
            &self.path
        }
    }

    impl PipeStream {
        /// Open the client end of a named pipe.
        pub async fn connect(path: &str) -> Result<Self> {
            loop {
                match ClientOptions::new().open(path) {
                    Ok(client) => return Ok(PipeStream::Client(client)),
                    Err(e) if e.raw_os_error() == Some(ERROR_PIPE_BUSY) => {
                        tokio::time::sleep(CONNECT_RETRY_INTERVAL).await;
                    }
                    Err(e) => return Err(RpcError::Io(e)),
                }
            }
        }

        pub(super) fn is_not_ready(err: &std::io::Error) -> bool {
            err.kind() == std::io::ErrorKind::NotFound
        }
    }

    impl AsyncRead for PipeStream {
        fn poll_read(
            self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
            buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            match self.get_mut() {
                PipeStream::Server(pipe) => std::pin::Pin::new(pipe).poll_read(cx, buf),
                PipeStream::Client(pipe) => std::pin::Pin::new(pipe).poll_read(cx, buf),
            }
        }
    }

    impl AsyncWrite for PipeStream {
        fn poll_write(
            self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
            buf: &[u8],
        ) -> std::task::Poll<std::io::Result<usize>> {
            match self.get_mut() {
                PipeStream::Server(pipe) => std::pin::Pin::new(pipe).poll_write(cx, buf),
                PipeStream::Client(pipe) => std::pin::Pin::new(pipe).poll_write(cx, buf),
            }
        }

        fn poll_flush(
            self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            match self.get_mut() {
                PipeStream::Server(pipe) => std::pin::Pin::new(pipe).poll_flush(cx),
                PipeStream::Client(pipe) => std::pin::Pin::new(pipe).poll_flush(cx),
            }
        }

        fn poll_shutdown(
            self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            match self.get_mut() {
                PipeStream::Server(pipe) => std::pin::Pin::new(pipe).poll_shutdown(cx),
                PipeStream::Client(pipe) => std::pin::Pin::new(pipe).poll_shutdown(cx),
            }
        }
    }
}

// ============================================================================
// Platform-independent re-exports
// ============================================================================

#[cfg(unix)]
pub use unix_impl::{PipeListener, PipeStream};

#[cfg(windows)]
pub use windows_impl::{PipeListener, PipeStream};

impl PipeStream {
    /// Connect, retrying while the server has not created the pipe yet.
    ///
    /// `None` retries forever.
    pub async fn connect_timeout(path: &str, timeout: Option<Duration>) -> Result<Self> {
        let attempt = async {
            loop {
                match Self::connect(path).await {
                    Err(RpcError::Io(e)) if Self::is_not_ready(&e) => {
                        tokio::time::sleep(CONNECT_RETRY_INTERVAL).await;
                    }
                    other => return other,
                }
            }
        };

        match timeout {
            Some(after) => tokio::time::timeout(after, attempt)
                .await
                .map_err(|_| RpcError::Timeout {
                    phase: "connect",
                    after,
                })?,
            None => attempt.await,
        }
    }
}
