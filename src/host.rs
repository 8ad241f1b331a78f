//! Service host: binds a pipe, announces it and serves one peer.
//!
//! The [`HostBuilder`] provides a fluent API for the pipe path, the
//! configuration and whether to announce. The [`Host`] manages the lifecycle:
//! 1. Bind the pipe listener
//! 2. Print `$announce` on stdout (optional)
//! 3. Accept the peer within the connect timeout
//! 4. Spawn the dispatcher
//!
//! # Example
//!
//! ```ignore
//! use duplex_rpc::{DispatchTable, Host};
//!
//! #[tokio::main]
//! async fn main() -> duplex_rpc::Result<()> {
//!     let table = Arc::new(DispatchTable::for_contract::<Pinger>()?);
//!     let host = Host::builder().announce(true).bind().await?;
//!     let handle = host.serve(Arc::new(PlusOne), table).await?;
//!     handle.join().await
//! }
//! ```

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::RpcConfig;
use crate::contract::DispatchTable;
use crate::control::{build_announce_message, write_stdout_line};
use crate::error::{Result, RpcError};
use crate::receiver::{ReceiverHandle, ServiceReceiver};
use crate::transport::{generate_pipe_path, PipeListener, PipeStream};

/// Prefix of generated pipe names.
pub const DEFAULT_PIPE_PREFIX: &str = "duplex-rpc";

/// Builder for a [`Host`].
#[derive(Debug, Clone, Default)]
pub struct HostBuilder {
    config: RpcConfig,
    pipe_path: Option<String>,
    announce: bool,
}

impl HostBuilder {
    /// Create a builder: generated pipe path, default config, no announcement.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration used by the dispatcher.
    pub fn config(mut self, config: RpcConfig) -> Self {
        self.config = config;
        self
    }

    /// Bind to this path instead of a generated one.
    ///
    /// See [`pipe_path_for`](crate::transport::pipe_path_for) for well-known names.
    pub fn pipe_path(mut self, path: impl Into<String>) -> Self {
        self.pipe_path = Some(path.into());
        self
    }

    /// Print the `$announce` line on stdout before accepting.
    pub fn announce(mut self, announce: bool) -> Self {
        self.announce = announce;
        self
    }

    /// Validate the configuration and bind the listener.
    pub async fn bind(self) -> Result<Host> {
        self.config.validate()?;
        let path = self
            .pipe_path
            .unwrap_or_else(|| generate_pipe_path(DEFAULT_PIPE_PREFIX));
        let listener = PipeListener::bind(&path).await?;
        debug!(path = %path, "Host listening");

        Ok(Host {
            listener,
            config: self.config,
            announce: self.announce,
        })
    }
}

/// A bound pipe waiting for its peer.
pub struct Host {
    listener: PipeListener,
    config: RpcConfig,
    announce: bool,
}

impl Host {
    /// Create a new host builder.
    pub fn builder() -> HostBuilder {
        HostBuilder::new()
    }

    /// The path peers connect to.
    pub fn pipe_path(&self) -> &str {
        self.listener.path()
    }

    /// The configuration handed to dispatchers.
    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    /// Accept one peer within the connect timeout.
    pub async fn accept(&self) -> Result<PipeStream> {
        let accept = self.listener.accept();
        match self.config.connect_timeout {
            Some(after) => tokio::time::timeout(after, accept)
                .await
                .map_err(|_| RpcError::Timeout {
                    phase: "accept",
                    after,
                })?,
            None => accept.await,
        }
    }

    /// Announce (if enabled), accept one peer and spawn a dispatcher for it.
    pub async fn serve<S>(
        &self,
        service: Arc<S>,
        table: Arc<DispatchTable<S>>,
    ) -> Result<ReceiverHandle>
    where
        S: Send + Sync + 'static,
    {
        if self.announce {
            let line = build_announce_message(self.pipe_path(), table.contract())?;
            write_stdout_line(&line)?;
        }

        let stream = self.accept().await?;
        info!(
            path = self.pipe_path(),
            contract = table.contract().name,
            "Peer connected"
        );

        let receiver = ServiceReceiver::with_config(stream, service, table, self.config.clone());
        Ok(receiver.spawn())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_bind_generated_path() {
        let host = Host::builder().bind().await.unwrap();
        assert!(host.pipe_path().contains(DEFAULT_PIPE_PREFIX));
        assert!(std::path::Path::new(host.pipe_path()).exists());
    }

    #[tokio::test]
    async fn test_bind_rejects_invalid_config() {
        let result = Host::builder()
            .config(RpcConfig::new().max_payload_size(0))
            .bind()
            .await;
        assert!(matches!(result, Err(RpcError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_accept_times_out() {
        let host = Host::builder()
            .config(RpcConfig::new().connect_timeout(Some(Duration::from_millis(30))))
            .bind()
            .await
            .unwrap();
        assert!(matches!(
            host.accept().await,
            Err(RpcError::Timeout { phase: "accept", .. })
        ));
    }

    #[tokio::test]
    async fn test_socket_removed_on_drop() {
        let host = Host::builder().bind().await.unwrap();
        let path = host.pipe_path().to_string();
        drop(host);
        assert!(!std::path::Path::new(&path).exists());
    }
}
