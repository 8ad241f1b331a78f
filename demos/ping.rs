//! Ping - one process launches another and calls it over a pipe.
//!
//! This example demonstrates:
//! - Hosting a contract with `$announce` on stdout
//! - Reading the announcement from a child process
//! - Calling through the generated client proxy
//!
//! # Running
//!
//! ```text
//! cargo run --example ping          # launches itself with `host`
//! RUST_LOG=debug cargo run --example ping
//! ```

use std::process::Stdio;
use std::sync::Arc;

use duplex_rpc::contract::Contract;
use duplex_rpc::control::parse_announcement;
use duplex_rpc::{DispatchTable, Host, RpcConfig, ServiceError, ServiceSender};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing_subscriber::EnvFilter;

duplex_rpc::contract! {
    #[contract(Pinger, client = PingClient)]
    pub trait Ping {
        /// Answer with `value + 1`.
        fn ping(&self, value: i32) -> i32;
    }
}

struct PlusOne;

impl Ping for PlusOne {
    async fn ping(&self, value: i32) -> Result<i32, ServiceError> {
        value
            .checked_add(1)
            .ok_or_else(|| ServiceError::new(format!("{} has no successor", value)))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // stdout is reserved for the announcement
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match std::env::args().nth(1).as_deref() {
        Some("host") => host().await,
        _ => launcher().await,
    }
}

async fn host() -> Result<(), Box<dyn std::error::Error>> {
    let table = Arc::new(DispatchTable::for_contract::<Pinger>()?);
    let host = Host::builder().announce(true).bind().await?;
    let handle = host.serve(Arc::new(PlusOne), table).await?;

    // Ends when the launcher closes its end.
    handle.join().await?;
    Ok(())
}

async fn launcher() -> Result<(), Box<dyn std::error::Error>> {
    let mut child = Command::new(std::env::current_exe()?)
        .arg("host")
        .stdout(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let stdout = child.stdout.take().ok_or("child stdout not captured")?;
    let mut lines = BufReader::new(stdout).lines();
    let line = lines
        .next_line()
        .await?
        .ok_or("host exited before announcing")?;

    let announcement = parse_announcement(&line)?;
    announcement.ensure_compatible(Pinger::descriptor())?;

    let sender = ServiceSender::connect(&announcement.pipe, RpcConfig::default()).await?;
    let client = sender.client::<PingClient<_>>();

    for value in [41, -1, i32::MAX] {
        match client.ping(value).await {
            Ok(answer) => eprintln!("ping({}) = {}", value, answer),
            Err(e) => eprintln!("ping({}) failed: {}", value, e),
        }
    }

    sender.close().await?;
    child.wait().await?;
    Ok(())
}
