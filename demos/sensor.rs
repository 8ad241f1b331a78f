//! Sensor - two processes calling each other over two pipes.
//!
//! The sensor process hosts `SensorControl`. The controller hosts
//! `SensorListener` on its own pipe and hands that path to the sensor with
//! `set_listener`; from then on the sensor pushes body frames back to it.
//!
//! ```text
//!  controller                         sensor
//!  ──────────                         ──────
//!  SensorControl caller  ── pipe A ─► dispatcher
//!  dispatcher            ◄─ pipe B ── SensorListener caller
//! ```
//!
//! # Running
//!
//! ```text
//! RUST_LOG=info cargo run --example sensor
//! ```

use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use duplex_rpc::contract::Contract;
use duplex_rpc::control::parse_announcement;
use duplex_rpc::transport::PipeStream;
use duplex_rpc::{DispatchTable, Host, RpcConfig, ServiceError, ServiceSender};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec4 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BodyJoint {
    pub position: Vec3,
    pub orientation: Vec4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum JointType {
    SpineBase,
    Neck,
    Head,
    HandLeft,
    HandRight,
}

duplex_rpc::contract! {
    #[contract(SensorControl, client = SensorControlClient)]
    /// Commands accepted by the sensor process.
    pub trait Control {
        fn initialize_sensor(&self);
        fn set_listener(&self, pipe_path: String);
        /// Push a frame to the listener every ~33ms until stopped.
        fn start_streaming(&self);
        /// Returns the number of frames sent.
        fn stop_streaming(&self) -> u32;
    }
}

duplex_rpc::contract! {
    #[contract(SensorListener, client = SensorListenerClient)]
    /// Callbacks the sensor invokes on the controller.
    pub trait Listen {
        fn on_body_frame(&self, frame: BTreeMap<JointType, BodyJoint>);
        fn on_log_message(&self, message: String);
    }
}

type ListenerClient = SensorListenerClient<ServiceSender<PipeStream>>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // stdout is reserved for the announcement
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match std::env::args().nth(1).as_deref() {
        Some("sensor") => sensor().await,
        _ => controller().await,
    }
}

// -- sensor process -------------------------------------------------------

#[derive(Default)]
struct Sensor {
    initialized: std::sync::atomic::AtomicBool,
    listener: Mutex<Option<ListenerClient>>,
    streaming: Mutex<Option<JoinHandle<()>>>,
    frames_sent: Arc<AtomicU32>,
}

impl Sensor {
    fn listener(&self) -> Result<ListenerClient, ServiceError> {
        let slot = self
            .listener
            .lock()
            .map_err(|_| ServiceError::new("listener lock poisoned"))?;
        slot.clone()
            .ok_or_else(|| ServiceError::message_only("no listener set"))
    }
}

impl Control for Sensor {
    async fn initialize_sensor(&self) -> Result<(), ServiceError> {
        self.initialized.store(true, Ordering::SeqCst);
        info!("Sensor initialized");
        Ok(())
    }

    async fn set_listener(&self, pipe_path: String) -> Result<(), ServiceError> {
        let sender = ServiceSender::connect(&pipe_path, RpcConfig::default()).await?;
        let client: ListenerClient = sender.client();
        client
            .on_log_message(format!("sensor connected to {}", pipe_path))
            .await?;

        let previous = self
            .listener
            .lock()
            .map_err(|_| ServiceError::new("listener lock poisoned"))?
            .replace(client);
        if let Some(previous) = previous {
            previous.remote().close().await?;
        }
        Ok(())
    }

    async fn start_streaming(&self) -> Result<(), ServiceError> {
        if !self.initialized.load(Ordering::SeqCst) {
            return Err(ServiceError::message_only("sensor is not initialized"));
        }
        let listener = self.listener()?;
        let frames_sent = Arc::clone(&self.frames_sent);
        frames_sent.store(0, Ordering::SeqCst);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(33));
            loop {
                ticker.tick().await;
                let n = frames_sent.fetch_add(1, Ordering::SeqCst);
                if let Err(e) = listener.on_body_frame(body_frame(n)).await {
                    warn!(error = %e, "Listener call failed, stopping stream");
                    break;
                }
            }
        });

        let mut streaming = self
            .streaming
            .lock()
            .map_err(|_| ServiceError::new("streaming lock poisoned"))?;
        if let Some(old) = streaming.replace(task) {
            old.abort();
        }
        Ok(())
    }

    async fn stop_streaming(&self) -> Result<u32, ServiceError> {
        let task = self
            .streaming
            .lock()
            .map_err(|_| ServiceError::new("streaming lock poisoned"))?
            .take();
        if let Some(task) = task {
            task.abort();
            // An aborted task reports a cancelled JoinError.
            let _ = task.await;
        }

        let sent = self.frames_sent.load(Ordering::SeqCst);
        self.listener()?
            .on_log_message(format!("streaming stopped after {} frames", sent))
            .await?;
        Ok(sent)
    }
}

fn body_frame(n: u32) -> BTreeMap<JointType, BodyJoint> {
    let t = n as f32 * 0.033;
    let joint = |height: f32, sway: f32| BodyJoint {
        position: Vec3 {
            x: sway * t.sin(),
            y: height,
            z: 2.0,
        },
        orientation: Vec4 {
            x: 0.0,
            y: (t / 2.0).sin(),
            z: 0.0,
            w: (t / 2.0).cos(),
        },
    };

    BTreeMap::from([
        (JointType::SpineBase, joint(0.9, 0.02)),
        (JointType::Neck, joint(1.5, 0.04)),
        (JointType::Head, joint(1.7, 0.05)),
        (JointType::HandLeft, joint(1.1, 0.3)),
        (JointType::HandRight, joint(1.1, -0.3)),
    ])
}

async fn sensor() -> Result<(), Box<dyn std::error::Error>> {
    let table = Arc::new(DispatchTable::for_contract::<SensorControl>()?);
    let host = Host::builder().announce(true).bind().await?;
    let handle = host.serve(Arc::new(Sensor::default()), table).await?;
    handle.join().await?;
    Ok(())
}

// -- controller process ---------------------------------------------------

#[derive(Default)]
struct Printer {
    frames: AtomicU32,
}

impl Listen for Printer {
    async fn on_body_frame(
        &self,
        frame: BTreeMap<JointType, BodyJoint>,
    ) -> Result<(), ServiceError> {
        let n = self.frames.fetch_add(1, Ordering::SeqCst);
        if n % 10 == 0 {
            if let Some(head) = frame.get(&JointType::Head) {
                info!(frame = n, x = head.position.x, y = head.position.y, "Head position");
            }
        }
        Ok(())
    }

    async fn on_log_message(&self, message: String) -> Result<(), ServiceError> {
        info!(%message, "Sensor says");
        Ok(())
    }
}

async fn controller() -> Result<(), Box<dyn std::error::Error>> {
    let mut child = Command::new(std::env::current_exe()?)
        .arg("sensor")
        .stdout(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let stdout = child.stdout.take().ok_or("child stdout not captured")?;
    let line = BufReader::new(stdout)
        .lines()
        .next_line()
        .await?
        .ok_or("sensor exited before announcing")?;
    let announcement = parse_announcement(&line)?;
    announcement.ensure_compatible(SensorControl::descriptor())?;

    // Host the callback side before telling the sensor about it.
    let printer = Arc::new(Printer::default());
    let listener_host = Host::builder().bind().await?;
    let listener_path = listener_host.pipe_path().to_string();
    let listener_table = Arc::new(DispatchTable::for_contract::<SensorListener>()?);
    let listener_service = Arc::clone(&printer);
    let listener_task = tokio::spawn(async move {
        let handle = listener_host.serve(listener_service, listener_table).await?;
        handle.join().await
    });

    let sender = ServiceSender::connect(&announcement.pipe, RpcConfig::default()).await?;
    let control = sender.client::<SensorControlClient<_>>();

    if let Err(e) = control.start_streaming().await {
        info!(error = %e, "Expected failure before initialization");
    }
    control.initialize_sensor().await?;
    control.set_listener(listener_path).await?;
    control.start_streaming().await?;
    tokio::time::sleep(Duration::from_millis(500)).await;
    let sent = control.stop_streaming().await?;

    info!(
        sent,
        received = printer.frames.load(Ordering::SeqCst),
        "Streaming finished"
    );

    // Closing the control pipe ends the sensor, which closes the listener pipe.
    sender.close().await?;
    child.wait().await?;
    listener_task.await??;
    Ok(())
}
