//! Control plane module - `$announce` message and stdio I/O.
//!
//! The control plane is one JSON line on stdout. After it, all
//! communication happens on the data plane (pipe).
//!
//! # Workflow
//!
//! 1. Host binds a pipe listener
//! 2. Host prints `$announce` to stdout (JSON-RPC)
//! 3. Launcher parses it and checks the contract
//! 4. Launcher connects to the pipe
//! 5. Framed calls begin on the data plane
//!
//! # Example
//!
//! ```ignore
//! use duplex_rpc::control::{build_announce_message, write_stdout_line};
//! use duplex_rpc::transport::generate_pipe_path;
//!
//! let pipe_path = generate_pipe_path("sensor");
//! let line = build_announce_message(&pipe_path, SensorService::descriptor())?;
//! write_stdout_line(&line)?;
//! ```

mod announce;
mod stdio;

pub use announce::{
    build_announce_message, parse_announcement, AnnouncedContract, AnnouncedOperation,
    AnnouncedParam, Announcement, ANNOUNCE_METHOD, PROTOCOL_VERSION,
};
pub use stdio::write_stdout_line;
