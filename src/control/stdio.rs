//! Stdout writer for the control plane.
//!
//! - **stdout**: the `$announce` line and nothing else
//! - **stderr**: logs (install the tracing subscriber with `with_writer(std::io::stderr)`)
//! - **Never use `println!`**: it may add `\r\n` on Windows

use std::io::Write;

/// Write a line to stdout.
///
/// Writes the string followed by a single `\n` and flushes, so a launcher
/// reading line by line sees it immediately.
pub fn write_stdout_line(line: &str) -> std::io::Result<()> {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    write_line(&mut handle, line)
}

fn write_line<W: Write>(out: &mut W, line: &str) -> std::io::Result<()> {
    out.write_all(line.as_bytes())?;
    out.write_all(b"\n")?;
    out.flush()
}
