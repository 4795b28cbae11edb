//! Runner module - Process harness
//!
//! This module spawns submission programs inside a check's working area and
//! exposes them as a `ProcessHandle` with chainable assertions:
//! - `stdin`: feed a line of input
//! - `stdout` / `reject`: wait for (or rule out) output, literal or regex
//! - `exit` / `killed`: assert how the program terminated
//!
//! All comparisons happen on ANSI-stripped text. Every process gets its own
//! process group so a timeout can kill it together with its children.
//!
//! The runner module does NOT:
//! - Know about languages or compilation
//! - Decide whether a check passed (errors do that)

pub mod matcher;
pub mod process;

use anyhow::Context;
use std::collections::BTreeMap;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::debug;

use crate::context::CheckContext;
use crate::error::CheckError;

pub use matcher::{decimal, Matcher};
pub use process::ProcessHandle;

/// Spawn `command` through the shell with the working area as its directory
pub(crate) async fn spawn(
    ctx: &CheckContext,
    command: &str,
    env: &BTreeMap<String, String>,
) -> Result<ProcessHandle, CheckError> {
    ctx.log(format!("running {}...", command));
    debug!("Spawning `{}` in {:?}", command, ctx.root());

    let mut child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(ctx.root())
        .envs(env)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("Failed to spawn `{}`", command))?;

    let (tx, rx) = mpsc::unbounded_channel();
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(pump(stdout, tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(pump(stderr, tx));
    }

    Ok(ProcessHandle::new(ctx.clone(), command.to_string(), child, rx))
}

/// Forward everything read from `reader` until EOF
async fn pump<R>(mut reader: R, tx: mpsc::UnboundedSender<Vec<u8>>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if tx.send(buf[..n].to_vec()).is_err() {
                    break;
                }
            }
        }
    }
}
