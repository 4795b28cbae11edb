//! Fluent assertions over a running subprocess
//!
//! Each assertion consumes the handle and gives it back on success, so checks
//! read as a chain:
//!
//! ```ignore
//! ctx.run("./hello").await?.stdout("Hello").await?.exit(0).await?;
//! ```

use anyhow::Context;
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin};
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use super::matcher::Matcher;
use crate::context::CheckContext;
use crate::core::utils::strip_ansi;
use crate::error::CheckError;

/// What happened while waiting for more output
enum Fill {
    Data,
    Eof,
    TimedOut,
}

/// One spawned subprocess, owned by the check that started it
pub struct ProcessHandle {
    ctx: CheckContext,
    command: String,
    child: Child,
    pgid: Option<Pid>,
    stdin: Option<ChildStdin>,
    output: mpsc::UnboundedReceiver<Vec<u8>>,
    /// Decoded output not yet consumed by a match
    buffer: String,
    /// Trailing bytes of an incomplete UTF-8 sequence
    pending: Vec<u8>,
    eof: bool,
    status: Option<ExitStatus>,
    timeout: Option<Duration>,
}

impl ProcessHandle {
    pub(super) fn new(
        ctx: CheckContext,
        command: String,
        mut child: Child,
        output: mpsc::UnboundedReceiver<Vec<u8>>,
    ) -> Self {
        let pgid = child.id().map(|pid| Pid::from_raw(pid as i32));
        let stdin = child.stdin.take();
        Self {
            ctx,
            command,
            child,
            pgid,
            stdin,
            output,
            buffer: String::new(),
            pending: Vec::new(),
            eof: false,
            status: None,
            timeout: None,
        }
    }

    /// Override the timeout for subsequent assertions on this handle
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn output_timeout(&self) -> Duration {
        self.timeout.unwrap_or_else(|| self.ctx.config().stdout_timeout())
    }

    fn exit_timeout(&self) -> Duration {
        self.timeout.unwrap_or_else(|| self.ctx.config().exit_timeout())
    }

    /// Send a line of input
    pub async fn stdin(mut self, text: &str) -> Result<Self, CheckError> {
        self.ctx.log(format!("sending input {}...", text));

        if self.has_exited()? {
            return Err(CheckError::ProcessClosed);
        }

        let deadline = Instant::now() + self.output_timeout();
        let stdin = self.stdin.as_mut().ok_or(CheckError::ProcessClosed)?;
        let mut line = text.to_string();
        line.push('\n');

        let written = timeout_at(deadline, async {
            stdin.write_all(line.as_bytes()).await?;
            stdin.flush().await
        })
        .await;

        match written {
            Ok(Ok(())) => Ok(self),
            Ok(Err(err)) if err.kind() == std::io::ErrorKind::BrokenPipe => {
                Err(CheckError::ProcessClosed)
            }
            Ok(Err(err)) => Err(anyhow::Error::new(err)
                .context("Failed to write to process stdin")
                .into()),
            Err(_) => {
                self.kill();
                Err(CheckError::ProcessTimeout {
                    waiting_for: "program to accept input".to_string(),
                })
            }
        }
    }

    /// Wait until the output contains `expected`
    pub async fn stdout(mut self, expected: impl Into<Matcher>) -> Result<Self, CheckError> {
        let matcher = expected.into();
        self.ctx.log(format!("checking for output \"{}\"...", matcher));

        let deadline = Instant::now() + self.output_timeout();
        loop {
            let visible = strip_ansi(&self.buffer);
            if let Some((_, end)) = matcher.find(&visible) {
                self.buffer = visible[end..].to_string();
                return Ok(self);
            }
            if self.eof {
                return Err(CheckError::mismatch(matcher.to_string(), &visible));
            }
            if let Fill::TimedOut = self.fill(deadline).await {
                self.kill();
                return Err(CheckError::ProcessTimeout {
                    waiting_for: format!("{:?}", matcher.to_string()),
                });
            }
        }
    }

    /// Assert that `unexpected` does not appear before the process finishes
    /// or the timeout elapses
    pub async fn reject(mut self, unexpected: impl Into<Matcher>) -> Result<Self, CheckError> {
        let matcher = unexpected.into();
        self.ctx
            .log(format!("checking that output does not contain \"{}\"...", matcher));

        let deadline = Instant::now() + self.output_timeout();
        loop {
            let visible = strip_ansi(&self.buffer);
            if matcher.find(&visible).is_some() {
                return Err(CheckError::failure(format!(
                    "expected output not to contain {:?}",
                    matcher.to_string()
                )));
            }
            if self.eof {
                return Ok(self);
            }
            if let Fill::TimedOut = self.fill(deadline).await {
                return Ok(self);
            }
        }
    }

    /// Assert that the process exits with `code`
    pub async fn exit(mut self, code: i32) -> Result<Self, CheckError> {
        self.ctx
            .log(format!("checking that program exited with status {}...", code));

        let status = self.wait().await?;
        match status.code() {
            Some(actual) if actual == code => Ok(self),
            _ => Err(CheckError::failure(format!(
                "expected exit code {}, not {}",
                code,
                describe_status(status)
            ))),
        }
    }

    /// Assert that the process was terminated by a signal
    pub async fn killed(mut self) -> Result<Self, CheckError> {
        self.ctx.log("checking that program was terminated by a signal...");

        let status = self.wait().await?;
        if status.signal().is_some() {
            Ok(self)
        } else {
            Err(CheckError::failure(format!(
                "expected program to be terminated by a signal, not {}",
                describe_status(status)
            )))
        }
    }

    /// Close stdin and wait for the process to terminate
    pub async fn wait(&mut self) -> Result<ExitStatus, CheckError> {
        if let Some(status) = self.status {
            return Ok(status);
        }
        drop(self.stdin.take());

        let deadline = Instant::now() + self.exit_timeout();
        let status = match timeout_at(deadline, self.child.wait()).await {
            Ok(status) => status.context("Failed to wait for process")?,
            Err(_) => {
                self.kill();
                return Err(CheckError::ProcessTimeout {
                    waiting_for: "program to exit".to_string(),
                });
            }
        };
        self.status = Some(status);
        debug!("`{}` finished with {}", self.command, describe_status(status));

        // Collect output still in flight; a lingering child holding the pipe
        // only delays this until the deadline.
        while let Fill::Data = self.fill(deadline).await {}

        Ok(status)
    }

    /// Wait for the process and return all unconsumed output, ANSI-stripped
    pub async fn output(&mut self) -> Result<String, CheckError> {
        self.wait().await?;
        Ok(strip_ansi(&std::mem::take(&mut self.buffer)))
    }

    fn has_exited(&mut self) -> Result<bool, CheckError> {
        if self.status.is_some() {
            return Ok(true);
        }
        match self
            .child
            .try_wait()
            .context("Failed to poll process status")?
        {
            Some(status) => {
                self.status = Some(status);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn fill(&mut self, deadline: Instant) -> Fill {
        if self.eof {
            return Fill::Eof;
        }
        match timeout_at(deadline, self.output.recv()).await {
            Ok(Some(bytes)) => {
                self.push_bytes(&bytes);
                Fill::Data
            }
            Ok(None) => {
                self.eof = true;
                if !self.pending.is_empty() {
                    let rest = std::mem::take(&mut self.pending);
                    self.buffer.push_str(&String::from_utf8_lossy(&rest));
                }
                Fill::Eof
            }
            Err(_) => Fill::TimedOut,
        }
    }

    fn push_bytes(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
        let complete = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            // Incomplete sequence at the end: keep it for the next chunk
            Err(err) if err.error_len().is_none() => err.valid_up_to(),
            Err(_) => self.pending.len(),
        };
        let rest = self.pending.split_off(complete);
        self.buffer.push_str(&String::from_utf8_lossy(&self.pending));
        self.pending = rest;
    }

    /// Kill the process and everything in its process group
    fn kill(&mut self) {
        if let Some(pgid) = self.pgid {
            match killpg(pgid, Signal::SIGKILL) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(err) => warn!("Failed to kill process group of `{}`: {}", self.command, err),
            }
        }
        if self.status.is_none() {
            let _ = self.child.start_kill();
        }
    }
}

impl Drop for ProcessHandle {
    /// Background children outlive the leader, so the whole group goes
    /// even when the program itself already exited.
    fn drop(&mut self) {
        self.kill();
    }
}

fn describe_status(status: ExitStatus) -> String {
    match (status.code(), status.signal()) {
        (Some(code), _) => code.to_string(),
        (None, Some(signal)) => format!("termination by signal {}", signal),
        (None, None) => "unknown status".to_string(),
    }
}
