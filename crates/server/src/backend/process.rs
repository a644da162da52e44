//! Plain-process backend: the last-resort fallback.
//!
//! When neither a container engine nor a PTY is available, the shell runs
//! as an ordinary piped subprocess. Interactivity is line-buffered: no
//! prompt echo, no terminal geometry, but commands still execute and
//! their output still reaches the client.

use std::path::Path;
use std::process::Stdio;

use nix::sys::signal::kill;
use nix::unistd::Pid;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};

use crate::backend::pty::parse_signal;
use crate::backend::BackendError;

/// A shell running as a plain subprocess with piped stdio.
pub struct ProcessShell {
    /// The shell child process.
    pub(crate) child: Child,

    /// Piped stdin, fed one line per client message.
    stdin: ChildStdin,

    /// Piped stdout, relayed to the client.
    pub(crate) stdout: ChildStdout,

    /// Piped stderr, relayed to the client.
    pub(crate) stderr: ChildStderr,

    /// Shell process id, for signal delivery.
    pid: Option<u32>,
}

impl ProcessShell {
    /// Spawn the shell in the given working directory with the server's
    /// environment.
    pub fn spawn(shell: &str, cwd: &Path) -> Result<Self, BackendError> {
        let mut child = Command::new(shell)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .current_dir(cwd)
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BackendError::Write("child stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BackendError::Write("child stdout unavailable".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| BackendError::Write("child stderr unavailable".to_string()))?;

        let pid = child.id();

        Ok(Self {
            child,
            stdin,
            stdout,
            stderr,
            pid,
        })
    }

    /// Returns the shell process id, if known.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Write one client payload to the shell, always terminated with a
    /// newline so the line-buffered shell executes it.
    pub async fn write_line(&mut self, data: &str) -> Result<(), BackendError> {
        self.stdin
            .write_all(data.as_bytes())
            .await
            .map_err(|e| BackendError::Write(e.to_string()))?;
        self.stdin
            .write_all(b"\n")
            .await
            .map_err(|e| BackendError::Write(e.to_string()))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| BackendError::Write(e.to_string()))?;
        Ok(())
    }

    /// Deliver a named POSIX signal to the shell process.
    pub fn signal(&self, name: &str) -> Result<(), BackendError> {
        let signal = parse_signal(name)
            .ok_or_else(|| BackendError::Signal(format!("unknown signal: {}", name)))?;
        let pid = self
            .pid
            .ok_or_else(|| BackendError::Signal("shell pid unknown".to_string()))?;

        kill(Pid::from_raw(pid as i32), signal)
            .map_err(|e| BackendError::Signal(e.to_string()))?;
        Ok(())
    }

    /// Terminate the shell, best-effort.
    pub async fn kill(&mut self) {
        if let Err(e) = self.child.kill().await {
            tracing::debug!(error = %e, "Process shell kill failed");
        }
    }
}
