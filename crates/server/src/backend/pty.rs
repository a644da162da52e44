//! Native PTY backend: a local shell on a pseudo-terminal.
//!
//! This is the first fallback tier when no container engine is reachable.
//! The shell runs as the server's own OS user in the workspace directory,
//! with no sandboxing; selection of this backend is logged loudly and it
//! is intended for local development.

use std::io::{Read, Write};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use tokio::sync::{mpsc, Mutex};

use crate::backend::BackendError;

/// Default terminal geometry for new PTY sessions.
pub const DEFAULT_COLS: u16 = 120;
pub const DEFAULT_ROWS: u16 = 30;

/// Buffer size for reading from the PTY.
const READ_BUFFER_SIZE: usize = 4096;

/// Capacity of the output channel; the relay loop is the only consumer.
const OUTPUT_CHANNEL_CAPACITY: usize = 256;

/// A shell process on a native pseudo-terminal.
///
/// Unlike container sessions, a PTY session is owned entirely by one
/// WebSocket connection: it is not registered anywhere and dies with the
/// connection or the shell, whichever goes first.
pub struct PtySession {
    /// The PTY master handle, used for resizes.
    master: Mutex<Box<dyn MasterPty + Send>>,

    /// Writer feeding the shell's stdin.
    writer: Mutex<Box<dyn Write + Send>>,

    /// The shell child process.
    child: Mutex<Box<dyn Child + Send + Sync>>,

    /// Cleared when the shell exits or the session is killed.
    running: Arc<AtomicBool>,

    /// Shell process id, for signal delivery.
    pid: Option<u32>,
}

impl PtySession {
    /// Spawn a shell on a fresh PTY with the default geometry.
    ///
    /// Returns the session and the receiver carrying shell output. The
    /// receiver yields `None` once the shell reaches EOF.
    pub fn spawn(
        shell: &str,
        cwd: &std::path::Path,
    ) -> Result<(Self, mpsc::Receiver<Vec<u8>>), BackendError> {
        let pty_system = native_pty_system();

        let pair = pty_system
            .openpty(PtySize {
                rows: DEFAULT_ROWS,
                cols: DEFAULT_COLS,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| BackendError::PtySpawn(e.to_string()))?;

        let mut cmd = CommandBuilder::new(shell);
        cmd.cwd(cwd);
        cmd.env("TERM", "xterm-256color");

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| BackendError::PtySpawn(e.to_string()))?;

        let pid = child.process_id();

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| BackendError::PtySpawn(e.to_string()))?;

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| BackendError::PtySpawn(e.to_string()))?;

        let (output_tx, output_rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);
        let running = Arc::new(AtomicBool::new(true));

        let session = PtySession {
            master: Mutex::new(pair.master),
            writer: Mutex::new(writer),
            child: Mutex::new(child),
            running: Arc::clone(&running),
            pid,
        };

        session.start_read_loop(reader, output_tx);

        Ok((session, output_rx))
    }

    /// Returns the shell process id, if known.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Returns whether the shell is still running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Write input bytes to the shell's stdin.
    pub async fn write(&self, data: &[u8]) -> Result<(), BackendError> {
        if !self.is_running() {
            return Err(BackendError::Write("shell has exited".to_string()));
        }

        let mut writer = self.writer.lock().await;
        writer
            .write_all(data)
            .map_err(|e| BackendError::Write(e.to_string()))?;
        writer
            .flush()
            .map_err(|e| BackendError::Write(e.to_string()))?;

        Ok(())
    }

    /// Resize the PTY to the given geometry.
    pub async fn resize(&self, cols: u16, rows: u16) -> Result<(), BackendError> {
        let master = self.master.lock().await;
        master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| BackendError::Resize(e.to_string()))?;

        tracing::debug!(cols = cols, rows = rows, "Resized PTY");
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

        tracing::debug!(pid = pid, signal = %name, "Delivered signal to shell");
        Ok(())
    }

    /// Wait briefly for the shell's exit code after its output reached
    /// EOF. Falls back to `-1` if the process refuses to be reaped.
    pub async fn exit_code(&self) -> i32 {
        let mut child = self.child.lock().await;

        for _ in 0..40 {
            match child.try_wait() {
                Ok(Some(status)) => return status.exit_code() as i32,
                Ok(None) => tokio::time::sleep(Duration::from_millis(50)).await,
                Err(_) => break,
            }
        }

        -1
    }

    /// Terminate the shell and reap it, best-effort.
    pub async fn kill(&self) {
        self.running.store(false, Ordering::SeqCst);

        let mut child = self.child.lock().await;
        if let Err(e) = child.kill() {
            tracing::debug!(error = %e, "PTY child kill failed");
        }
        let _ = child.wait();
    }

    /// Spawn the blocking read loop feeding shell output into the channel.
    ///
    /// The loop ends on EOF (shell exit), read error, or when the receiver
    /// is dropped (connection gone); the channel closing is the EOF signal
    /// for the relay loop.
    fn start_read_loop(&self, reader: Box<dyn Read + Send>, output_tx: mpsc::Sender<Vec<u8>>) {
        let running = Arc::clone(&self.running);
        let reader = Arc::new(std::sync::Mutex::new(reader));

        tokio::spawn(async move {
            loop {
                if !running.load(Ordering::SeqCst) {
                    break;
                }

                let reader = Arc::clone(&reader);
                let result = tokio::task::spawn_blocking(move || {
                    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
                    let mut reader = reader.lock().expect("PTY reader lock poisoned");
                    match reader.read(&mut buffer) {
                        Ok(0) => Ok(None),
                        Ok(n) => {
                            buffer.truncate(n);
                            Ok(Some(buffer))
                        }
                        Err(e) => Err(e),
                    }
                })
                .await;

                match result {
                    Ok(Ok(Some(data))) => {
                        if output_tx.send(data).await.is_err() {
                            // Receiver dropped: connection is gone.
                            break;
                        }
                    }
                    Ok(Ok(None)) => {
                        tracing::debug!("PTY EOF - shell exited");
                        running.store(false, Ordering::SeqCst);
                        break;
                    }
                    Ok(Err(e)) => {
                        if running.load(Ordering::SeqCst) {
                            tracing::debug!(error = %e, "PTY read error");
                        }
                        running.store(false, Ordering::SeqCst);
                        break;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "PTY read task panicked");
                        running.store(false, Ordering::SeqCst);
                        break;
                    }
                }
            }
        });
    }
}

/// Parse a POSIX signal name, with or without the `SIG` prefix.
pub(crate) fn parse_signal(name: &str) -> Option<Signal> {
    let upper = name.trim().to_uppercase();
    let full = if upper.starts_with("SIG") {
        upper
    } else {
        format!("SIG{}", upper)
    };
    Signal::from_str(&full).ok()
}
