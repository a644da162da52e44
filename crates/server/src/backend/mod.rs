//! Terminal backends and capability-based selection.
//!
//! Every connection is serviced by exactly one backend. Selection walks a
//! fixed fallback chain: container engine first, then a native PTY, then a
//! plain subprocess. Unavailability of a tier is expected, not an error;
//! probing makes the chain an explicit state machine instead of
//! exception-driven control flow.

use bollard::Docker;
use thiserror::Error;

use crate::config::Config;

pub mod container;
pub mod image;
pub mod process;
pub mod pty;

pub use image::{resolve_image, ImageSpec, DEFAULT_IMAGE_KEY};

/// The concrete mechanism servicing a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Ephemeral Docker container with an attached TTY.
    Container,
    /// Local shell on a native pseudo-terminal.
    Pty,
    /// Local shell as a plain, line-buffered subprocess.
    Process,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Container => write!(f, "container"),
            BackendKind::Pty => write!(f, "pty"),
            BackendKind::Process => write!(f, "process"),
        }
    }
}

/// Errors raised by backend drivers.
///
/// These are per-connection failures; they are reported to the affected
/// client and never propagate past its handler.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Container engine API call failed.
    #[error("container engine error: {0}")]
    Engine(#[from] bollard::errors::Error),

    /// Failed to allocate a PTY or spawn the shell on it.
    #[error("failed to spawn PTY: {0}")]
    PtySpawn(String),

    /// Failed to write input to the backend.
    #[error("failed to write to backend: {0}")]
    Write(String),

    /// Failed to resize the terminal.
    #[error("failed to resize terminal: {0}")]
    Resize(String),

    /// Failed to deliver a signal to the backend process.
    #[error("failed to deliver signal: {0}")]
    Signal(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of probing for a reachable container engine.
pub enum ContainerProbe {
    /// Engine is reachable; the handle is ready for use.
    Available(Docker),
    /// Engine is unreachable or disabled; the reason is diagnostic only.
    Unavailable(String),
}

/// Probe for a reachable container engine.
///
/// Unreachability is an expected condition (development machines without
/// Docker, the daemon being down) and triggers fallback, so this never
/// returns an error.
pub async fn probe_container_engine(config: &Config) -> ContainerProbe {
    if !config.container.enabled {
        return ContainerProbe::Unavailable(
            "container backend disabled in configuration".to_string(),
        );
    }

    let docker = match Docker::connect_with_local_defaults() {
        Ok(docker) => docker,
        Err(e) => {
            return ContainerProbe::Unavailable(format!("cannot construct engine client: {}", e))
        }
    };

    match docker.ping().await {
        Ok(_) => ContainerProbe::Available(docker),
        Err(e) => ContainerProbe::Unavailable(format!("engine not responding: {}", e)),
    }
}
