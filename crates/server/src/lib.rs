//! # TermBridge Server Library
//!
//! This crate provides the server side of TermBridge: interactive terminal
//! sessions for browser clients, multiplexed over WebSockets.
//!
//! ## Overview
//!
//! Each incoming connection on the terminal path is attached to exactly one
//! backend, selected by capability in priority order:
//!
//! 1. **Container**: an ephemeral Docker container with an attached TTY,
//!    the workspace bind-mounted, and memory/CPU caps
//! 2. **Native PTY**: a local shell on a pseudo-terminal
//! 3. **Plain process**: a line-buffered local shell subprocess
//!
//! Container-backed sessions are tracked in a registry for idle eviction
//! and operator introspection; PTY and process sessions live and die with
//! their connection.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      HTTP / WebSocket                       │
//! │   /ws/pty?image=..   /health   /sessions   /sessions/:kill  │
//! ├─────────────────────────────────────────────────────────────┤
//! │                      Backend Selector                       │
//! │        Container ──▶ Native PTY ──▶ Plain Process           │
//! ├───────────────────────┬─────────────────────────────────────┤
//! │   Session Registry    │        Control-Frame Protocol       │
//! │  (idle sweep, kill)   │     (resize / signal / tools)       │
//! └───────────────────────┴─────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading, env overrides, validation
//! - [`backend`]: Backend probing, images, container/PTY/process drivers
//! - [`session`]: Session identity and the registry
//! - [`terminal`]: Per-connection relay loops
//! - [`http`]: Router and operational endpoints
//! - [`tools`]: Developer-tool availability probes

pub mod backend;
pub mod config;
pub mod http;
pub mod session;
pub mod terminal;
pub mod tools;

// Re-export protocol for convenience
pub use protocol;

// Re-export config types for convenience
pub use config::Config;

// Re-export backend types for convenience
pub use backend::{BackendError, BackendKind, ContainerProbe};

// Re-export session types for convenience
pub use session::{Session, SessionRegistry, SessionSummary};

// Re-export the HTTP surface for convenience
pub use http::{router, AppState};
