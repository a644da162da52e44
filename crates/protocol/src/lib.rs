//! # TermBridge Protocol Library
//!
//! This crate defines the thin wire convention used between the TermBridge
//! server and its terminal clients.
//!
//! ## Overview
//!
//! Terminal sessions are carried over a single WebSocket. The same text
//! stream carries both raw terminal bytes and structured JSON control
//! messages, so the protocol's core job is classification:
//!
//! - **Control frames**: JSON objects configuring the session
//!   (`resize`, `signal`, `check_tools`)
//! - **Server frames**: structured replies sent by the server
//!   (`tool`, `info`)
//! - **Raw data**: everything else, forwarded verbatim as terminal I/O
//!
//! ## Classification
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                 Inbound text payload                 │
//! ├──────────────────────────────────────────────────────┤
//! │ starts with '{' after trim?  ──no──▶  Data           │
//! │          │yes                                        │
//! │ parses as a JSON object?     ──no──▶  Data           │
//! │          │yes                                        │
//! │ recognized control shape?    ──no──▶  Ignored        │
//! │          │yes                                        │
//! │                              ──────▶  Control(frame) │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! A malformed message that merely starts with `{` is terminal input, not
//! an error; a well-formed JSON object with an unrecognized shape is
//! dropped silently. The classifier never fails.
//!
//! ## Example Usage
//!
//! ```rust
//! use protocol::{classify, ControlFrame, Inbound};
//!
//! match classify(r#"{"type":"resize","cols":80,"rows":24}"#) {
//!     Inbound::Control(ControlFrame::Resize { cols, rows }) => {
//!         assert_eq!((cols, rows), (80, 24));
//!     }
//!     _ => unreachable!(),
//! }
//!
//! assert!(matches!(classify("ls -la\n"), Inbound::Data(_)));
//! ```
//!
//! ## Modules
//!
//! - [`messages`]: Control/server frame definitions and the classifier
//! - [`error`]: Error types

pub mod error;
pub mod messages;

pub use error::{ProtocolError, Result};
pub use messages::{classify, ControlFrame, Inbound, ServerFrame};
