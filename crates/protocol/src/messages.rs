//! Control and server frame definitions for TermBridge.
//!
//! This module defines the JSON message shapes carried over the terminal
//! WebSocket and the classifier that separates them from raw terminal
//! bytes. All structured messages are plain JSON objects with a `type`
//! field; anything that is not a recognizable JSON object is terminal
//! data.

use serde::{Deserialize, Serialize};

/// Control frames sent by a client to configure its session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlFrame {
    /// Terminal geometry change.
    Resize {
        /// New terminal width in columns.
        cols: u16,
        /// New terminal height in rows.
        rows: u16,
    },

    /// Deliver a POSIX-style signal to the session's process.
    Signal {
        /// Signal name, e.g. `SIGINT` or `INT`.
        signal: String,
    },

    /// Probe which developer tools are available in the session.
    ///
    /// The server answers with one [`ServerFrame::Tool`] per probed tool.
    CheckTools,
}

/// Structured frames sent by the server to a client.
///
/// Diagnostic banners ("Connected to ...", exit notices) are deliberately
/// NOT wrapped in these shapes; they are plain text so clients render them
/// as terminal output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Availability report for a single probed tool.
    Tool {
        /// Tool binary name, e.g. `python3`.
        tool: String,
        /// Version string when the tool is present.
        #[serde(skip_serializing_if = "Option::is_none")]
        version: Option<String>,
        /// Failure description when the tool is missing or unprobeable.
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Informational notice (e.g. session evicted by the server).
    Info {
        /// Human-readable message.
        message: String,
    },
}

impl ServerFrame {
    /// Encode the frame as a JSON string for the wire.
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Build a tool report for a tool that was found.
    pub fn tool_found(tool: impl Into<String>, version: impl Into<String>) -> Self {
        Self::Tool {
            tool: tool.into(),
            version: Some(version.into()),
            error: None,
        }
    }

    /// Build a tool report for a tool that is missing or failed to probe.
    pub fn tool_missing(tool: impl Into<String>, error: impl Into<String>) -> Self {
        Self::Tool {
            tool: tool.into(),
            version: None,
            error: Some(error.into()),
        }
    }
}

/// Outcome of classifying one inbound payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound<'a> {
    /// A recognized control frame.
    Control(ControlFrame),
    /// A well-formed JSON object that is not a recognized control frame.
    /// Dropped silently; never forwarded to the terminal.
    Ignored,
    /// Raw terminal input, forwarded verbatim.
    Data(&'a str),
}

/// Classify an inbound payload as control frame, ignorable JSON, or raw
/// terminal data.
///
/// The rule, preserved from the wire convention this protocol formalizes:
/// a payload is a candidate control frame iff it begins with `{` after
/// trimming. Candidates that fail to parse as JSON are terminal input
/// (someone may legitimately type `{` into a shell); candidates that parse
/// but do not match a known control shape are ignored.
///
/// Returns the original, untrimmed payload in [`Inbound::Data`] so raw
/// input is never altered by classification.
pub fn classify(payload: &str) -> Inbound<'_> {
    let trimmed = payload.trim();
    if !trimmed.starts_with('{') {
        return Inbound::Data(payload);
    }

    let value: serde_json::Value = match serde_json::from_str(trimmed) {
        Ok(value) => value,
        Err(_) => return Inbound::Data(payload),
    };

    if !value.is_object() {
        return Inbound::Data(payload);
    }

    match serde_json::from_value::<ControlFrame>(value) {
        Ok(frame) => Inbound::Control(frame),
        Err(_) => Inbound::Ignored,
    }
}
