//! JSON line serialisation of daemon output.

use nan_core::{CommandReply, InterfaceSnapshot, NanCapabilities, NanError, Notification};
use serde::Serialize;

use crate::error::Result;

/// One line written to the output stream.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Output {
    /// Synchronous reply to a host command.
    Reply {
        line: usize,
        #[serde(flatten)]
        reply: CommandReply,
    },
    /// Reply to `get_capabilities`.
    Capabilities {
        line: usize,
        #[serde(flatten)]
        reply: CommandReply,
        capabilities: NanCapabilities,
    },
    /// Outcome of applying a firmware indication.
    Indication {
        line: usize,
        op: &'static str,
        applied: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Notification {
        #[serde(flatten)]
        notification: Notification,
    },
    Snapshot {
        line: usize,
        snapshot: InterfaceSnapshot,
    },
    /// A line that could not be parsed.
    Error { line: usize, message: String },
}

impl Output {
    pub fn indication(
        line: usize,
        op: &'static str,
        result: std::result::Result<(), NanError>,
    ) -> Self {
        match result {
            Ok(()) => Output::Indication {
                line,
                op,
                applied: true,
                error: None,
            },
            Err(e) => Output::Indication {
                line,
                op,
                applied: false,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Serialises `output` as a single JSON line without the trailing newline.
pub fn to_json_line(output: &Output) -> Result<String> {
    Ok(serde_json::to_string(output)?)
}
