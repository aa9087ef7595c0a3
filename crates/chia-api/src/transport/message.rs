//! Daemon message envelope.
//!
//! Every WebSocket text frame exchanged with the daemon carries one JSON
//! envelope:
//!
//! ```text
//! {"command": "...", "data": {...}, "origin": "...", "destination": "...",
//!  "ack": false, "request_id": "..."}
//! ```
//!
//! Requests have `ack = false` and a fresh `request_id`; the matching response
//! echoes the `request_id` with `ack = true`. Push events are unsolicited
//! messages with `ack = false`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Command name the daemon uses for service state-change pushes.
pub const STATE_CHANGED: &str = "state_changed";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub command: String,
    #[serde(default)]
    pub data: Value,
    pub origin: String,
    pub destination: String,
    #[serde(default)]
    pub ack: bool,
    #[serde(default)]
    pub request_id: String,
}

impl Message {
    /// Create a request with a fresh request id.
    pub fn request(
        origin: impl Into<String>,
        destination: impl Into<String>,
        command: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            command: command.into(),
            data,
            origin: origin.into(),
            destination: destination.into(),
            ack: false,
            request_id: uuid::Uuid::new_v4().simple().to_string(),
        }
    }

    /// Create the acknowledgement for this request.
    pub fn response(&self, data: Value) -> Self {
        Self {
            command: self.command.clone(),
            data,
            origin: self.destination.clone(),
            destination: self.origin.clone(),
            ack: true,
            request_id: self.request_id.clone(),
        }
    }

    /// Create an unsolicited push message.
    pub fn event(
        origin: impl Into<String>,
        destination: impl Into<String>,
        command: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            command: command.into(),
            data,
            origin: origin.into(),
            destination: destination.into(),
            ack: false,
            request_id: String::new(),
        }
    }

    /// The `data.state` discriminator of a `state_changed` push.
    pub fn state(&self) -> Option<&str> {
        self.data.get("state").and_then(Value::as_str)
    }

    /// The error reported by the remote side, if the response failed.
    ///
    /// Responses signal failure with `data.success == false`.
    pub fn remote_error(&self) -> Option<String> {
        match self.data.get("success").and_then(Value::as_bool) {
            Some(false) => Some(
                self.data
                    .get("error")
                    .and_then(Value::as_str)
                    .unwrap_or("Unknown error")
                    .to_string(),
            ),
            _ => None,
        }
    }
}
