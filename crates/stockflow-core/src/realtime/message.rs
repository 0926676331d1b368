//! Realtime wire frames
//!
//! Every server push is a JSON text frame carrying an event name and an
//! arbitrary payload: `{"event": "order:created", "data": {...}}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One named event on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFrame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl EventFrame {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Decode a frame from a text message
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Encode a frame as a text message
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
