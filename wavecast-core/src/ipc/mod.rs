//! Wire messages exchanged over the streaming channel.
//!
//! Inbound and outbound frames each get their own `type`-tagged enum so
//! serde handles the discriminated-union framing without a manual match
//! on a string field.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::session::{AudioMetadata, TranscriptionConfig};

/// A control frame received over the text side of the streaming channel.
/// Binary frames are raw audio and never reach this type.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    Ping {
        timestamp: f64,
    },
    Metadata {
        data: AudioMetadata,
    },
    Config {
        data: TranscriptionConfig,
    },
    Reset,
}

impl ControlMessage {
    /// Parse a text frame. Invalid JSON or an unrecognized `type` both
    /// log and return `None` rather than an error, so one malformed
    /// control frame never tears down the connection.
    pub fn parse(raw: &str) -> Option<Self> {
        match serde_json::from_str(raw) {
            Ok(message) => Some(message),
            Err(e) => {
                tracing::warn!(error = %e, "control message: invalid JSON, ignoring");
                None
            }
        }
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// A frame sent back to the client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    ConnectionStatus {
        status: &'static str,
        session_id: String,
        timestamp: i64,
        engines_available: std::collections::HashMap<String, bool>,
    },
    Pong {
        timestamp: f64,
    },
    Transcript {
        text: String,
        is_final: bool,
        timestamp: i64,
    },
    Status {
        status: &'static str,
        timestamp: i64,
    },
    Error {
        message: String,
        timestamp: i64,
    },
}

impl OutboundMessage {
    pub fn connection_status(session_id: impl Into<String>) -> Self {
        Self::ConnectionStatus {
            status: "connected",
            session_id: session_id.into(),
            timestamp: now_ms(),
            engines_available: crate::recognizer::factory::available_engines(),
        }
    }

    pub fn pong(echoed_timestamp: f64) -> Self {
        Self::Pong {
            timestamp: echoed_timestamp,
        }
    }

    pub fn transcript(text: impl Into<String>, is_final: bool) -> Self {
        Self::Transcript {
            text: text.into(),
            is_final,
            timestamp: now_ms(),
        }
    }

    pub fn reset_completed() -> Self {
        Self::Status {
            status: "reset_completed",
            timestamp: now_ms(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            timestamp: now_ms(),
        }
    }

    /// Serialize to the wire JSON string sent as a WebSocket text frame.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to serialize outbound message");
            r#"{"type":"error","message":"internal serialization failure"}"#.to_string()
        })
    }
}
