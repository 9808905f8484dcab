use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identity of one session activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is enough to correlate log lines.
        let full = self.0.simple().to_string();
        f.write_str(&full[..8])
    }
}

/// One unit of recognized text.
///
/// `text` is the recognizer's best transcription of the current utterance so
/// far; a later event for the same utterance replaces it rather than
/// appending to it. `timestamp` is measured from the moment the recognizer
/// started listening.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEvent {
    pub text: String,
    pub is_final: bool,
    pub timestamp: Duration,
}

impl TranscriptEvent {
    pub fn partial(text: impl Into<String>, timestamp: Duration) -> Self {
        Self {
            text: text.into(),
            is_final: false,
            timestamp,
        }
    }

    pub fn final_result(text: impl Into<String>, timestamp: Duration) -> Self {
        Self {
            text: text.into(),
            is_final: true,
            timestamp,
        }
    }
}

/// Snapshot of the active session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub started_at: DateTime<Utc>,
}

impl SessionInfo {
    pub fn begin() -> Self {
        Self {
            id: SessionId::new(),
            started_at: Utc::now(),
        }
    }
}

/// Counters across the controller's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ControllerDiagnostics {
    pub sessions_started: u64,
    pub sessions_completed: u64,
    pub sessions_failed: u64,
    pub sessions_cancelled: u64,
    pub sessions_superseded: u64,
    pub events_forwarded: u64,
    pub partials_suppressed: u64,
}
