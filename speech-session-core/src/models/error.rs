use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which authorization a `PermissionDenied` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionScope {
    Microphone,
    SpeechRecognition,
}

impl fmt::Display for PermissionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Microphone => f.write_str("microphone"),
            Self::SpeechRecognition => f.write_str("speech recognition"),
        }
    }
}

/// Reasons a recognition session can end abnormally.
///
/// Acquisition failures and backend faults are surfaced once per session
/// through the session's handler. `Cancelled` and `Superseded` describe
/// caller-initiated endings and are never delivered as errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("{0} permission denied")]
    PermissionDenied(PermissionScope),

    #[error("device not available: {0}")]
    DeviceUnavailable(String),

    #[error("recognition backend fault: {0}")]
    BackendFault(String),

    #[error("session cancelled")]
    Cancelled,

    #[error("session superseded by a newer session")]
    Superseded,

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("invalid state: {0}")]
    InvalidState(String),
}

impl SessionError {
    /// Whether starting a new session could plausibly succeed without the
    /// user changing anything (busy device, transient service failure).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::DeviceUnavailable(_) | Self::BackendFault(_))
    }

    /// Endings caused by `stop()` or a newer `start()`.
    pub fn is_caller_initiated(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Superseded)
    }
}
