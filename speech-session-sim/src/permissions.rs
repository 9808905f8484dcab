//! Simulated capture and recognition authorization.
//!
//! Real platforms ask the user once per app; the answer may take a while
//! (a system dialog) and must not hold up a `stop()` issued meanwhile.

use std::time::Duration;

use speech_session_core::{CancelToken, PermissionScope, SessionError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PermissionStatus {
    #[default]
    Granted,
    Denied,
    /// A prompt the user answers after `delay`.
    Prompt { delay: Duration, grant: bool },
}

impl PermissionStatus {
    pub fn authorize(&self, scope: PermissionScope, cancel: &CancelToken) -> Result<(), SessionError> {
        match *self {
            Self::Granted => Ok(()),
            Self::Denied => Err(SessionError::PermissionDenied(scope)),
            Self::Prompt { delay, grant } => {
                log::debug!("waiting for {} authorization", scope);
                if cancel.wait_timeout(delay) {
                    return Err(SessionError::Cancelled);
                }
                if grant {
                    Ok(())
                } else {
                    Err(SessionError::PermissionDenied(scope))
                }
            }
        }
    }
}
