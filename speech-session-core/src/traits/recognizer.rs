use std::sync::Arc;

use crate::models::error::SessionError;
use crate::models::state::SessionState;
use crate::models::transcript::{SessionId, SessionInfo};
use crate::traits::transcript_handler::TranscriptHandler;

/// Object-safe surface of a session controller, independent of the port
/// types it was built with. This is what the process-wide accessor hands out.
pub trait SpeechRecognizer: Send + Sync {
    /// Begin a session, superseding any active one.
    fn start_recognition(
        &self,
        handler: Arc<dyn TranscriptHandler>,
    ) -> Result<SessionId, SessionError>;

    /// Cancel the active session and return without waiting for its
    /// resources to be released. No callback runs for it afterwards.
    /// Idempotent.
    fn stop_recognition(&self);

    fn state(&self) -> SessionState;

    fn active_session(&self) -> Option<SessionInfo>;
}
