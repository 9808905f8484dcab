use crate::models::error::SessionError;
use crate::models::transcript::TranscriptEvent;

/// Receiver of one session's transcripts.
///
/// All methods run on the controller's delivery thread, one at a time and in
/// the order the recognizer produced them. Once `stop()` has returned for
/// the session, no method is called again.
///
/// A handler may call `stop()` (or `request_stop()`) on its controller, but
/// must not start a new session from inside a callback.
pub trait TranscriptHandler: Send + Sync {
    fn on_transcript(&self, event: &TranscriptEvent);

    /// Called at most once, for acquisition failures and backend faults.
    fn on_error(&self, error: &SessionError) {
        log::debug!("transcript handler ignored error: {}", error);
    }

    /// The session ended on the recognizer's side (normal end or fault).
    /// Not called for sessions ended by `stop()` or a newer `start()`.
    fn on_finished(&self) {}
}

/// Plain text callbacks: `|transcript: &str| ...`.
///
/// Receives partial and final text alike; errors are only logged at debug
/// level.
impl<F> TranscriptHandler for F
where
    F: Fn(&str) + Send + Sync,
{
    fn on_transcript(&self, event: &TranscriptEvent) {
        self(&event.text)
    }
}
