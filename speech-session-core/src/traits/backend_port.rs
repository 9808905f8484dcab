use crate::models::config::RecognitionConfig;
use crate::models::error::SessionError;
use crate::models::transcript::TranscriptEvent;
use crate::processing::audio_stream::AudioStream;
use crate::session::cancel::CancelToken;

/// Result of polling the recognizer.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendPoll {
    Event(TranscriptEvent),
    /// The recognizer finished the utterance; no more events follow.
    EndOfStream,
}

/// Platform speech-recognition service.
///
/// Events are pulled by the session worker with `next_event`, one call at a
/// time, so implementations see a single consumer per handle.
pub trait RecognitionBackendPort: Send + Sync {
    type Handle: Send;

    fn name(&self) -> &str;

    fn is_available(&self) -> bool;

    /// Start a recognition task reading from `audio`.
    fn acquire(
        &self,
        config: &RecognitionConfig,
        audio: AudioStream,
        cancel: &CancelToken,
    ) -> Result<Self::Handle, SessionError>;

    /// Block until the next transcript update, the end of the utterance, or
    /// a fault. Must return promptly once `cancel` fires, either with
    /// `Err(SessionError::Cancelled)` or `Ok(BackendPoll::EndOfStream)`.
    ///
    /// When the audio stream is closed the recognizer should flush its final
    /// result and then report `EndOfStream`.
    fn next_event(
        &self,
        handle: &mut Self::Handle,
        cancel: &CancelToken,
    ) -> Result<BackendPoll, SessionError>;

    fn release(&self, handle: Self::Handle);
}
