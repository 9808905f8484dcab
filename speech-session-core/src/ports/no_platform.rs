//! Placeholder ports for hosts without a speech platform.
//!
//! Every acquisition fails with `DeviceUnavailable`, so a controller built
//! on them behaves correctly (start, report, return to idle) without ever
//! capturing audio.

use crate::models::config::RecognitionConfig;
use crate::models::error::SessionError;
use crate::processing::audio_stream::AudioStream;
use crate::session::cancel::CancelToken;
use crate::traits::backend_port::{BackendPoll, RecognitionBackendPort};
use crate::traits::capture_port::{AudioBufferCallback, AudioCapturePort};

#[derive(Debug, Clone, Copy, Default)]
pub struct NoPlatform;

impl NoPlatform {
    fn unavailable(what: &str) -> SessionError {
        SessionError::DeviceUnavailable(format!("no {} installed on this platform", what))
    }
}

impl AudioCapturePort for NoPlatform {
    type Handle = ();

    fn name(&self) -> &str {
        "no-platform"
    }

    fn is_available(&self) -> bool {
        false
    }

    fn acquire(
        &self,
        _config: &RecognitionConfig,
        _callback: AudioBufferCallback,
        _cancel: &CancelToken,
    ) -> Result<(), SessionError> {
        Err(Self::unavailable("audio capture device"))
    }

    fn release(&self, _handle: ()) {}
}

impl RecognitionBackendPort for NoPlatform {
    type Handle = ();

    fn name(&self) -> &str {
        "no-platform"
    }

    fn is_available(&self) -> bool {
        false
    }

    fn acquire(
        &self,
        _config: &RecognitionConfig,
        _audio: AudioStream,
        _cancel: &CancelToken,
    ) -> Result<(), SessionError> {
        Err(Self::unavailable("speech recognition service"))
    }

    fn next_event(&self, _handle: &mut (), _cancel: &CancelToken) -> Result<BackendPoll, SessionError> {
        Ok(BackendPoll::EndOfStream)
    }

    fn release(&self, _handle: ()) {}
}
