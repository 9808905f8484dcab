use std::sync::Arc;

use crate::models::config::RecognitionConfig;
use crate::models::error::SessionError;
use crate::session::cancel::CancelToken;

/// Callback invoked when the capture device produces a buffer.
///
/// Parameters:
/// - `samples`: Interleaved f32 samples.
/// - `sample_rate`: The actual sample rate of the delivered audio.
/// - `channels`: Number of interleaved channels.
pub type AudioBufferCallback = Arc<dyn Fn(&[f32], f64, u16) + Send + Sync + 'static>;

/// Platform microphone / audio-stream source.
///
/// A handle is opened per session and owned by that session alone. The
/// controller calls `release` exactly once for every successful `acquire`.
pub trait AudioCapturePort: Send + Sync {
    /// Device-specific state that lives for one session.
    type Handle: Send;

    /// Short label for logs.
    fn name(&self) -> &str;

    /// Whether a capture device is present at all. Checked before each
    /// session acquires anything; `false` fails the session with
    /// `DeviceUnavailable`.
    fn is_available(&self) -> bool;

    /// Open the device and start delivering buffers to `callback`.
    ///
    /// May block (e.g. on an authorization prompt) but must return
    /// `Err(SessionError::Cancelled)` promptly once `cancel` fires.
    fn acquire(
        &self,
        config: &RecognitionConfig,
        callback: AudioBufferCallback,
        cancel: &CancelToken,
    ) -> Result<Self::Handle, SessionError>;

    /// Stop delivering buffers and close the device.
    fn release(&self, handle: Self::Handle);
}
