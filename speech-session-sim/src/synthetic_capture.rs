//! Synthetic microphone.
//!
//! Stands in for a platform capture endpoint: once acquired it delivers
//! `buffer_frames`-sized buffers at real-time pace on a dedicated thread
//! until released.

use std::f32::consts::TAU;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use speech_session_core::{
    AudioBufferCallback, AudioCapturePort, CancelToken, PermissionScope, RecognitionConfig,
    SessionError,
};

use crate::ledger::ResourceLedger;
use crate::permissions::PermissionStatus;

/// What the synthetic microphone "hears".
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Signal {
    Silence,
    Tone { frequency: f32, amplitude: f32 },
}

pub struct SyntheticCapture {
    signal: Signal,
    channels: u16,
    permission: PermissionStatus,
    available: bool,
    failure: Option<SessionError>,
    ledger: ResourceLedger,
}

/// A running capture thread.
pub struct CaptureHandle {
    running: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl SyntheticCapture {
    pub fn new() -> Self {
        Self {
            signal: Signal::Tone {
                frequency: 440.0,
                amplitude: 0.2,
            },
            channels: 1,
            permission: PermissionStatus::Granted,
            available: true,
            failure: None,
            ledger: ResourceLedger::new(),
        }
    }

    pub fn with_signal(mut self, signal: Signal) -> Self {
        self.signal = signal;
        self
    }

    pub fn with_channels(mut self, channels: u16) -> Self {
        self.channels = channels.max(1);
        self
    }

    pub fn with_permission(mut self, permission: PermissionStatus) -> Self {
        self.permission = permission;
        self
    }

    /// Report the device as missing, as when no microphone is plugged in.
    pub fn with_availability(mut self, available: bool) -> Self {
        self.available = available;
        self
    }

    /// Make every acquisition fail with `error` once authorized.
    pub fn with_failure(mut self, error: SessionError) -> Self {
        self.failure = Some(error);
        self
    }

    pub fn ledger(&self) -> ResourceLedger {
        self.ledger.clone()
    }
}

impl Default for SyntheticCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioCapturePort for SyntheticCapture {
    type Handle = CaptureHandle;

    fn name(&self) -> &str {
        "synthetic-mic"
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn acquire(
        &self,
        config: &RecognitionConfig,
        callback: AudioBufferCallback,
        cancel: &CancelToken,
    ) -> Result<CaptureHandle, SessionError> {
        self.permission.authorize(PermissionScope::Microphone, cancel)?;
        if let Some(ref error) = self.failure {
            return Err(error.clone());
        }
        cancel.check()?;

        let running = Arc::new(AtomicBool::new(true));
        let thread_running = Arc::clone(&running);
        let signal = self.signal;
        let channels = self.channels;
        let frames = config.buffer_frames as usize;
        let sample_rate = config.sample_rate;

        let thread = thread::Builder::new()
            .name("synthetic-capture".into())
            .spawn(move || capture_loop(thread_running, signal, channels, frames, sample_rate, callback))
            .map_err(|e| SessionError::DeviceUnavailable(format!("failed to spawn capture thread: {}", e)))?;

        self.ledger.record_acquire();
        log::debug!(
            "synthetic capture started: {} frames x {} ch @ {} Hz",
            frames,
            channels,
            sample_rate
        );
        Ok(CaptureHandle {
            running,
            thread: Some(thread),
        })
    }

    fn release(&self, mut handle: CaptureHandle) {
        handle.running.store(false, Ordering::SeqCst);
        if let Some(thread) = handle.thread.take() {
            let _ = thread.join();
        }
        self.ledger.record_release();
    }
}

fn capture_loop(
    running: Arc<AtomicBool>,
    signal: Signal,
    channels: u16,
    frames: usize,
    sample_rate: f64,
    callback: AudioBufferCallback,
) {
    let period = Duration::from_secs_f64(frames as f64 / sample_rate);
    let mut phase = 0.0f32;
    let mut buffer = vec![0.0f32; frames * channels as usize];

    while running.load(Ordering::SeqCst) {
        match signal {
            Signal::Silence => buffer.iter_mut().for_each(|s| *s = 0.0),
            Signal::Tone {
                frequency,
                amplitude,
            } => {
                let step = TAU * frequency / sample_rate as f32;
                for frame in buffer.chunks_exact_mut(channels as usize) {
                    let value = amplitude * phase.sin();
                    frame.iter_mut().for_each(|s| *s = value);
                    phase = (phase + step) % TAU;
                }
            }
        }
        callback(&buffer, sample_rate, channels);
        thread::sleep(period);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn delivers_buffers_until_released() {
        let capture = SyntheticCapture::new().with_channels(2);
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        let callback: AudioBufferCallback = Arc::new(move |samples: &[f32], rate: f64, channels: u16| {
            sink.lock().push((samples.len(), rate, channels));
        });
        let config = RecognitionConfig {
            buffer_frames: 160,
            ..Default::default()
        };

        let handle = capture.acquire(&config, callback, &CancelToken::new()).unwrap();
        thread::sleep(Duration::from_millis(60));
        capture.release(handle);

        let seen = received.lock().len();
        assert!(seen >= 1);
        assert!(received.lock().iter().all(|&b| b == (320, 16_000.0, 2)));

        thread::sleep(Duration::from_millis(30));
        assert_eq!(received.lock().len(), seen);
        assert_eq!(capture.ledger().acquired(), 1);
        assert_eq!(capture.ledger().released(), 1);
    }

    #[test]
    fn denied_permission_acquires_nothing() {
        let capture = SyntheticCapture::new().with_permission(PermissionStatus::Denied);
        let callback: AudioBufferCallback = Arc::new(|_: &[f32], _: f64, _: u16| {});

        let result = capture.acquire(&RecognitionConfig::default(), callback, &CancelToken::new());
        assert!(matches!(
            result,
            Err(SessionError::PermissionDenied(PermissionScope::Microphone))
        ));
        assert_eq!(capture.ledger().acquired(), 0);
    }
}
