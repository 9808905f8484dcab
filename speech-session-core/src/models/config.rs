use serde::{Deserialize, Serialize};

use super::error::SessionError;

/// Configuration handed to both ports when a session acquires them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// Recognizer locale (default: "en-US").
    pub locale: String,

    /// Deliver interim results while the utterance is in progress
    /// (default: true). When false only final results reach the handler.
    pub report_partial_results: bool,

    /// Frames per capture buffer (default: 1024).
    pub buffer_frames: u32,

    /// Requested capture sample rate in Hz (default: 16000).
    pub sample_rate: f64,

    /// Seconds of audio the capture→recognizer stream holds before
    /// dropping the oldest samples (default: 5).
    pub stream_buffer_secs: f64,
}

impl RecognitionConfig {
    const MAX_BUFFER_FRAMES: u32 = 65_536;

    pub fn from_json(json: &str) -> Result<Self, SessionError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| SessionError::Configuration(format!("failed to parse config: {}", e)))?;
        config.validate().map_err(SessionError::Configuration)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.locale.trim().is_empty() {
            return Err("locale must not be empty".into());
        }
        if self.buffer_frames == 0 || self.buffer_frames > Self::MAX_BUFFER_FRAMES {
            return Err(format!("unsupported buffer size: {}", self.buffer_frames));
        }
        if self.sample_rate <= 0.0 {
            return Err("sample rate must be positive".into());
        }
        if self.stream_buffer_secs <= 0.0 {
            return Err("stream buffer duration must be positive".into());
        }
        Ok(())
    }

    /// Capacity of the audio stream in mono samples.
    pub fn stream_capacity(&self) -> usize {
        ((self.sample_rate * self.stream_buffer_secs) as usize).max(self.buffer_frames as usize)
    }
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            locale: "en-US".into(),
            report_partial_results: true,
            buffer_frames: 1024,
            sample_rate: 16_000.0,
            stream_buffer_secs: 5.0,
        }
    }
}
