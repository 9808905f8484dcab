//! # speech-session-core
//!
//! Platform-agnostic speech recognition session lifecycle.
//!
//! Owns the single active speech-to-text session: acquires a capture device
//! and a recognizer, streams transcripts to the caller in order, and tears
//! everything down on stop, fault, or when a newer session supersedes it.
//! Platform backends implement `AudioCapturePort` and
//! `RecognitionBackendPort` and plug into the generic `SessionController`.
//!
//! ## Architecture
//!
//! ```text
//! speech-session-core (this crate)
//! ├── models/       ← SessionError, SessionState, TranscriptEvent, RecognitionConfig
//! ├── traits/       ← AudioCapturePort, RecognitionBackendPort, TranscriptHandler, SpeechRecognizer
//! ├── processing/   ← AudioStream (capture → recognizer samples)
//! ├── session/      ← SessionController, TranscriptChannel, CancelToken, TranscriptStream
//! ├── ports/        ← NoPlatform placeholder ports
//! └── global        ← process-wide accessor
//! ```

pub mod global;
pub mod models;
pub mod ports;
pub mod processing;
pub mod session;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use models::config::RecognitionConfig;
pub use models::error::{PermissionScope, SessionError};
pub use models::state::SessionState;
pub use models::transcript::{ControllerDiagnostics, SessionId, SessionInfo, TranscriptEvent};
pub use ports::no_platform::NoPlatform;
pub use processing::audio_stream::{AudioStream, StreamRead};
pub use session::cancel::CancelToken;
pub use session::channel::{Delivered, TranscriptChannel, TranscriptSender};
pub use session::controller::SessionController;
pub use session::stream::{TranscriptStream, TranscriptUpdate};
pub use traits::backend_port::{BackendPoll, RecognitionBackendPort};
pub use traits::capture_port::{AudioBufferCallback, AudioCapturePort};
pub use traits::recognizer::SpeechRecognizer;
pub use traits::transcript_handler::TranscriptHandler;
