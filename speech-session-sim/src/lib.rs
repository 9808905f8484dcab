//! # speech-session-sim
//!
//! In-process backends for speech-session-core.
//!
//! Provides:
//! - `SyntheticCapture`: microphone stand-in delivering a tone or silence on a capture thread
//! - `ScriptedBackend`: recognizer replaying a `Script` of partial/final results, pauses and faults
//! - `TextInputBackend`: recognizer fed by typed text through a `TextFeed`
//! - `PermissionStatus`: simulated authorization prompts
//! - `ResourceLedger`: acquire/release accounting shared by the ports
//!
//! ## Usage
//! ```no_run
//! use speech_session_core::SessionController;
//! use speech_session_sim::{Script, ScriptedBackend, SyntheticCapture};
//!
//! let backend = ScriptedBackend::new(Script::new().partial("hel").final_result("hello"));
//! let controller = SessionController::new(SyntheticCapture::new(), backend);
//! controller.start(std::sync::Arc::new(|text: &str| println!("{}", text))).unwrap();
//! ```

pub mod ledger;
pub mod permissions;
pub mod scripted_backend;
pub mod synthetic_capture;
pub mod text_backend;

pub use ledger::ResourceLedger;
pub use permissions::PermissionStatus;
pub use scripted_backend::{Script, ScriptStep, ScriptedBackend};
pub use synthetic_capture::{Signal, SyntheticCapture};
pub use text_backend::{TextFeed, TextInputBackend};
