//! Recognizer that replays a fixed script for every session.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use speech_session_core::{
    AudioStream, BackendPoll, CancelToken, PermissionScope, RecognitionBackendPort,
    RecognitionConfig, SessionError, StreamRead, TranscriptEvent,
};

use crate::ledger::ResourceLedger;
use crate::permissions::PermissionStatus;

const LISTEN_SLICE: Duration = Duration::from_millis(20);
const READ_CHUNK: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum ScriptStep {
    Partial { text: String },
    Final { text: String },
    /// Keep listening (consuming audio) for `ms` milliseconds.
    Pause { ms: u64 },
    /// Listen until the audio stream is closed.
    AwaitAudioEnd,
    Fault { message: String },
    /// End of utterance; anything after it is ignored.
    End,
}

/// Ordered recognizer output for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Script {
    steps: Vec<ScriptStep>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON array of steps, e.g.
    /// `[{"step": "partial", "text": "hel"}, {"step": "final", "text": "hello"}]`.
    pub fn from_json(json: &str) -> Result<Self, SessionError> {
        serde_json::from_str(json)
            .map_err(|e| SessionError::Configuration(format!("failed to parse script: {}", e)))
    }

    pub fn partial(self, text: impl Into<String>) -> Self {
        self.step(ScriptStep::Partial { text: text.into() })
    }

    pub fn final_result(self, text: impl Into<String>) -> Self {
        self.step(ScriptStep::Final { text: text.into() })
    }

    pub fn pause(self, duration: Duration) -> Self {
        self.step(ScriptStep::Pause {
            ms: duration.as_millis() as u64,
        })
    }

    pub fn await_audio_end(self) -> Self {
        self.step(ScriptStep::AwaitAudioEnd)
    }

    pub fn fault(self, message: impl Into<String>) -> Self {
        self.step(ScriptStep::Fault {
            message: message.into(),
        })
    }

    pub fn end(self) -> Self {
        self.step(ScriptStep::End)
    }

    pub fn steps(&self) -> &[ScriptStep] {
        &self.steps
    }

    fn step(mut self, step: ScriptStep) -> Self {
        self.steps.push(step);
        self
    }
}

pub struct ScriptedBackend {
    script: Script,
    permission: PermissionStatus,
    available: bool,
    failure: Option<SessionError>,
    ledger: ResourceLedger,
}

/// One replay of the script.
pub struct ScriptHandle {
    steps: VecDeque<ScriptStep>,
    audio: AudioStream,
    started: Instant,
    samples_heard: u64,
}

impl ScriptHandle {
    pub fn samples_heard(&self) -> u64 {
        self.samples_heard
    }

    /// Consume audio for up to `duration`.
    fn listen_for(&mut self, duration: Duration, cancel: &CancelToken) -> Result<(), SessionError> {
        let deadline = Instant::now() + duration;
        loop {
            cancel.check()?;
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(());
            }
            match self.audio.read(READ_CHUNK, remaining.min(LISTEN_SLICE)) {
                StreamRead::Samples(samples) => self.samples_heard += samples.len() as u64,
                StreamRead::TimedOut => {}
                StreamRead::Closed => {
                    if cancel.wait_timeout(remaining) {
                        return Err(SessionError::Cancelled);
                    }
                    return Ok(());
                }
            }
        }
    }

    /// Consume audio until the capture side closes the stream.
    fn listen_until_closed(&mut self, cancel: &CancelToken) -> Result<(), SessionError> {
        loop {
            cancel.check()?;
            match self.audio.read(READ_CHUNK, LISTEN_SLICE) {
                StreamRead::Samples(samples) => self.samples_heard += samples.len() as u64,
                StreamRead::TimedOut => {}
                StreamRead::Closed => return Ok(()),
            }
        }
    }
}

impl ScriptedBackend {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            permission: PermissionStatus::Granted,
            available: true,
            failure: None,
            ledger: ResourceLedger::new(),
        }
    }

    pub fn with_permission(mut self, permission: PermissionStatus) -> Self {
        self.permission = permission;
        self
    }

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

impl RecognitionBackendPort for ScriptedBackend {
    type Handle = ScriptHandle;

    fn name(&self) -> &str {
        "scripted"
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn acquire(
        &self,
        config: &RecognitionConfig,
        audio: AudioStream,
        cancel: &CancelToken,
    ) -> Result<ScriptHandle, SessionError> {
        self.permission.authorize(PermissionScope::SpeechRecognition, cancel)?;
        if let Some(ref error) = self.failure {
            return Err(error.clone());
        }
        cancel.check()?;

        self.ledger.record_acquire();
        log::debug!("scripted recognizer ({}) replaying {} steps", config.locale, self.script.steps.len());
        Ok(ScriptHandle {
            steps: self.script.steps.iter().cloned().collect(),
            audio,
            started: Instant::now(),
            samples_heard: 0,
        })
    }

    fn next_event(&self, handle: &mut ScriptHandle, cancel: &CancelToken) -> Result<BackendPoll, SessionError> {
        loop {
            cancel.check()?;
            let Some(step) = handle.steps.pop_front() else {
                return Ok(BackendPoll::EndOfStream);
            };
            match step {
                ScriptStep::Partial { text } => {
                    return Ok(BackendPoll::Event(TranscriptEvent::partial(text, handle.started.elapsed())))
                }
                ScriptStep::Final { text } => {
                    return Ok(BackendPoll::Event(TranscriptEvent::final_result(
                        text,
                        handle.started.elapsed(),
                    )))
                }
                ScriptStep::Pause { ms } => handle.listen_for(Duration::from_millis(ms), cancel)?,
                ScriptStep::AwaitAudioEnd => handle.listen_until_closed(cancel)?,
                ScriptStep::Fault { message } => return Err(SessionError::BackendFault(message)),
                ScriptStep::End => {
                    handle.steps.clear();
                    return Ok(BackendPoll::EndOfStream);
                }
            }
        }
    }

    fn release(&self, handle: ScriptHandle) {
        log::debug!("scripted recognizer heard {} samples", handle.samples_heard);
        self.ledger.record_release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream() -> AudioStream {
        AudioStream::with_capacity(1024, 16_000.0)
    }

    fn drain(backend: &ScriptedBackend, handle: &mut ScriptHandle) -> Vec<Result<BackendPoll, SessionError>> {
        let cancel = CancelToken::new();
        let mut polls = Vec::new();
        loop {
            let poll = backend.next_event(handle, &cancel);
            let done = !matches!(poll, Ok(BackendPoll::Event(_)));
            polls.push(poll);
            if done {
                return polls;
            }
        }
    }

    #[test]
    fn script_parses_from_json() {
        let script = Script::from_json(
            r#"[{"step": "partial", "text": "hel"}, {"step": "pause", "ms": 5}, {"step": "final", "text": "hello"}, {"step": "end"}]"#,
        )
        .unwrap();
        assert_eq!(
            script,
            Script::new()
                .partial("hel")
                .pause(Duration::from_millis(5))
                .final_result("hello")
                .end()
        );
        assert!(Script::from_json(r#"[{"step": "shout"}]"#).is_err());
    }

    #[test]
    fn replays_events_then_ends() {
        let backend = ScriptedBackend::new(Script::new().partial("hel").final_result("hello").end().final_result("never"));
        let mut handle = backend
            .acquire(&RecognitionConfig::default(), stream(), &CancelToken::new())
            .unwrap();

        let texts: Vec<(String, bool)> = drain(&backend, &mut handle)
            .into_iter()
            .filter_map(|poll| match poll {
                Ok(BackendPoll::Event(e)) => Some((e.text, e.is_final)),
                _ => None,
            })
            .collect();
        assert_eq!(texts, vec![("hel".to_string(), false), ("hello".to_string(), true)]);
        assert_eq!(backend.next_event(&mut handle, &CancelToken::new()), Ok(BackendPoll::EndOfStream));

        backend.release(handle);
        assert_eq!(backend.ledger().released(), 1);
    }

    #[test]
    fn fault_step_reports_backend_fault() {
        let backend = ScriptedBackend::new(Script::new().fault("model crashed"));
        let mut handle = backend
            .acquire(&RecognitionConfig::default(), stream(), &CancelToken::new())
            .unwrap();

        let polls = drain(&backend, &mut handle);
        assert_eq!(polls, vec![Err(SessionError::BackendFault("model crashed".into()))]);
    }

    #[test]
    fn pause_consumes_audio() {
        let audio = stream();
        audio.write(&[0.1; 100]);
        let backend = ScriptedBackend::new(Script::new().pause(Duration::from_millis(30)).final_result("done"));
        let mut handle = backend
            .acquire(&RecognitionConfig::default(), audio.clone(), &CancelToken::new())
            .unwrap();

        drain(&backend, &mut handle);
        assert_eq!(handle.samples_heard(), 100);
        assert!(audio.is_empty());
    }

    #[test]
    fn await_audio_end_returns_when_stream_closes() {
        let audio = stream();
        let backend = ScriptedBackend::new(Script::new().await_audio_end().final_result("flushed"));
        let mut handle = backend
            .acquire(&RecognitionConfig::default(), audio.clone(), &CancelToken::new())
            .unwrap();

        let closer = audio.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            closer.close();
        });

        match backend.next_event(&mut handle, &CancelToken::new()) {
            Ok(BackendPoll::Event(event)) => assert_eq!(event.text, "flushed"),
            other => panic!("unexpected poll: {:?}", other),
        }
    }

    #[test]
    fn cancelled_pause_returns_promptly() {
        let backend = ScriptedBackend::new(Script::new().pause(Duration::from_secs(30)));
        let mut handle = backend
            .acquire(&RecognitionConfig::default(), stream(), &CancelToken::new())
            .unwrap();
        let cancel = CancelToken::new();
        let canceller = cancel.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            canceller.cancel();
        });

        let started = Instant::now();
        assert_eq!(backend.next_event(&mut handle, &cancel), Err(SessionError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
