use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;

use crate::models::config::RecognitionConfig;
use crate::models::error::SessionError;
use crate::models::state::SessionState;
use crate::models::transcript::{ControllerDiagnostics, SessionId, SessionInfo, TranscriptEvent};
use crate::processing::audio_stream::AudioStream;
use crate::session::cancel::CancelToken;
use crate::session::channel::{TranscriptChannel, TranscriptSender};
use crate::session::lease::Lease;
use crate::session::stream::{StreamForwarder, TranscriptStream};
use crate::traits::backend_port::{BackendPoll, RecognitionBackendPort};
use crate::traits::capture_port::{AudioBufferCallback, AudioCapturePort};
use crate::traits::recognizer::SpeechRecognizer;
use crate::traits::transcript_handler::TranscriptHandler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Cancelled,
    Superseded,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => f.write_str("stop requested"),
            Self::Superseded => f.write_str("superseded"),
        }
    }
}

/// The session that currently owns the pipeline.
struct ActiveSession {
    info: SessionInfo,
    cancel: CancelToken,
    audio: AudioStream,
    worker: Option<JoinHandle<()>>,
    stop_reason: Option<StopReason>,
    /// The pipeline has ended and its outcome is counted; the session stays
    /// current until the delivery thread is done with it.
    draining: bool,
}

impl ActiveSession {
    /// Record why the session is ending. Only the first reason counts.
    fn mark_stopping(&mut self, reason: StopReason, diagnostics: &mut ControllerDiagnostics) {
        if self.stop_reason.is_some() {
            return;
        }
        self.stop_reason = Some(reason);
        if !self.draining {
            match reason {
                StopReason::Cancelled => diagnostics.sessions_cancelled += 1,
                StopReason::Superseded => diagnostics.sessions_superseded += 1,
            }
        }
        self.cancel.cancel();
        self.audio.close();
    }
}

/// Internal mutable controller state, protected by `parking_lot::Mutex`.
///
/// Never held across a port call, a handler call, or a thread join.
struct ControllerState {
    state: SessionState,
    active: Option<ActiveSession>,
    last_error: Option<SessionError>,
    diagnostics: ControllerDiagnostics,
}

impl ControllerState {
    fn new() -> Self {
        Self {
            state: SessionState::Idle,
            active: None,
            last_error: None,
            diagnostics: ControllerDiagnostics::default(),
        }
    }

    fn is_current(&self, id: SessionId) -> bool {
        self.active.as_ref().is_some_and(|a| a.info.id == id)
    }

    fn set_state(&mut self, id: SessionId, state: SessionState) {
        if self.state != state {
            log::info!("session {}: {} -> {}", id, self.state.name(), state.name());
        }
        self.state = state;
    }
}

/// How a session worker's pipeline ended.
enum Outcome {
    Completed,
    Cancelled,
    Failed(SessionError),
}

/// Owns the lifecycle of the single active recognition session.
///
/// Generic over capture and recognition backends via the port traits.
/// Each session runs on its own worker thread:
/// ```text
/// start() → [worker] acquire capture → acquire recognizer → Listening
///              [capture callback] → AudioStream → [recognizer]
///              next_event() loop → TranscriptChannel → handler
///           release recognizer → release capture → Idle
/// ```
///
/// `start` and `stop` are serialized: a new session never acquires anything
/// until the previous one has released both handles. A second `start`
/// supersedes the active session.
pub struct SessionController<C, B>
where
    C: AudioCapturePort + 'static,
    B: RecognitionBackendPort + 'static,
{
    capture: Arc<C>,
    backend: Arc<B>,
    config: RecognitionConfig,
    channel: TranscriptChannel,
    inner: Arc<Mutex<ControllerState>>,
    lifecycle: Mutex<()>,
}

impl<C, B> SessionController<C, B>
where
    C: AudioCapturePort + 'static,
    B: RecognitionBackendPort + 'static,
{
    pub fn new(capture: C, backend: B) -> Self {
        Self {
            capture: Arc::new(capture),
            backend: Arc::new(backend),
            config: RecognitionConfig::default(),
            channel: TranscriptChannel::new(),
            inner: Arc::new(Mutex::new(ControllerState::new())),
            lifecycle: Mutex::new(()),
        }
    }

    pub fn with_config(capture: C, backend: B, config: RecognitionConfig) -> Result<Self, SessionError> {
        config.validate().map_err(SessionError::Configuration)?;
        let mut controller = Self::new(capture, backend);
        controller.config = config;
        Ok(controller)
    }

    pub fn config(&self) -> &RecognitionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state.clone()
    }

    pub fn active_session(&self) -> Option<SessionInfo> {
        self.inner.lock().active.as_ref().map(|a| a.info.clone())
    }

    /// Error that ended the most recent session, cleared by the next `start`.
    pub fn last_error(&self) -> Option<SessionError> {
        self.inner.lock().last_error.clone()
    }

    pub fn diagnostics(&self) -> ControllerDiagnostics {
        self.inner.lock().diagnostics.clone()
    }

    /// Start a session delivering to `handler`.
    ///
    /// Any active session is stopped first and never delivers again.
    /// Acquisition happens on the session worker; failures are reported to
    /// `handler.on_error`, not returned here.
    pub fn start(&self, handler: Arc<dyn TranscriptHandler>) -> Result<SessionId, SessionError> {
        if self.channel.is_delivery_thread() {
            return Err(SessionError::InvalidState(
                "cannot start a session from inside a transcript handler".into(),
            ));
        }

        let _lifecycle = self.lifecycle.lock();
        self.stop_active(StopReason::Superseded, None);

        let info = SessionInfo::begin();
        let id = info.id;
        let sender = self.channel.open(id, handler)?;
        let cancel = CancelToken::new();
        let audio = AudioStream::with_capacity(self.config.stream_capacity(), self.config.sample_rate);

        {
            let mut inner = self.inner.lock();
            inner.last_error = None;
            inner.diagnostics.sessions_started += 1;
            inner.active = Some(ActiveSession {
                info,
                cancel: cancel.clone(),
                audio: audio.clone(),
                worker: None,
                stop_reason: None,
                draining: false,
            });
            inner.set_state(id, SessionState::Starting);
        }

        log::debug!(
            "session {} using capture '{}' and recognizer '{}'",
            id,
            self.capture.name(),
            self.backend.name()
        );

        let worker = SessionWorker {
            capture: Arc::clone(&self.capture),
            backend: Arc::clone(&self.backend),
            config: self.config.clone(),
            inner: Arc::clone(&self.inner),
            sender,
            cancel,
            audio,
        };

        let spawned = thread::Builder::new()
            .name("speech-session".into())
            .spawn(move || worker.run());

        match spawned {
            Ok(handle) => {
                let mut inner = self.inner.lock();
                // A worker that already finished has cleared `active`; its
                // handle is simply detached.
                if let Some(active) = inner.active.as_mut().filter(|a| a.info.id == id) {
                    active.worker = Some(handle);
                }
                Ok(id)
            }
            Err(e) => {
                self.channel.close_for(id);
                let mut inner = self.inner.lock();
                inner.active = None;
                inner.set_state(id, SessionState::Idle);
                Err(SessionError::BackendFault(format!(
                    "failed to spawn session worker: {}",
                    e
                )))
            }
        }
    }

    /// Start a session and consume its transcripts as a stream.
    pub fn start_stream(&self) -> Result<TranscriptStream, SessionError> {
        let (forwarder, rx) = StreamForwarder::pair();
        let id = self.start(forwarder)?;
        Ok(TranscriptStream::new(id, rx))
    }

    /// Stop the active session and wait until its resources are released.
    ///
    /// Idempotent; a no-op when idle. When called from inside a transcript
    /// handler this behaves like [`request_stop`](Self::request_stop), since
    /// the delivery thread cannot wait for itself.
    pub fn stop(&self) {
        if self.channel.is_delivery_thread() {
            self.request_stop();
            return;
        }
        let _lifecycle = self.lifecycle.lock();
        if !self.stop_active(StopReason::Cancelled, None) {
            log::debug!("stop: no active session");
        }
    }

    /// Stop `id` if it is still the active session.
    pub fn stop_session(&self, id: SessionId) -> bool {
        if self.channel.is_delivery_thread() {
            return self.request_stop_matching(Some(id));
        }
        let _lifecycle = self.lifecycle.lock();
        self.stop_active(StopReason::Cancelled, Some(id))
    }

    /// Cancel the active session without waiting for teardown.
    ///
    /// Delivery for the session ends before this returns; the worker
    /// releases the recognizer and capture handles and returns the
    /// controller to `Idle` on its own.
    pub fn request_stop(&self) -> bool {
        self.request_stop_matching(None)
    }

    /// End the audio input but let the recognizer finish the utterance.
    ///
    /// The session delivers its final result and completes normally.
    pub fn end_audio(&self) -> bool {
        let inner = self.inner.lock();
        match inner.active.as_ref() {
            Some(active) if active.stop_reason.is_none() => {
                log::info!("session {}: end of audio", active.info.id);
                active.audio.close();
                true
            }
            _ => false,
        }
    }

    fn request_stop_matching(&self, only: Option<SessionId>) -> bool {
        let id = {
            let mut inner = self.inner.lock();
            let ControllerState {
                active,
                diagnostics,
                ..
            } = &mut *inner;
            let Some(session) = active.as_mut() else {
                return false;
            };
            if only.is_some_and(|id| id != session.info.id) {
                return false;
            }
            session.mark_stopping(StopReason::Cancelled, diagnostics);
            let id = session.info.id;
            inner.set_state(id, SessionState::Stopping);
            id
        };
        self.channel.close_for(id);
        true
    }

    /// Tear down the active session. Caller holds `lifecycle`.
    fn stop_active(&self, reason: StopReason, only: Option<SessionId>) -> bool {
        let session = {
            let mut inner = self.inner.lock();
            if only.is_some_and(|id| !inner.is_current(id)) {
                return false;
            }
            let Some(mut session) = inner.active.take() else {
                return false;
            };
            session.mark_stopping(reason, &mut inner.diagnostics);
            inner.set_state(session.info.id, SessionState::Stopping);
            session
        };

        let id = session.info.id;
        log::info!("session {}: {}", id, reason);

        self.channel.close_for(id);
        if let Some(worker) = session.worker {
            if worker.join().is_err() {
                log::error!("session {} worker panicked", id);
            }
        }

        let mut inner = self.inner.lock();
        if inner.active.is_none() {
            inner.set_state(id, SessionState::Idle);
        }
        true
    }
}

impl<C, B> Drop for SessionController<C, B>
where
    C: AudioCapturePort + 'static,
    B: RecognitionBackendPort + 'static,
{
    fn drop(&mut self) {
        self.stop();
    }
}

impl<C, B> SpeechRecognizer for SessionController<C, B>
where
    C: AudioCapturePort + 'static,
    B: RecognitionBackendPort + 'static,
{
    fn start_recognition(&self, handler: Arc<dyn TranscriptHandler>) -> Result<SessionId, SessionError> {
        self.start(handler)
    }

    /// Returns once delivery has ended; teardown finishes on the worker.
    fn stop_recognition(&self) {
        self.request_stop();
    }

    fn state(&self) -> SessionState {
        SessionController::state(self)
    }

    fn active_session(&self) -> Option<SessionInfo> {
        SessionController::active_session(self)
    }
}

/// Everything one session's worker thread needs.
struct SessionWorker<C, B>
where
    C: AudioCapturePort,
    B: RecognitionBackendPort,
{
    capture: Arc<C>,
    backend: Arc<B>,
    config: RecognitionConfig,
    inner: Arc<Mutex<ControllerState>>,
    sender: TranscriptSender,
    cancel: CancelToken,
    audio: AudioStream,
}

impl<C, B> SessionWorker<C, B>
where
    C: AudioCapturePort,
    B: RecognitionBackendPort,
{
    fn id(&self) -> SessionId {
        self.sender.session()
    }

    fn run(self) {
        let outcome = self.drive();
        self.audio.close();
        self.finish(outcome);
    }

    /// Acquire, listen, and forward until the session ends. Both handles
    /// are released before this returns.
    fn drive(&self) -> Outcome {
        if self.cancel.is_cancelled() {
            return Outcome::Cancelled;
        }
        if !self.capture.is_available() {
            return self.fail(unavailable("capture", self.capture.name()));
        }
        if !self.backend.is_available() {
            return self.fail(unavailable("recognizer", self.backend.name()));
        }

        let writer = self.audio.clone();
        let callback: AudioBufferCallback = Arc::new(move |samples: &[f32], sample_rate: f64, channels: u16| {
            writer.write_interleaved(samples, sample_rate, channels);
        });

        let capture_handle = match self.capture.acquire(&self.config, callback, &self.cancel) {
            Ok(handle) => handle,
            Err(e) => return self.fail(e),
        };
        let _capture = Lease::new("capture", capture_handle, |h| self.capture.release(h));

        if self.cancel.is_cancelled() {
            return Outcome::Cancelled;
        }

        let backend_handle = match self.backend.acquire(&self.config, self.audio.clone(), &self.cancel) {
            Ok(handle) => handle,
            Err(e) => return self.fail(e),
        };
        let mut recognition = Lease::new("recognizer", backend_handle, |h| self.backend.release(h));

        if !self.enter_listening() {
            return Outcome::Cancelled;
        }
        let Some(handle) = recognition.handle_mut() else {
            return Outcome::Cancelled;
        };

        loop {
            if self.cancel.is_cancelled() {
                return Outcome::Cancelled;
            }
            match self.backend.next_event(handle, &self.cancel) {
                Ok(BackendPoll::Event(event)) => self.forward(event),
                Ok(BackendPoll::EndOfStream) if self.cancel.is_cancelled() => return Outcome::Cancelled,
                Ok(BackendPoll::EndOfStream) => return Outcome::Completed,
                Err(e) => return self.fail(e),
            }
        }
    }

    /// Move to `Errored` while the failing handles are still held, so the
    /// state reads errored until they are released and the error is queued.
    fn fail(&self, error: SessionError) -> Outcome {
        if error.is_caller_initiated() || self.cancel.is_cancelled() {
            return Outcome::Cancelled;
        }
        let mut inner = self.inner.lock();
        if inner.is_current(self.id()) {
            inner.last_error = Some(error.clone());
            inner.set_state(self.id(), SessionState::Errored(error.clone()));
        }
        Outcome::Failed(error)
    }

    fn enter_listening(&self) -> bool {
        let mut inner = self.inner.lock();
        let proceed = inner.is_current(self.id())
            && matches!(inner.state, SessionState::Starting)
            && !self.cancel.is_cancelled();
        if proceed {
            inner.set_state(self.id(), SessionState::Listening);
        }
        proceed
    }

    fn forward(&self, event: TranscriptEvent) {
        {
            let mut inner = self.inner.lock();
            if !event.is_final && !self.config.report_partial_results {
                inner.diagnostics.partials_suppressed += 1;
                return;
            }
            inner.diagnostics.events_forwarded += 1;
        }
        log::trace!(
            "session {}: {} transcript at {:?}",
            self.id(),
            if event.is_final { "final" } else { "partial" },
            event.timestamp
        );
        self.sender.push(event);
    }

    fn finish(self, outcome: Outcome) {
        let id = self.id();
        let delivered = match &outcome {
            Outcome::Completed => {
                log::info!("session {} completed", id);
                self.settle(&outcome);
                Some(self.sender.finish())
            }
            Outcome::Failed(e) => {
                log::warn!("session {} failed: {}", id, e);
                self.settle(&outcome);
                self.sender.fail(e.clone());
                Some(self.sender.finish())
            }
            Outcome::Cancelled => {
                log::debug!("session {} worker exiting after cancellation", id);
                None
            }
        };

        // Stay current until the handler has seen the last event, so a
        // caller that observes `Idle` can start again without losing it.
        if let Some(delivered) = delivered {
            delivered.wait();
        }

        let mut inner = self.inner.lock();
        if !inner.is_current(id) {
            // `stop()` took the session and finishes the transition itself.
            return;
        }
        inner.active = None;
        inner.set_state(id, SessionState::Idle);
    }

    /// Count the outcome of a session that ended on the recognizer's side
    /// and mark it as draining.
    fn settle(&self, outcome: &Outcome) {
        let id = self.id();
        let mut inner = self.inner.lock();
        let ControllerState {
            active,
            diagnostics,
            ..
        } = &mut *inner;
        let Some(session) = active.as_mut().filter(|a| a.info.id == id) else {
            return;
        };
        if session.stop_reason.is_some() {
            return;
        }
        session.draining = true;
        match outcome {
            Outcome::Completed => {
                diagnostics.sessions_completed += 1;
                inner.set_state(id, SessionState::Stopping);
            }
            Outcome::Failed(_) => diagnostics.sessions_failed += 1,
            Outcome::Cancelled => {}
        }
    }
}

fn unavailable(role: &str, name: &str) -> SessionError {
    SessionError::DeviceUnavailable(format!("{} '{}' is not available", role, name))
}
