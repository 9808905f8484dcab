use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::models::error::SessionError;
use crate::models::transcript::{SessionId, TranscriptEvent};
use crate::traits::transcript_handler::TranscriptHandler;

/// One item pulled from a [`TranscriptStream`].
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptUpdate {
    Transcript(TranscriptEvent),
    Error(SessionError),
}

/// Pull-based view of one session's transcripts.
///
/// The stream ends (`recv` returns `None`) when the session finishes, fails,
/// is stopped, or is superseded. Pass [`TranscriptStream::session_id`] to
/// `SessionController::stop_session` to cancel this session and no other.
pub struct TranscriptStream {
    session: SessionId,
    rx: Receiver<TranscriptUpdate>,
}

impl TranscriptStream {
    pub(crate) fn new(session: SessionId, rx: Receiver<TranscriptUpdate>) -> Self {
        Self { session, rx }
    }

    pub fn session_id(&self) -> SessionId {
        self.session
    }

    /// Block for the next update.
    pub fn recv(&self) -> Option<TranscriptUpdate> {
        self.rx.recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<TranscriptUpdate, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    pub fn try_recv(&self) -> Option<TranscriptUpdate> {
        self.rx.try_recv().ok()
    }

    pub fn iter(&self) -> mpsc::Iter<'_, TranscriptUpdate> {
        self.rx.iter()
    }
}

impl IntoIterator for TranscriptStream {
    type Item = TranscriptUpdate;
    type IntoIter = mpsc::IntoIter<TranscriptUpdate>;

    fn into_iter(self) -> Self::IntoIter {
        self.rx.into_iter()
    }
}

/// Handler that feeds a [`TranscriptStream`].
pub(crate) struct StreamForwarder {
    tx: Mutex<Option<Sender<TranscriptUpdate>>>,
}

impl StreamForwarder {
    pub(crate) fn pair() -> (Arc<Self>, Receiver<TranscriptUpdate>) {
        let (tx, rx) = mpsc::channel();
        (
            Arc::new(Self {
                tx: Mutex::new(Some(tx)),
            }),
            rx,
        )
    }

    fn send(&self, update: TranscriptUpdate) {
        if let Some(ref tx) = *self.tx.lock() {
            // Receiver dropped means nobody is listening any more.
            let _ = tx.send(update);
        }
    }
}

impl TranscriptHandler for StreamForwarder {
    fn on_transcript(&self, event: &TranscriptEvent) {
        self.send(TranscriptUpdate::Transcript(event.clone()));
    }

    fn on_error(&self, error: &SessionError) {
        self.send(TranscriptUpdate::Error(error.clone()));
    }

    fn on_finished(&self) {
        self.tx.lock().take();
    }
}
