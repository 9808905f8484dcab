//! Typed-text recognizer for machines without a speech engine.
//!
//! Each line submitted to the [`TextFeed`] is delivered as a final result
//! of the active session. Audio is drained and ignored.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use speech_session_core::{
    AudioStream, BackendPoll, CancelToken, RecognitionBackendPort, RecognitionConfig, SessionError,
    StreamRead, TranscriptEvent,
};

use crate::ledger::ResourceLedger;

const POLL_SLICE: Duration = Duration::from_millis(20);

struct FeedShared {
    lines: Mutex<VecDeque<String>>,
    submitted: Condvar,
}

/// Queue of typed lines. Clones share the queue.
#[derive(Clone)]
pub struct TextFeed {
    shared: Arc<FeedShared>,
}

impl Default for TextFeed {
    fn default() -> Self {
        Self {
            shared: Arc::new(FeedShared {
                lines: Mutex::new(VecDeque::new()),
                submitted: Condvar::new(),
            }),
        }
    }
}

impl TextFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a line. Blank input is ignored.
    pub fn submit(&self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        self.shared.lines.lock().push_back(text.to_string());
        self.shared.submitted.notify_all();
    }

    pub fn pending(&self) -> usize {
        self.shared.lines.lock().len()
    }

    fn next(&self, timeout: Duration) -> Option<String> {
        let deadline = Instant::now() + timeout;
        let mut lines = self.shared.lines.lock();
        loop {
            if let Some(line) = lines.pop_front() {
                return Some(line);
            }
            if self.shared.submitted.wait_until(&mut lines, deadline).timed_out() {
                return lines.pop_front();
            }
        }
    }
}

pub struct TextInputBackend {
    feed: TextFeed,
    ledger: ResourceLedger,
}

pub struct TextHandle {
    audio: AudioStream,
    started: Instant,
}

impl TextInputBackend {
    pub fn new(feed: TextFeed) -> Self {
        Self {
            feed,
            ledger: ResourceLedger::new(),
        }
    }

    pub fn feed(&self) -> TextFeed {
        self.feed.clone()
    }

    pub fn ledger(&self) -> ResourceLedger {
        self.ledger.clone()
    }
}

impl RecognitionBackendPort for TextInputBackend {
    type Handle = TextHandle;

    fn name(&self) -> &str {
        "text-input"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn acquire(
        &self,
        _config: &RecognitionConfig,
        audio: AudioStream,
        cancel: &CancelToken,
    ) -> Result<TextHandle, SessionError> {
        cancel.check()?;
        self.ledger.record_acquire();
        Ok(TextHandle {
            audio,
            started: Instant::now(),
        })
    }

    fn next_event(&self, handle: &mut TextHandle, cancel: &CancelToken) -> Result<BackendPoll, SessionError> {
        loop {
            cancel.check()?;
            let closed = loop {
                match handle.audio.read(usize::MAX, Duration::ZERO) {
                    StreamRead::Samples(_) => continue,
                    StreamRead::TimedOut => break false,
                    StreamRead::Closed => break true,
                }
            };
            if let Some(text) = self.feed.next(POLL_SLICE) {
                return Ok(BackendPoll::Event(TranscriptEvent::final_result(
                    text,
                    handle.started.elapsed(),
                )));
            }
            if closed {
                return Ok(BackendPoll::EndOfStream);
            }
        }
    }

    fn release(&self, _handle: TextHandle) {
        self.ledger.record_release();
    }
}
