use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;

use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};

use crate::models::error::SessionError;
use crate::models::transcript::{SessionId, TranscriptEvent};
use crate::traits::transcript_handler::TranscriptHandler;

enum Delivery {
    Transcript(TranscriptEvent),
    Failed(SessionError),
    /// Carries the acknowledgement for [`Delivered`]. Dropping it unblocks
    /// the waiter as well, so stale or discarded envelopes never hang it.
    Finished(Sender<()>),
}

struct Envelope {
    session: SessionId,
    delivery: Delivery,
}

struct Subscription {
    session: SessionId,
    handler: Arc<dyn TranscriptHandler>,
}

/// The open subscription. Held for the whole duration of a handler call, so
/// `close_for` from another thread waits for an in-flight delivery to
/// finish. Reentrant so a handler can close its own session.
type Gate = Arc<ReentrantMutex<RefCell<Option<Subscription>>>>;

struct Dispatcher {
    tx: Sender<Envelope>,
    thread_id: ThreadId,
}

/// Ordered delivery of transcript events from session workers to the
/// session's handler.
///
/// Producers enqueue through a [`TranscriptSender`] tagged with their
/// session id; a single delivery thread invokes the handler. Envelopes for a
/// session that is no longer open are dropped at the delivery boundary.
///
/// ```text
/// [session worker] --push--> [mpsc queue] --> [delivery thread] --gate--> handler
///                                                  ↑
///                                  close_for(id) ──┘ (mutually exclusive)
/// ```
pub struct TranscriptChannel {
    gate: Gate,
    dispatcher: Mutex<Option<Dispatcher>>,
}

impl TranscriptChannel {
    pub fn new() -> Self {
        Self {
            gate: Arc::new(ReentrantMutex::new(RefCell::new(None))),
            dispatcher: Mutex::new(None),
        }
    }

    /// Route deliveries for `session` to `handler`, retiring any previous
    /// subscription. The delivery thread is spawned on first use.
    pub fn open(
        &self,
        session: SessionId,
        handler: Arc<dyn TranscriptHandler>,
    ) -> Result<TranscriptSender, SessionError> {
        let tx = self.ensure_dispatcher()?;

        let slot = self.gate.lock();
        let retired = slot.borrow_mut().replace(Subscription { session, handler });
        drop(slot);

        if let Some(previous) = retired {
            log::debug!("delivery for session {} retired by {}", previous.session, session);
        }
        Ok(TranscriptSender { session, tx })
    }

    /// Permanently stop delivery for `session`.
    ///
    /// Blocks while a handler call for that session is running on the
    /// delivery thread; once this returns, nothing more is delivered for it.
    /// Returns whether `session` was the open subscription.
    pub fn close_for(&self, session: SessionId) -> bool {
        let slot = self.gate.lock();
        let retired = {
            let mut current = slot.borrow_mut();
            if current.as_ref().is_some_and(|sub| sub.session == session) {
                current.take()
            } else {
                None
            }
        };
        drop(slot);
        retired.is_some()
    }

    pub fn is_open_for(&self, session: SessionId) -> bool {
        let slot = self.gate.lock();
        let open = slot.borrow().as_ref().is_some_and(|sub| sub.session == session);
        open
    }

    /// Whether the caller is running inside a handler callback.
    pub fn is_delivery_thread(&self) -> bool {
        self.dispatcher
            .lock()
            .as_ref()
            .is_some_and(|d| d.thread_id == thread::current().id())
    }

    fn ensure_dispatcher(&self) -> Result<Sender<Envelope>, SessionError> {
        let mut dispatcher = self.dispatcher.lock();
        if let Some(ref d) = *dispatcher {
            return Ok(d.tx.clone());
        }

        let (tx, rx) = mpsc::channel();
        let gate = Arc::clone(&self.gate);
        let handle = thread::Builder::new()
            .name("transcript-delivery".into())
            .spawn(move || deliver_loop(rx, gate))
            .map_err(|e| {
                SessionError::BackendFault(format!("failed to spawn delivery thread: {}", e))
            })?;

        *dispatcher = Some(Dispatcher {
            tx: tx.clone(),
            thread_id: handle.thread().id(),
        });
        Ok(tx)
    }
}

impl Default for TranscriptChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TranscriptChannel {
    fn drop(&mut self) {
        // The delivery thread exits once every sender is gone.
        self.dispatcher.get_mut().take();
        let slot = self.gate.lock();
        let retired = slot.borrow_mut().take();
        drop(slot);
        drop(retired);
    }
}

/// Producer side of a [`TranscriptChannel`], bound to one session.
#[derive(Clone)]
pub struct TranscriptSender {
    session: SessionId,
    tx: Sender<Envelope>,
}

impl TranscriptSender {
    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn push(&self, event: TranscriptEvent) {
        self.send(Delivery::Transcript(event));
    }

    pub fn fail(&self, error: SessionError) {
        self.send(Delivery::Failed(error));
    }

    /// Queue the end-of-session marker. Delivered after everything pushed
    /// before it, then the subscription is closed.
    ///
    /// The returned [`Delivered`] resolves once the delivery thread is done
    /// with the session: the handler has returned from `on_finished`, or the
    /// marker was discarded because the session had been closed.
    pub fn finish(&self) -> Delivered {
        let (ack, done) = mpsc::channel();
        self.send(Delivery::Finished(ack));
        Delivered { done }
    }

    fn send(&self, delivery: Delivery) {
        let envelope = Envelope {
            session: self.session,
            delivery,
        };
        if self.tx.send(envelope).is_err() {
            log::debug!("delivery thread gone, dropping event for session {}", self.session);
        }
    }
}

/// Completion of a session's deliveries, see [`TranscriptSender::finish`].
pub struct Delivered {
    done: Receiver<()>,
}

impl Delivered {
    /// Block until every delivery queued before the finish marker is done.
    pub fn wait(self) {
        // A disconnect means the marker was dropped, which also ends delivery.
        let _ = self.done.recv();
    }

    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        !matches!(self.done.recv_timeout(timeout), Err(RecvTimeoutError::Timeout))
    }
}

fn deliver_loop(rx: Receiver<Envelope>, gate: Gate) {
    for Envelope { session, delivery } in rx {
        let slot = gate.lock();
        let handler = match slot.borrow().as_ref() {
            Some(sub) if sub.session == session => Arc::clone(&sub.handler),
            _ => {
                log::trace!("dropping delivery for closed session {}", session);
                continue;
            }
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| match &delivery {
            Delivery::Transcript(event) => handler.on_transcript(event),
            Delivery::Failed(error) => handler.on_error(error),
            Delivery::Finished(_) => handler.on_finished(),
        }));
        if outcome.is_err() {
            log::error!("transcript handler panicked (session {})", session);
        }

        if matches!(delivery, Delivery::Finished(_)) {
            let retired = {
                let mut current = slot.borrow_mut();
                if current.as_ref().is_some_and(|sub| sub.session == session) {
                    current.take()
                } else {
                    None
                }
            };
            drop(retired);
        }
        // Hand the gate straight to a waiting `close_for`.
        ReentrantMutexGuard::unlock_fair(slot);

        if let Delivery::Finished(ack) = delivery {
            let _ = ack.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WAIT: Duration = Duration::from_secs(2);

    /// Records texts and reports each callback on `seen`.
    struct Recorder {
        texts: Mutex<Vec<String>>,
        seen: Mutex<Sender<String>>,
        delay: Duration,
    }

    impl Recorder {
        fn new(delay: Duration) -> (Arc<Self>, Receiver<String>) {
            let (tx, rx) = mpsc::channel();
            let recorder = Arc::new(Self {
                texts: Mutex::new(Vec::new()),
                seen: Mutex::new(tx),
                delay,
            });
            (recorder, rx)
        }

        fn texts(&self) -> Vec<String> {
            self.texts.lock().clone()
        }
    }

    impl TranscriptHandler for Recorder {
        fn on_transcript(&self, event: &TranscriptEvent) {
            let _ = self.seen.lock().send(event.text.clone());
            thread::sleep(self.delay);
            self.texts.lock().push(event.text.clone());
        }

        fn on_error(&self, error: &SessionError) {
            self.texts.lock().push(format!("error: {}", error));
            let _ = self.seen.lock().send("error".into());
        }

        fn on_finished(&self) {
            let _ = self.seen.lock().send("finished".into());
        }
    }

    fn event(text: &str) -> TranscriptEvent {
        TranscriptEvent::final_result(text, Duration::ZERO)
    }

    #[test]
    fn delivers_in_push_order_then_finishes() {
        let channel = TranscriptChannel::new();
        let (recorder, seen) = Recorder::new(Duration::ZERO);
        let session = SessionId::new();
        let sender = channel.open(session, recorder.clone()).unwrap();

        for text in ["one", "two", "three"] {
            sender.push(event(text));
        }
        sender.fail(SessionError::BackendFault("lost".into()));
        let delivered = sender.finish();

        let mut observed = Vec::new();
        loop {
            let item = seen.recv_timeout(WAIT).unwrap();
            if item == "finished" {
                break;
            }
            observed.push(item);
        }
        assert_eq!(observed, vec!["one", "two", "three", "error"]);
        assert_eq!(
            recorder.texts(),
            vec!["one", "two", "three", "error: recognition backend fault: lost"]
        );
        assert!(delivered.wait_timeout(WAIT));
        assert!(!channel.is_open_for(session));
    }

    #[test]
    fn finish_resolves_only_after_slow_handler_returns() {
        let channel = TranscriptChannel::new();
        let (recorder, _seen) = Recorder::new(Duration::from_millis(200));
        let sender = channel.open(SessionId::new(), recorder.clone()).unwrap();

        sender.push(event("hel"));
        sender.push(event("hello"));
        let delivered = sender.finish();

        assert!(!delivered.wait_timeout(Duration::from_millis(50)));
        delivered.wait();
        assert_eq!(recorder.texts(), vec!["hel", "hello"]);
    }

    #[test]
    fn finish_of_a_closed_session_still_resolves() {
        let channel = TranscriptChannel::new();
        let (recorder, seen) = Recorder::new(Duration::ZERO);
        let session = SessionId::new();
        let sender = channel.open(session, recorder.clone()).unwrap();

        assert!(channel.close_for(session));
        let delivered = sender.finish();

        assert!(delivered.wait_timeout(WAIT));
        assert_eq!(seen.recv_timeout(Duration::from_millis(50)), Err(RecvTimeoutError::Timeout));
    }

    #[test]
    fn stale_sessions_are_dropped() {
        let channel = TranscriptChannel::new();
        let (first, first_seen) = Recorder::new(Duration::ZERO);
        let (second, second_seen) = Recorder::new(Duration::ZERO);

        let old = channel.open(SessionId::new(), first.clone()).unwrap();
        let new = channel.open(SessionId::new(), second.clone()).unwrap();

        old.push(event("stale"));
        new.push(event("fresh"));

        assert_eq!(second_seen.recv_timeout(WAIT).unwrap(), "fresh");
        assert_eq!(
            first_seen.recv_timeout(Duration::from_millis(50)),
            Err(RecvTimeoutError::Timeout)
        );
        assert!(first.texts().is_empty());
    }

    #[test]
    fn close_waits_for_in_flight_delivery() {
        let channel = TranscriptChannel::new();
        let (recorder, seen) = Recorder::new(Duration::from_millis(150));
        let session = SessionId::new();
        let sender = channel.open(session, recorder.clone()).unwrap();

        sender.push(event("slow"));
        sender.push(event("late"));

        assert_eq!(seen.recv_timeout(WAIT).unwrap(), "slow");
        channel.close_for(session);

        // The in-flight call completed before close returned; nothing after.
        let at_close = recorder.texts();
        assert_eq!(at_close.first().map(String::as_str), Some("slow"));
        thread::sleep(Duration::from_millis(400));
        assert_eq!(recorder.texts(), at_close);
        assert!(!channel.close_for(session));
    }

    #[test]
    fn handler_can_close_its_own_session() {
        struct SelfClosing {
            channel: Arc<TranscriptChannel>,
            session: SessionId,
            calls: Mutex<u32>,
            done: Mutex<Sender<()>>,
        }

        impl TranscriptHandler for SelfClosing {
            fn on_transcript(&self, _event: &TranscriptEvent) {
                *self.calls.lock() += 1;
                assert!(self.channel.is_delivery_thread());
                self.channel.close_for(self.session);
                let _ = self.done.lock().send(());
            }
        }

        let channel = Arc::new(TranscriptChannel::new());
        let session = SessionId::new();
        let (done_tx, done_rx) = mpsc::channel();
        let handler = Arc::new(SelfClosing {
            channel: Arc::clone(&channel),
            session,
            calls: Mutex::new(0),
            done: Mutex::new(done_tx),
        });
        let sender = channel.open(session, handler.clone()).unwrap();

        sender.push(event("first"));
        sender.push(event("second"));

        done_rx.recv_timeout(WAIT).unwrap();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(*handler.calls.lock(), 1);
        assert!(!channel.is_delivery_thread());
    }

    #[test]
    fn panicking_handler_does_not_stop_delivery() {
        struct Flaky {
            seen: Mutex<Sender<String>>,
        }

        impl TranscriptHandler for Flaky {
            fn on_transcript(&self, event: &TranscriptEvent) {
                if event.text == "boom" {
                    panic!("handler failure");
                }
                let _ = self.seen.lock().send(event.text.clone());
            }
        }

        let channel = TranscriptChannel::new();
        let (tx, rx) = mpsc::channel();
        let sender = channel
            .open(SessionId::new(), Arc::new(Flaky { seen: Mutex::new(tx) }))
            .unwrap();

        sender.push(event("boom"));
        sender.push(event("after"));

        assert_eq!(rx.recv_timeout(WAIT).unwrap(), "after");
    }
}
