//! Process-wide controller for hosts that cannot pass one through.
//!
//! Prefer constructing a [`SessionController`] and handing it to the code
//! that needs it. This module exists for bindings where the host only knows
//! free functions (`start_recognition` / `stop_recognition`).

use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::models::error::SessionError;
use crate::models::transcript::SessionId;
use crate::ports::no_platform::NoPlatform;
use crate::session::controller::SessionController;
use crate::traits::recognizer::SpeechRecognizer;
use crate::traits::transcript_handler::TranscriptHandler;

type Factory = Box<dyn Fn() -> Arc<dyn SpeechRecognizer> + Send + Sync>;

struct SharedSlot {
    factory: Option<Factory>,
    instance: Option<Arc<dyn SpeechRecognizer>>,
}

static SHARED: Lazy<Mutex<SharedSlot>> = Lazy::new(|| {
    Mutex::new(SharedSlot {
        factory: None,
        instance: None,
    })
});

/// Register how the shared controller is built. Takes effect the next time
/// an instance is created (first access, or after [`reset`]).
///
/// The factory runs with the accessor locked and must not call back into
/// this module.
pub fn install<F>(factory: F)
where
    F: Fn() -> Arc<dyn SpeechRecognizer> + Send + Sync + 'static,
{
    SHARED.lock().factory = Some(Box::new(factory));
}

/// The shared controller, created on first access.
///
/// Without an installed factory the controller is built on [`NoPlatform`]
/// ports: sessions start and immediately report `DeviceUnavailable`.
pub fn shared() -> Arc<dyn SpeechRecognizer> {
    let mut slot = SHARED.lock();
    if let Some(ref instance) = slot.instance {
        return Arc::clone(instance);
    }

    let instance = match slot.factory {
        Some(ref factory) => factory(),
        None => {
            log::warn!("no recognizer factory installed, speech recognition is unavailable");
            Arc::new(SessionController::new(NoPlatform, NoPlatform)) as Arc<dyn SpeechRecognizer>
        }
    };
    slot.instance = Some(Arc::clone(&instance));
    instance
}

pub fn is_initialized() -> bool {
    SHARED.lock().instance.is_some()
}

/// Stop any active session and drop the shared controller. The next
/// [`shared`] call builds a fresh one.
pub fn reset() {
    let instance = SHARED.lock().instance.take();
    if let Some(instance) = instance {
        instance.stop_recognition();
        log::debug!("shared recognizer reset");
    }
}

pub fn start_recognition<H>(handler: H) -> Result<SessionId, SessionError>
where
    H: TranscriptHandler + 'static,
{
    shared().start_recognition(Arc::new(handler))
}

/// Stop the shared controller's session. Never creates an instance.
pub fn stop_recognition() {
    let instance = SHARED.lock().instance.clone();
    if let Some(instance) = instance {
        instance.stop_recognition();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    // The accessor is process-wide; tests touching it take turns.
    static SERIAL: Mutex<()> = Mutex::new(());

    fn wait_idle(recognizer: &Arc<dyn SpeechRecognizer>) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if recognizer.state().is_idle() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn default_instance_reports_unavailable() {
        let _serial = SERIAL.lock();
        reset();
        SHARED.lock().factory = None;

        let (tx, rx) = mpsc::channel();

        struct ErrorSink(Mutex<mpsc::Sender<SessionError>>);
        impl TranscriptHandler for ErrorSink {
            fn on_transcript(&self, _event: &crate::models::transcript::TranscriptEvent) {}
            fn on_error(&self, error: &SessionError) {
                let _ = self.0.lock().send(error.clone());
            }
        }

        start_recognition(ErrorSink(Mutex::new(tx))).unwrap();
        let error = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(matches!(error, SessionError::DeviceUnavailable(_)));
        assert!(wait_idle(&shared()));
        reset();
    }

    #[test]
    fn instance_is_reused_until_reset() {
        let _serial = SERIAL.lock();
        reset();

        static BUILT: AtomicUsize = AtomicUsize::new(0);
        install(|| {
            BUILT.fetch_add(1, Ordering::SeqCst);
            Arc::new(SessionController::new(NoPlatform, NoPlatform))
        });

        let first = shared();
        let second = shared();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(BUILT.load(Ordering::SeqCst), 1);

        reset();
        assert!(!is_initialized());
        let third = shared();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(BUILT.load(Ordering::SeqCst), 2);

        reset();
        SHARED.lock().factory = None;
    }

    #[test]
    fn stop_without_instance_does_not_create_one() {
        let _serial = SERIAL.lock();
        reset();

        stop_recognition();
        stop_recognition();
        assert!(!is_initialized());
    }
}
