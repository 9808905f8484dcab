use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::models::error::SessionError;

struct CancelState {
    cancelled: Mutex<bool>,
    signal: Condvar,
}

/// Per-session cancellation signal handed to every blocking port call.
///
/// Ports blocked in `acquire` or `next_event` should either poll
/// [`CancelToken::is_cancelled`] or sleep through
/// [`CancelToken::wait_timeout`], which returns early on cancellation.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<CancelState>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CancelState {
                cancelled: Mutex::new(false),
                signal: Condvar::new(),
            }),
        }
    }

    pub fn cancel(&self) {
        *self.inner.cancelled.lock() = true;
        self.inner.signal.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.cancelled.lock()
    }

    /// `Err(Cancelled)` once the token has fired.
    pub fn check(&self) -> Result<(), SessionError> {
        if self.is_cancelled() {
            Err(SessionError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sleep for up to `timeout`. Returns `true` if woken by cancellation.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut cancelled = self.inner.cancelled.lock();
        while !*cancelled {
            if self.inner.signal.wait_until(&mut cancelled, deadline).timed_out() {
                break;
            }
        }
        *cancelled
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
