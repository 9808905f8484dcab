use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct Counts {
    acquired: AtomicUsize,
    released: AtomicUsize,
}

/// Acquire/release counters for one port. Clones share the counts.
#[derive(Clone, Default)]
pub struct ResourceLedger {
    counts: Arc<Counts>,
}

impl ResourceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_acquire(&self) {
        self.counts.acquired.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_release(&self) {
        let released = self.counts.released.fetch_add(1, Ordering::SeqCst) + 1;
        if released > self.acquired() {
            log::error!("handle released more often than acquired ({} > {})", released, self.acquired());
        }
    }

    pub fn acquired(&self) -> usize {
        self.counts.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.counts.released.load(Ordering::SeqCst)
    }

    /// Handles currently held.
    pub fn outstanding(&self) -> usize {
        self.acquired().saturating_sub(self.released())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_counts() {
        let ledger = ResourceLedger::new();
        let clone = ledger.clone();
        clone.record_acquire();
        clone.record_acquire();
        ledger.record_release();

        assert_eq!(ledger.acquired(), 2);
        assert_eq!(ledger.released(), 1);
        assert_eq!(ledger.outstanding(), 1);
    }
}
