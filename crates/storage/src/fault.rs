//! Fault injection for the store
//!
//! A `FaultInjector` is a cheap, cloneable handle shared between the store
//! and the transaction manager. Tests use it to force commit conflicts and
//! to make store reads slow enough to hit operation deadlines.
//! Read latency applies to transaction snapshots only; commit-time
//! validation reads through a view that skips it.
//!
//! With no faults armed every hook is a couple of relaxed atomic loads.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

#[derive(Debug, Default)]
struct FaultState {
    /// Commits still to be failed with a forced conflict
    forced_conflicts: AtomicU64,
    /// Delay applied to each snapshot read, in microseconds
    read_latency_us: AtomicU64,
    /// Total forced conflicts handed out
    conflicts_injected: AtomicU64,
}

/// Shared fault injection handle
#[derive(Debug, Clone, Default)]
pub struct FaultInjector {
    state: Arc<FaultState>,
}

impl FaultInjector {
    /// Create a handle with no faults armed
    pub fn new() -> Self {
        Self::default()
    }

    /// Force the next `n` commit validations to fail as conflicts
    pub fn fail_next_commits(&self, n: u64) {
        self.state.forced_conflicts.fetch_add(n, Ordering::SeqCst);
    }

    /// Delay every snapshot read by `latency`
    pub fn set_read_latency(&self, latency: Duration) {
        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.state.read_latency_us.store(micros, Ordering::Relaxed);
    }

    /// Disarm all faults
    pub fn clear(&self) {
        self.state.forced_conflicts.store(0, Ordering::SeqCst);
        self.state.read_latency_us.store(0, Ordering::Relaxed);
    }

    /// Total forced conflicts handed out so far
    pub fn conflicts_injected(&self) -> u64 {
        self.state.conflicts_injected.load(Ordering::Relaxed)
    }

    /// Consume one armed conflict, if any
    ///
    /// Called by the commit path during validation.
    pub fn take_forced_conflict(&self) -> bool {
        let taken = self
            .state
            .forced_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if taken {
            self.state.conflicts_injected.fetch_add(1, Ordering::Relaxed);
            debug!(target: "recipeseq::fault", "Injected commit conflict");
        }
        taken
    }

    /// Apply configured read latency
    pub(crate) fn on_read(&self) {
        let micros = self.state.read_latency_us.load(Ordering::Relaxed);
        if micros > 0 {
            std::thread::sleep(Duration::from_micros(micros));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_no_faults_by_default() {
        let faults = FaultInjector::new();
        assert!(!faults.take_forced_conflict());
        assert_eq!(faults.conflicts_injected(), 0);
    }

    #[test]
    fn test_forced_conflicts_are_consumed() {
        let faults = FaultInjector::new();
        faults.fail_next_commits(2);
        assert!(faults.take_forced_conflict());
        assert!(faults.take_forced_conflict());
        assert!(!faults.take_forced_conflict());
        assert_eq!(faults.conflicts_injected(), 2);
    }

    #[test]
    fn test_clones_share_state() {
        let faults = FaultInjector::new();
        let other = faults.clone();
        faults.fail_next_commits(1);
        assert!(other.take_forced_conflict());
        assert!(!faults.take_forced_conflict());
    }

    #[test]
    fn test_read_latency_and_clear() {
        let faults = FaultInjector::new();
        faults.set_read_latency(Duration::from_millis(5));
        let start = Instant::now();
        faults.on_read();
        assert!(start.elapsed() >= Duration::from_millis(5));

        faults.fail_next_commits(3);
        faults.clear();
        assert!(!faults.take_forced_conflict());
    }
}
