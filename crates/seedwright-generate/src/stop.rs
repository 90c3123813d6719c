use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Cooperative cancellation: an explicit stop, an optional deadline, and an
/// optional parent signal. Checked between rows, never mid-row.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    inner: Arc<StopInner>,
}

#[derive(Debug, Default)]
struct StopInner {
    stopped: AtomicBool,
    deadline: Option<Instant>,
    parent: Option<StopSignal>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            inner: Arc::new(StopInner {
                deadline: Some(deadline),
                ..StopInner::default()
            }),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// A signal that is stopped when either it or `self` is stopped.
    pub fn child(&self) -> Self {
        Self {
            inner: Arc::new(StopInner {
                parent: Some(self.clone()),
                ..StopInner::default()
            }),
        }
    }

    /// Child signal that also stops once `timeout` has elapsed.
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        Self {
            inner: Arc::new(StopInner {
                deadline: Some(Instant::now() + timeout),
                parent: Some(self.clone()),
                ..StopInner::default()
            }),
        }
    }

    pub fn stop(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
            || self
                .inner
                .deadline
                .is_some_and(|deadline| Instant::now() >= deadline)
            || self
                .inner
                .parent
                .as_ref()
                .is_some_and(StopSignal::is_stopped)
    }

    /// Whether the stop came from an expired deadline rather than `stop()`.
    pub fn deadline_expired(&self) -> bool {
        self.inner
            .deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
            || self
                .inner
                .parent
                .as_ref()
                .is_some_and(StopSignal::deadline_expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_follows_parent() {
        let parent = StopSignal::new();
        let child = parent.child();
        assert!(!child.is_stopped());
        child.stop();
        assert!(child.is_stopped());
        assert!(!parent.is_stopped());

        let other = parent.child();
        parent.stop();
        assert!(other.is_stopped());
    }

    #[test]
    fn deadline_expires() {
        let signal = StopSignal::with_timeout(Duration::ZERO);
        assert!(signal.is_stopped());
        assert!(signal.deadline_expired());
    }
}
