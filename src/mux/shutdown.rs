// MIT License - Copyright (c) 2026 envisalink-bridge contributors

use std::collections::VecDeque;
use std::fmt;

use tokio::sync::oneshot;

/// A zero-argument completion signal.
///
/// Firing consumes the value, so a completion can run at most once.
pub struct Completion(Box<dyn FnOnce() + Send + 'static>);

impl Completion {
    pub fn new(f: impl FnOnce() + Send + 'static) -> Self {
        Self(Box::new(f))
    }

    /// A completion that does nothing.
    pub fn noop() -> Self {
        Self::new(|| {})
    }

    /// A completion that resolves a oneshot receiver.
    pub fn from_sender(tx: oneshot::Sender<()>) -> Self {
        Self::new(move || {
            let _ = tx.send(());
        })
    }

    pub fn fire(self) {
        (self.0)()
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Completion")
    }
}

/// Holds the completions waiting on the teardown currently in flight.
///
/// A consumer-triggered teardown and an explicit close can overlap; both
/// completions are queued and fired in arrival order when the teardown
/// finishes.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    pending: VecDeque<Completion>,
    closing: bool,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, done: Completion) {
        self.pending.push_back(done);
    }

    #[cfg(test)]
    pub(crate) fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Fire every pending completion, oldest first, leaving none behind.
    /// Returns how many were fired.
    pub fn resolve_all(&mut self) -> usize {
        let pending = std::mem::take(&mut self.pending);
        let count = pending.len();
        for done in pending {
            done.fire();
        }
        count
    }

    /// Record that an explicit close has been requested.
    pub fn begin_close(&mut self) {
        self.closing = true;
    }

    pub fn is_closing(&self) -> bool {
        self.closing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_resolve_all_fires_in_order_once() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut coordinator = ShutdownCoordinator::new();
        for i in 0..3 {
            let order = order.clone();
            coordinator.push(Completion::new(move || order.lock().unwrap().push(i)));
        }

        assert_eq!(coordinator.resolve_all(), 3);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
        assert!(!coordinator.has_pending());
        assert_eq!(coordinator.resolve_all(), 0);
        assert_eq!(order.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_completion_from_sender() {
        let (tx, mut rx) = oneshot::channel();
        Completion::from_sender(tx).fire();
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_dropped_completion_never_fires() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        drop(Completion::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
