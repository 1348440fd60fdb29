use std::sync::{Arc, Mutex};

/// Callbacks the application layer registers on a session. All methods
/// default to no-ops, so implementors only override what they care
/// about. Invoked from the session task.
pub trait SessionObserver: Send + Sync {
    /// The handshake completed; the session is authenticated.
    fn on_connect(&self) {}

    /// The session ended, with the wire disconnect reason.
    fn on_disconnect(&self, _reason: &str) {}

    /// A decrypted chat message arrived.
    fn on_message(&self, _text: &str, _timestamp: u64) {}

    /// A liveness ping arrived from the peer.
    fn on_ping(&self, _timestamp: u64) {}
}

/// Holder for the optional observer, with explicit set and clear
/// operations. `destroy()` clears it so no callback fires after
/// teardown.
#[derive(Default)]
pub struct ObserverCell {
    inner: Mutex<Option<Arc<dyn SessionObserver>>>,
}

impl ObserverCell {
    pub fn set(&self, observer: Arc<dyn SessionObserver>) {
        *self.lock() = Some(observer);
    }

    pub fn clear(&self) {
        *self.lock() = None;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Arc<dyn SessionObserver>>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn current(&self) -> Option<Arc<dyn SessionObserver>> {
        self.lock().clone()
    }

    pub(crate) fn notify_connect(&self) {
        if let Some(observer) = self.current() {
            observer.on_connect();
        }
    }

    pub(crate) fn notify_disconnect(&self, reason: &str) {
        if let Some(observer) = self.current() {
            observer.on_disconnect(reason);
        }
    }

    pub(crate) fn notify_message(&self, text: &str, timestamp: u64) {
        if let Some(observer) = self.current() {
            observer.on_message(text, timestamp);
        }
    }

    pub(crate) fn notify_ping(&self, timestamp: u64) {
        if let Some(observer) = self.current() {
            observer.on_ping(timestamp);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[derive(Default)]
    struct Counter {
        pings: AtomicU32,
    }

    impl SessionObserver for Counter {
        fn on_ping(&self, _timestamp: u64) {
            self.pings.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn notifications_reach_set_observer_and_stop_after_clear() {
        let cell = ObserverCell::default();
        // nothing registered: no-op, no panic
        cell.notify_ping(1);

        let counter = Arc::new(Counter::default());
        cell.set(counter.clone());
        cell.notify_ping(2);
        cell.notify_ping(3);
        assert_eq!(counter.pings.load(Ordering::Relaxed), 2);

        cell.clear();
        cell.notify_ping(4);
        assert_eq!(counter.pings.load(Ordering::Relaxed), 2);
    }
}
