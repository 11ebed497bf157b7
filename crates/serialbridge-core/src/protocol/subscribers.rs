//! Payload subscribers
//!
//! The set is touched from two sides: application code adding and removing
//! callbacks, and the receive pass dispatching payloads. The lock covers only the
//! add/remove and the snapshot taken before dispatch, never the callbacks, so a
//! callback may unsubscribe itself.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::warn;

use super::Payload;

type Callback = Arc<dyn Fn(&Payload) + Send + Sync>;

/// Handle returned by [`SubscriberSet::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// A callback that panicked while handling a payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFailure {
    /// Subscriber that failed
    pub subscription: SubscriptionId,
    /// Panic message, when it was a string
    pub message: String,
}

/// Registered payload-completion callbacks
#[derive(Default)]
pub struct SubscriberSet {
    entries: Mutex<Vec<(SubscriptionId, Callback)>>,
    next_id: AtomicU64,
}

impl SubscriberSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(SubscriptionId, Callback)>> {
        // A poisoned lock only means a panic happened elsewhere while holding it;
        // the vector itself is always left consistent.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a callback
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Payload) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push((id, Arc::new(callback)));
        id
    }

    /// Remove a callback; returns false if it was not registered
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|(existing, _)| *existing != id);
        entries.len() != before
    }

    /// Number of registered callbacks
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True when nobody is subscribed
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Invoke every callback with `payload`, in subscription order
    ///
    /// A panicking callback does not stop the others; its failure is returned.
    pub fn dispatch(&self, payload: &Payload) -> Vec<DeliveryFailure> {
        let snapshot: Vec<(SubscriptionId, Callback)> = self.lock().clone();

        let mut failures = Vec::new();
        for (id, callback) in snapshot {
            if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| callback(payload))) {
                let message = panic_message(panic.as_ref());
                warn!("Payload subscriber {:?} panicked: {}", id, message);
                failures.push(DeliveryFailure {
                    subscription: id,
                    message,
                });
            }
        }
        failures
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_subscribe_and_dispatch() {
        let set = SubscriberSet::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        set.subscribe(move |p| sink.lock().unwrap().push(p.to_vec()));

        assert!(set.dispatch(&Payload::new(vec![1, 2])).is_empty());
        assert_eq!(*seen.lock().unwrap(), vec![vec![1, 2]]);
    }

    #[test]
    fn test_unsubscribe() {
        let set = SubscriberSet::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let id = set.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        set.dispatch(&Payload::default());
        assert!(set.unsubscribe(id));
        assert!(!set.unsubscribe(id));
        set.dispatch(&Payload::default());

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(set.is_empty());
    }

    #[test]
    fn test_panicking_callback_does_not_block_others() {
        let set = SubscriberSet::new();
        let count = Arc::new(AtomicUsize::new(0));

        let bad = set.subscribe(|_| panic!("boom"));
        let c = Arc::clone(&count);
        set.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        let failures = set.dispatch(&Payload::default());
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].subscription, bad);
        assert_eq!(failures[0].message, "boom");
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // Still usable afterwards
        set.dispatch(&Payload::default());
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_callback_can_unsubscribe_itself() {
        let set = Arc::new(SubscriberSet::new());
        let id_slot = Arc::new(Mutex::new(None::<SubscriptionId>));

        let set_ref = Arc::clone(&set);
        let slot = Arc::clone(&id_slot);
        let id = set.subscribe(move |_| {
            if let Some(id) = *slot.lock().unwrap() {
                set_ref.unsubscribe(id);
            }
        });
        *id_slot.lock().unwrap() = Some(id);

        set.dispatch(&Payload::default());
        assert!(set.is_empty());
    }
}
