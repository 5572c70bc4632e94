//! Observer bridge: the subscription registry between the supervisors and the UI layer
//!
//! Listeners are plain callbacks. Delivery iterates over a snapshot of the
//! registry, so a listener may subscribe or unsubscribe (itself or others)
//! from inside a callback without disturbing the delivery in flight. Events
//! published before a listener subscribed are never replayed.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// Callback type stored in the registry
pub type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Entry<E> {
    id: u64,
    active: Arc<AtomicBool>,
    listener: Listener<E>,
}

struct Registry<E> {
    next_id: AtomicU64,
    entries: Mutex<Vec<Entry<E>>>,
}

/// Type-erased removal hook held by [`Subscription`]
trait ListenerSet: Send + Sync {
    fn remove(&self, id: u64);
}

impl<E: 'static> ListenerSet for Registry<E> {
    fn remove(&self, id: u64) {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.retain(|entry| entry.id != id);
    }
}

/// Fan-out point for one event type.
///
/// Cloning yields another handle to the same registry.
pub struct ObserverBridge<E> {
    registry: Arc<Registry<E>>,
}

impl<E> Clone for ObserverBridge<E> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<E: 'static> Default for ObserverBridge<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: 'static> ObserverBridge<E> {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Registry {
                next_id: AtomicU64::new(1),
                entries: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Register a listener. Delivery starts with the next published event.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        let active = Arc::new(AtomicBool::new(true));

        self.registry
            .entries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(Entry {
                id,
                active: Arc::clone(&active),
                listener: Arc::new(listener),
            });

        tracing::debug!("Listener {} subscribed", id);

        let registry: Arc<dyn ListenerSet> = self.registry.clone();
        Subscription {
            id,
            active,
            registry: Arc::downgrade(&registry),
        }
    }

    /// Deliver `event` once to every currently subscribed listener, in
    /// subscription order.
    pub fn publish(&self, event: &E) {
        let snapshot: Vec<(Arc<AtomicBool>, Listener<E>)> = self
            .registry
            .entries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .map(|entry| (Arc::clone(&entry.active), Arc::clone(&entry.listener)))
            .collect();

        for (active, listener) in snapshot {
            // Unsubscribed earlier in this same delivery
            if active.load(Ordering::Acquire) {
                listener(event);
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        self.registry
            .entries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .len()
    }
}

/// Token returned by [`ObserverBridge::subscribe`].
///
/// Dropping the token does NOT unsubscribe; call [`unsubscribe`](Self::unsubscribe).
#[must_use = "the listener stays registered until `unsubscribe` is called"]
pub struct Subscription {
    id: u64,
    active: Arc<AtomicBool>,
    registry: Weak<dyn ListenerSet>,
}

impl Subscription {
    /// Stop delivery to this listener. Safe to call any number of times; once
    /// it returns, the listener is not invoked again.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
        tracing::debug!("Listener {} unsubscribed", self.id);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recorder() -> (Arc<Mutex<Vec<u32>>>, impl Fn(&u32) + Send + Sync + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |v: &u32| sink.lock().unwrap().push(*v))
    }

    #[test]
    fn test_delivers_in_emission_order() {
        let bridge = ObserverBridge::new();
        let (seen, listener) = recorder();
        let _sub = bridge.subscribe(listener);

        for i in 0..5 {
            bridge.publish(&i);
        }
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_no_replay_for_late_subscriber() {
        let bridge = ObserverBridge::new();
        bridge.publish(&1);

        let (seen, listener) = recorder();
        let _sub = bridge.subscribe(listener);
        bridge.publish(&2);

        assert_eq!(*seen.lock().unwrap(), vec![2]);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let bridge = ObserverBridge::new();
        let (seen, listener) = recorder();
        let sub = bridge.subscribe(listener);

        bridge.publish(&1);
        sub.unsubscribe();
        sub.unsubscribe();
        bridge.publish(&2);

        assert!(!sub.is_active());
        assert_eq!(bridge.listener_count(), 0);
        assert_eq!(*seen.lock().unwrap(), vec![1]);
    }

    #[test]
    fn test_each_listener_gets_one_delivery() {
        let bridge = ObserverBridge::new();
        let (a, la) = recorder();
        let (b, lb) = recorder();
        let _sa = bridge.subscribe(la);
        let _sb = bridge.subscribe(lb);

        bridge.publish(&7);
        assert_eq!(*a.lock().unwrap(), vec![7]);
        assert_eq!(*b.lock().unwrap(), vec![7]);
    }

    #[test]
    fn test_unsubscribe_during_delivery() {
        let bridge: ObserverBridge<u32> = ObserverBridge::new();
        let (seen, listener) = recorder();

        // First listener removes the second while an event is in flight
        let victim: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let victim_ref = Arc::clone(&victim);
        let _killer = bridge.subscribe(move |_| {
            if let Some(sub) = victim_ref.lock().unwrap().as_ref() {
                sub.unsubscribe();
            }
        });
        *victim.lock().unwrap() = Some(bridge.subscribe(listener));

        bridge.publish(&1);
        bridge.publish(&2);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_subscribe_during_delivery_waits_for_next_event() {
        let bridge: ObserverBridge<u32> = ObserverBridge::new();
        let (seen, listener) = recorder();
        let listener = Arc::new(listener);

        let inner_bridge = bridge.clone();
        let added: Arc<Mutex<Vec<Subscription>>> = Arc::new(Mutex::new(Vec::new()));
        let added_ref = Arc::clone(&added);
        let _adder = bridge.subscribe(move |_| {
            let mut added = added_ref.lock().unwrap();
            if added.is_empty() {
                let l = Arc::clone(&listener);
                added.push(inner_bridge.subscribe(move |v| l(v)));
            }
        });

        bridge.publish(&1);
        bridge.publish(&2);
        assert_eq!(*seen.lock().unwrap(), vec![2]);
    }

    #[test]
    fn test_unsubscribe_after_bridge_dropped() {
        let bridge: ObserverBridge<u32> = ObserverBridge::new();
        let sub = bridge.subscribe(|_| {});
        drop(bridge);
        sub.unsubscribe();
        assert!(!sub.is_active());
    }
}
