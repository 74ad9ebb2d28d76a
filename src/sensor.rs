//! Last-value-plus-change-stream channels used for all telemetry fan-out.
//!
//! A [`Sensor`] is a mutable last-value cell plus a list of subscribers.
//! Channels come in two modes: *deduplicating* (a write equal to the current
//! value publishes nothing) and *raw* (every write publishes). Delivery is
//! serialized per channel on the writing thread; subscribers must not block.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

type Callback<T> = Box<dyn FnMut(&T) + Send>;

struct Shared<T> {
    value: Mutex<Option<T>>,
    subscribers: Mutex<Vec<(u64, Callback<T>)>>,
    next_id: AtomicU64,
    dedup: bool,
}

/// A broadcast telemetry channel. Clones share the same cell and
/// subscriber list.
pub struct Sensor<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Sensor<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone + PartialEq + Send + 'static> Sensor<T> {
    /// A raw channel: every write publishes.
    pub fn new() -> Self {
        Self::with_mode(false)
    }

    /// A deduplicating channel: writes equal to the last value are dropped.
    pub fn deduplicating() -> Self {
        Self::with_mode(true)
    }

    fn with_mode(dedup: bool) -> Self {
        Self {
            shared: Arc::new(Shared {
                value: Mutex::new(None),
                subscribers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
                dedup,
            }),
        }
    }

    /// Store a value and deliver it to every subscriber.
    pub fn write(&self, value: T) {
        {
            let mut cell = self.shared.value.lock().unwrap();
            if self.shared.dedup && cell.as_ref() == Some(&value) {
                return;
            }
            *cell = Some(value.clone());
        }
        let mut subs = self.shared.subscribers.lock().unwrap();
        for (_, cb) in subs.iter_mut() {
            cb(&value);
        }
    }

    /// The most recently written value, if any.
    pub fn get(&self) -> Option<T> {
        self.shared.value.lock().unwrap().clone()
    }

    /// Register a change observer. The returned handle cancels it; dropping
    /// the handle without cancelling leaves the observer attached for the
    /// life of the channel.
    pub fn subscribe(&self, f: impl FnMut(&T) + Send + 'static) -> Subscription {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        self.shared
            .subscribers
            .lock()
            .unwrap()
            .push((id, Box::new(f)));

        let weak: Weak<Shared<T>> = Arc::downgrade(&self.shared);
        Subscription {
            cancel: Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    shared
                        .subscribers
                        .lock()
                        .unwrap()
                        .retain(|(sid, _)| *sid != id);
                }
            }),
        }
    }
}

impl<T: Clone + PartialEq + Send + 'static> Default for Sensor<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle for a channel subscription. Cancellation is idempotent and
/// survives the channel being dropped first.
pub struct Subscription {
    cancel: Box<dyn Fn() + Send + Sync>,
}

impl Subscription {
    pub fn cancel(&self) {
        (self.cancel)();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn collector(sensor: &Sensor<i32>) -> (Arc<Mutex<Vec<i32>>>, Subscription) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = sensor.subscribe(move |v| sink.lock().unwrap().push(*v));
        (seen, sub)
    }

    #[test]
    fn raw_channel_publishes_every_write() {
        let sensor = Sensor::new();
        let (seen, _sub) = collector(&sensor);
        for v in [1, 1, 2, 2, 2] {
            sensor.write(v);
        }
        assert_eq!(*seen.lock().unwrap(), vec![1, 1, 2, 2, 2]);
        assert_eq!(sensor.get(), Some(2));
    }

    #[test]
    fn dedup_channel_skips_equal_writes() {
        let sensor = Sensor::deduplicating();
        let (seen, _sub) = collector(&sensor);
        for v in [1, 1, 2, 2, 1] {
            sensor.write(v);
        }
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 1]);
    }

    #[test]
    fn last_value_readable_without_subscribing() {
        let sensor = Sensor::new();
        assert_eq!(sensor.get(), None);
        sensor.write(7);
        assert_eq!(sensor.get(), Some(7));
    }

    #[test]
    fn cancel_is_idempotent() {
        let sensor = Sensor::new();
        let (seen, sub) = collector(&sensor);
        sensor.write(1);
        sub.cancel();
        sub.cancel();
        sensor.write(2);
        assert_eq!(*seen.lock().unwrap(), vec![1]);
    }

    #[test]
    fn cancel_after_channel_dropped() {
        let sensor = Sensor::new();
        let (_seen, sub) = collector(&sensor);
        drop(sensor);
        sub.cancel();
    }

    #[test]
    fn multiple_subscribers_all_delivered() {
        let sensor = Sensor::new();
        let (a, _sa) = collector(&sensor);
        let (b, _sb) = collector(&sensor);
        sensor.write(5);
        assert_eq!(*a.lock().unwrap(), vec![5]);
        assert_eq!(*b.lock().unwrap(), vec![5]);
    }

    #[test]
    fn clones_share_the_channel() {
        let sensor = Sensor::new();
        let alias = sensor.clone();
        let (seen, _sub) = collector(&sensor);
        alias.write(9);
        assert_eq!(*seen.lock().unwrap(), vec![9]);
        assert_eq!(sensor.get(), Some(9));
    }
}
