//! Synchronous publish/subscribe with a current value.
//!
//! [`Publisher`] keeps the latest value and a list of callbacks. Publishing
//! stores the value and calls every subscriber before returning. A subscriber
//! that publishes again from inside its callback does not jump the queue: the
//! nested value is delivered once the current round has reached everyone, so
//! all subscribers observe values in commit order. A callback registered
//! while a round is in progress starts from the current value and skips the
//! older ones still queued.
//!
//! Callbacks run with no lock held, so they may freely read, publish or
//! subscribe.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Registered<T> {
    id: u64,
    /// Sequence number of the value this subscriber was handed on subscribe.
    since: u64,
    callback: Callback<T>,
}

struct Inner<T> {
    current: T,
    /// Sequence number of `current`; the initial value is 0.
    seq: u64,
    subscribers: Vec<Registered<T>>,
    next_id: u64,
    queue: VecDeque<(u64, T)>,
    delivering: bool,
}

/// Clears `delivering` if a callback unwinds mid-round, so later publishes
/// are still delivered.
struct DeliveryGuard<'a, T> {
    inner: &'a Mutex<Inner<T>>,
    armed: bool,
}

impl<T> Drop for DeliveryGuard<'_, T> {
    fn drop(&mut self) {
        if self.armed {
            self.inner.lock().delivering = false;
        }
    }
}

/// Value holder that notifies subscribers on every publish.
pub struct Publisher<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T: Clone + Send + 'static> Publisher<T> {
    pub fn new(initial: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                current: initial,
                seq: 0,
                subscribers: Vec::new(),
                next_id: 0,
                queue: VecDeque::new(),
                delivering: false,
            })),
        }
    }

    /// The most recently published value.
    pub fn current(&self) -> T {
        self.inner.lock().current.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    /// Replace the current value and notify every subscriber.
    ///
    /// Called from inside a callback, the value is queued and delivered by
    /// the outermost `publish` once the current round is done.
    pub fn publish(&self, value: T) {
        {
            let mut inner = self.inner.lock();
            inner.seq += 1;
            let seq = inner.seq;
            inner.current = value.clone();
            inner.queue.push_back((seq, value));
            if inner.delivering {
                return;
            }
            inner.delivering = true;
        }

        let mut guard = DeliveryGuard {
            inner: &self.inner,
            armed: true,
        };
        loop {
            let (value, subscribers) = {
                let mut inner = self.inner.lock();
                match inner.queue.pop_front() {
                    Some((seq, value)) => {
                        let subscribers: Vec<Callback<T>> = inner
                            .subscribers
                            .iter()
                            .filter(|s| s.since < seq)
                            .map(|s| s.callback.clone())
                            .collect();
                        (value, subscribers)
                    }
                    None => {
                        inner.delivering = false;
                        guard.armed = false;
                        return;
                    }
                }
            };
            for subscriber in subscribers {
                subscriber(&value);
            }
        }
    }

    /// Register a callback. It is invoked right away with the current value,
    /// then on every later publish until the returned [`Subscription`] is
    /// released.
    pub fn subscribe<F>(&self, f: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let callback: Callback<T> = Arc::new(f);
        let (id, current) = {
            let mut inner = self.inner.lock();
            let id = inner.next_id;
            inner.next_id += 1;
            let since = inner.seq;
            inner.subscribers.push(Registered {
                id,
                since,
                callback: callback.clone(),
            });
            (id, inner.current.clone())
        };
        callback(&current);

        let weak: Weak<Mutex<Inner<T>>> = Arc::downgrade(&self.inner);
        Subscription {
            release: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.lock().subscribers.retain(|s| s.id != id);
                }
            })),
        }
    }
}

impl<T> Clone for Publisher<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Publisher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("subscribers", &self.inner.lock().subscribers.len())
            .finish_non_exhaustive()
    }
}

/// Capability to stop receiving notifications.
///
/// `unsubscribe` consumes the subscription, so it runs at most once. Dropping
/// the subscription has the same effect.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.release.is_some())
            .finish()
    }
}
