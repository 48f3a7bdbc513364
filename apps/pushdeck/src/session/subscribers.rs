use std::sync::Arc;

use parking_lot::Mutex;

/// Opaque unsubscribe handle returned by `subscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

enum StagedOp<T> {
    Add(u64, Callback<T>),
    Remove(u64),
}

struct ListInner<T> {
    entries: Vec<(u64, Callback<T>)>,
    staged: Vec<StagedOp<T>>,
    next_id: u64,
    dispatching: bool,
}

/// Publish/subscribe list with safe mutation during dispatch.
///
/// Callbacks run synchronously in registration order. A subscribe or
/// unsubscribe issued from inside a callback is staged and applied once the
/// current dispatch completes, so the entry list is never mutated while it
/// is being iterated.
pub struct SubscriberList<T> {
    inner: Mutex<ListInner<T>>,
}

impl<T> Default for SubscriberList<T> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(ListInner {
                entries: Vec::new(),
                staged: Vec::new(),
                next_id: 0,
                dispatching: false,
            }),
        }
    }
}

impl<T> SubscriberList<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> SubscriptionId {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        let callback: Callback<T> = Arc::new(callback);
        if inner.dispatching {
            inner.staged.push(StagedOp::Add(id, callback));
        } else {
            inner.entries.push((id, callback));
        }
        SubscriptionId(id)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        let mut inner = self.inner.lock();
        if inner.dispatching {
            inner.staged.push(StagedOp::Remove(id.0));
        } else {
            inner.entries.retain(|(entry_id, _)| *entry_id != id.0);
        }
    }

    pub fn dispatch(&self, value: &T) {
        let entries: Vec<Callback<T>> = {
            let mut inner = self.inner.lock();
            inner.dispatching = true;
            inner
                .entries
                .iter()
                .map(|(_, callback)| callback.clone())
                .collect()
        };

        for callback in &entries {
            callback(value);
        }

        let mut inner = self.inner.lock();
        inner.dispatching = false;
        let staged = std::mem::take(&mut inner.staged);
        for op in staged {
            match op {
                StagedOp::Add(id, callback) => inner.entries.push((id, callback)),
                StagedOp::Remove(id) => inner.entries.retain(|(entry_id, _)| *entry_id != id),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn dispatches_in_registration_order() {
        let list = SubscriberList::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let seen = seen.clone();
            list.subscribe(move |_value: &u32| seen.lock().push(tag));
        }
        list.dispatch(&1);
        assert_eq!(*seen.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let list = SubscriberList::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let id = list.subscribe(move |_value: &u32| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        list.dispatch(&1);
        list.unsubscribe(id);
        list.dispatch(&2);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_during_dispatch_is_staged() {
        let list = Arc::new(SubscriberList::new());
        let count = Arc::new(AtomicUsize::new(0));

        let id_slot = Arc::new(Mutex::new(None::<SubscriptionId>));
        let counter = count.clone();
        let list_ref = list.clone();
        let slot = id_slot.clone();
        let id = list.subscribe(move |_value: &u32| {
            counter.fetch_add(1, Ordering::SeqCst);
            // Unsubscribing ourselves mid-dispatch must not panic or skip
            // other subscribers; it takes effect for the next dispatch.
            if let Some(id) = *slot.lock() {
                list_ref.unsubscribe(id);
            }
        });
        *id_slot.lock() = Some(id);

        let tail = Arc::new(AtomicUsize::new(0));
        let tail_counter = tail.clone();
        list.subscribe(move |_value: &u32| {
            tail_counter.fetch_add(1, Ordering::SeqCst);
        });

        list.dispatch(&1);
        list.dispatch(&2);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(tail.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn subscribe_during_dispatch_does_not_fire_for_current_event() {
        let list = Arc::new(SubscriberList::new());
        let late = Arc::new(AtomicUsize::new(0));

        let list_ref = list.clone();
        let late_ref = late.clone();
        list.subscribe(move |_value: &u32| {
            let late_inner = late_ref.clone();
            list_ref.subscribe(move |_value: &u32| {
                late_inner.fetch_add(1, Ordering::SeqCst);
            });
        });

        list.dispatch(&1);
        assert_eq!(late.load(Ordering::SeqCst), 0);
        list.dispatch(&2);
        assert_eq!(late.load(Ordering::SeqCst), 1);
    }
}
