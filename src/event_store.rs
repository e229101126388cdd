//! Bounded, ordered, mutex-guarded collection of `Event`s.

use std::time::Instant;

use parking_lot::Mutex;

use crate::error::{CollectorError, Result};
use crate::event::Event;

type OverflowCallback = Box<dyn Fn() + Send + Sync>;

struct Inner {
    events: Vec<Event>,
    max_events: usize,
    overflow_callback: Option<OverflowCallback>,
}

/// Owns events in insertion order (== creation order == event-index order,
/// `I1`). One mutex guards the vector and the overflow callback.
pub struct EventStore {
    inner: Mutex<Inner>,
}

impl EventStore {
    pub fn new(max_events: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                events: Vec::new(),
                max_events,
                overflow_callback: None,
            }),
        }
    }

    pub fn set_overflow_callback<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.lock().overflow_callback = Some(Box::new(callback));
    }

    /// Rejects with `Overflow` when `len >= max_events` (`I6`); fires the
    /// overflow callback first.
    pub fn push(&self, event: Event) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.events.len() >= inner.max_events {
            if let Some(cb) = inner.overflow_callback.as_ref() {
                cb();
            }
            return Err(CollectorError::Overflow {
                capacity: inner.max_events,
            });
        }
        inner.events.push(event);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn latest(&self) -> Result<Event> {
        let inner = self.inner.lock();
        inner
            .events
            .last()
            .cloned()
            .ok_or(CollectorError::OutOfRange { index: 0, len: 0 })
    }

    pub fn at(&self, i: usize) -> Result<Event> {
        let inner = self.inner.lock();
        inner
            .events
            .get(i)
            .cloned()
            .ok_or(CollectorError::OutOfRange {
                index: i,
                len: inner.events.len(),
            })
    }

    /// Overwrites the event at `i`. Used by `EventAssembler` to append a
    /// packet without exposing an interior `&mut Event` across the lock
    /// boundary.
    pub fn replace(&self, i: usize, event: Event) {
        let mut inner = self.inner.lock();
        if let Some(slot) = inner.events.get_mut(i) {
            *slot = event;
        }
    }

    /// Binary search from `seed_index` (or 0 if out of range) for the first
    /// event with `creation_timestamp >= ts`, relying on `I1`'s monotonicity.
    pub fn events_after_timestamp(&self, ts: Instant, seed_index: usize) -> Vec<Event> {
        let inner = self.inner.lock();
        let start = Self::seed_search(&inner.events, ts, seed_index);
        inner.events[start..].to_vec()
    }

    pub fn events_from_index(&self, i: usize) -> Vec<Event> {
        let inner = self.inner.lock();
        if i >= inner.events.len() {
            return Vec::new();
        }
        inner.events[i..].to_vec()
    }

    pub fn remove_before_timestamp(&self, ts: Instant, seed_index: usize) -> usize {
        let mut inner = self.inner.lock();
        let cut = Self::seed_search(&inner.events, ts, seed_index);
        inner.events.drain(0..cut);
        cut
    }

    pub fn remove_before_index(&self, i: usize) -> usize {
        let mut inner = self.inner.lock();
        let cut = i.min(inner.events.len());
        inner.events.drain(0..cut);
        cut
    }

    /// Shrinks the store to `n` events (dropping the oldest) and logs a
    /// warning when that drops any live events.
    pub fn set_max_events(&self, n: usize) {
        let mut inner = self.inner.lock();
        inner.max_events = n;
        if inner.events.len() > n {
            let excess = inner.events.len() - n;
            log::warn!("set_max_events({n}) dropping {excess} oldest event(s)");
            inner.events.drain(0..excess);
        }
    }

    pub fn clear(&self) {
        self.inner.lock().events.clear();
    }

    /// The search window `[seed_index, len)` is scanned for the first event
    /// whose timestamp is `>= ts` via binary search; an out-of-range seed
    /// falls back to searching the whole store from the start.
    fn seed_search(events: &[Event], ts: Instant, seed_index: usize) -> usize {
        let lo = if seed_index < events.len() {
            seed_index
        } else {
            0
        };
        let slice = &events[lo..];
        let offset = slice.partition_point(|e| e.creation_timestamp < ts);
        lo + offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventConfig, TriggerType};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread::sleep;
    use std::time::Duration;

    fn config() -> EventConfig {
        EventConfig {
            time_threshold: 5000,
            clock_frequency: 1_000_000_000,
            num_windows: 1,
            channel_mask: 0b11,
            trigger_type: TriggerType::External,
            event_header: 0xBBBB,
            event_trailer: 0xEEEE,
        }
    }

    #[test]
    fn store_ordering_p5() {
        let store = EventStore::new(16);
        let cfg = config();
        for i in 0..5u32 {
            store.push(Event::new(&cfg, 1000 + i, i, 74)).unwrap();
            sleep(Duration::from_millis(1));
        }
        let all = store.events_from_index(0);
        for w in all.windows(2) {
            assert!(w[0].creation_timestamp <= w[1].creation_timestamp);
            assert!(w[0].index < w[1].index);
        }
    }

    #[test]
    fn overflow_fires_callback_and_preserves_contents() {
        let store = EventStore::new(2);
        let cfg = config();
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = Arc::clone(&fired);
        store.set_overflow_callback(move || {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });

        store.push(Event::new(&cfg, 1000, 0, 74)).unwrap();
        store.push(Event::new(&cfg, 1001, 1, 74)).unwrap();
        let err = store.push(Event::new(&cfg, 1002, 2, 74)).unwrap_err();
        assert!(matches!(err, CollectorError::Overflow { capacity: 2 }));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn latest_and_at_report_out_of_range_on_empty_store() {
        let store = EventStore::new(4);
        assert!(matches!(
            store.latest(),
            Err(CollectorError::OutOfRange { .. })
        ));
        assert!(matches!(
            store.at(0),
            Err(CollectorError::OutOfRange { .. })
        ));
    }

    #[test]
    fn set_max_events_shrinks_and_drops_oldest() {
        let store = EventStore::new(16);
        let cfg = config();
        for i in 0..5u32 {
            store.push(Event::new(&cfg, 1000 + i, i, 74)).unwrap();
        }
        store.set_max_events(2);
        assert_eq!(store.len(), 2);
        let remaining = store.events_from_index(0);
        assert_eq!(remaining[0].index, 3);
        assert_eq!(remaining[1].index, 4);
    }

    #[test]
    fn remove_before_index_drops_prefix() {
        let store = EventStore::new(16);
        let cfg = config();
        for i in 0..5u32 {
            store.push(Event::new(&cfg, 1000 + i, i, 74)).unwrap();
        }
        let dropped = store.remove_before_index(3);
        assert_eq!(dropped, 3);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn events_after_timestamp_uses_binary_search() {
        let store = EventStore::new(16);
        let cfg = config();
        let mut marks = Vec::new();
        for i in 0..5u32 {
            store.push(Event::new(&cfg, 1000 + i, i, 74)).unwrap();
            marks.push(Instant::now());
            sleep(Duration::from_millis(1));
        }
        let after = store.events_after_timestamp(marks[2], 0);
        assert!(after.iter().all(|e| e.index >= 3));
    }
}
