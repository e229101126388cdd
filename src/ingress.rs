//! Bounded, thread-safe queue of UDP payloads, indexed by a 16-bit monotonic
//! counter. One writer (the receiver thread), one reader (the processing
//! thread), plus a synchronous overflow callback.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::error::{CollectorError, Result};

/// One received UDP payload, tagged with the ingress index it was assigned on
/// arrival. The index increments by one per datagram, modulo 2^16 (I5).
#[derive(Debug, Clone)]
pub struct IngressPacket {
    pub index: u16,
    pub payload: Vec<u8>,
}

type OverflowCallback = Box<dyn Fn() + Send + Sync>;

struct Inner {
    queue: VecDeque<IngressPacket>,
    next_index: u16,
    capacity: usize,
    overflow_callback: Option<OverflowCallback>,
}

/// Bounded FIFO of `(index, payload)` pairs shared between the receiver
/// thread and the processing thread. One mutex guards the deque, the index
/// counter, and the callback pointer (ADR in `SPEC_FULL.md` §4.2/§9).
pub struct IngressQueue {
    inner: Arc<(Mutex<Inner>, Condvar)>,
}

impl IngressQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new((
                Mutex::new(Inner {
                    queue: VecDeque::with_capacity(capacity),
                    next_index: 0,
                    capacity,
                    overflow_callback: None,
                }),
                Condvar::new(),
            )),
        }
    }

    /// Assigns the next index and enqueues `data`. Fails with `Overflow` when
    /// the queue is already at capacity; the overflow callback fires before
    /// the error is returned. Rejects empty input with `InvalidArgument`.
    pub fn append(&self, data: Vec<u8>) -> Result<u16> {
        if data.is_empty() {
            return Err(CollectorError::InvalidArgument(
                "append with empty payload".into(),
            ));
        }

        let (mutex, condvar) = &*self.inner;
        let mut inner = mutex.lock();

        if inner.queue.len() == inner.capacity {
            if let Some(cb) = inner.overflow_callback.as_ref() {
                cb();
            }
            return Err(CollectorError::Overflow {
                capacity: inner.capacity,
            });
        }

        let index = inner.next_index;
        inner.next_index = inner.next_index.wrapping_add(1);
        inner.queue.push_back(IngressPacket {
            index,
            payload: data,
        });
        condvar.notify_all();
        Ok(index)
    }

    /// Removes and returns the head of the queue, or `None` if empty.
    pub fn pop_one(&self) -> Option<IngressPacket> {
        let (mutex, _) = &*self.inner;
        mutex.lock().queue.pop_front()
    }

    /// Removes and returns all queued packets, preserving arrival order.
    pub fn drain(&self) -> Vec<IngressPacket> {
        let (mutex, _) = &*self.inner;
        let mut inner = mutex.lock();
        inner.queue.drain(..).collect()
    }

    /// Blocks until at least `min_count` packets are queued. Loops on
    /// spurious wake-ups.
    pub fn wait_for(&self, min_count: usize) {
        let (mutex, condvar) = &*self.inner;
        let mut inner = mutex.lock();
        while inner.queue.len() < min_count {
            condvar.wait(&mut inner);
        }
    }

    /// Installs (or replaces) the overflow callback. The callback must not
    /// re-enter this queue and must not block.
    pub fn set_overflow_callback<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let (mutex, _) = &*self.inner;
        mutex.lock().overflow_callback = Some(Box::new(callback));
    }

    pub fn len(&self) -> usize {
        let (mutex, _) = &*self.inner;
        mutex.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        let (mutex, _) = &*self.inner;
        let inner = mutex.lock();
        inner.queue.len() == inner.capacity
    }

    pub fn size_in_bytes(&self) -> usize {
        let (mutex, _) = &*self.inner;
        mutex.lock().queue.iter().map(|p| p.payload.len()).sum()
    }
}

impl Clone for IngressQueue {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
