//! Event queue shared between the network receiver and the sync loop.
//!
//! The receiver pushes [`QueueEvent`]s at the back; the sync loop is the only
//! consumer. Waiting for data is a cooperative suspension on a
//! [`tokio::sync::Notify`], so the receiver can keep filling the queue from
//! the same single-threaded runtime.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use wavesync_types::QueueEvent;

/// The view of the event queue the sync loop relies on.
pub trait EventQueue {
    fn is_empty(&self) -> bool;

    fn len(&self) -> usize;

    fn pop_front(&self) -> Option<QueueEvent>;

    /// Put an event ahead of everything pending.
    fn push_front(&self, event: QueueEvent);

    /// Remove every pending event and hand them back in queue order.
    fn clear(&self) -> Vec<QueueEvent>;

    /// Resolve once at least one event is pending.
    fn wait_until_non_empty(&self) -> impl Future<Output = ()>;

    /// Ask the producer to reset its delivery state.
    fn request_recovery(&self);
}

type RecoveryHook = Box<dyn Fn() + Send + Sync>;

/// In-process, unbounded implementation of [`EventQueue`].
///
/// Safe to share across threads behind an `Arc`; producers call
/// [`ChunkQueue::push_back`].
pub struct ChunkQueue {
    events: Mutex<VecDeque<QueueEvent>>,
    available: Notify,
    recovery_generation: AtomicU64,
    recovery_hook: Option<RecoveryHook>,
}

impl Default for ChunkQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkQueue {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(VecDeque::new()),
            available: Notify::new(),
            recovery_generation: AtomicU64::new(0),
            recovery_hook: None,
        }
    }

    /// Run `hook` on every recovery request, after the generation is bumped.
    pub fn with_recovery_hook(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.recovery_hook = Some(Box::new(hook));
        self
    }

    /// Append an event and wake the consumer.
    pub fn push_back(&self, event: QueueEvent) {
        self.lock().push_back(event);
        self.available.notify_one();
    }

    /// Number of recovery requests made so far.
    ///
    /// Producers compare it against the last value they saw to notice a reset.
    pub fn recovery_generation(&self) -> u64 {
        self.recovery_generation.load(Ordering::Acquire)
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<QueueEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EventQueue for ChunkQueue {
    fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn len(&self) -> usize {
        self.lock().len()
    }

    fn pop_front(&self) -> Option<QueueEvent> {
        self.lock().pop_front()
    }

    fn push_front(&self, event: QueueEvent) {
        self.lock().push_front(event);
        self.available.notify_one();
    }

    fn clear(&self) -> Vec<QueueEvent> {
        self.lock().drain(..).collect()
    }

    async fn wait_until_non_empty(&self) {
        // `notify_one` stores a permit when nobody is waiting yet, so a push
        // between the emptiness check and the await still wakes us.
        loop {
            if !self.is_empty() {
                return;
            }
            self.available.notified().await;
        }
    }

    fn request_recovery(&self) {
        self.recovery_generation.fetch_add(1, Ordering::AcqRel);
        if let Some(hook) = &self.recovery_hook {
            hook();
        }
    }
}
