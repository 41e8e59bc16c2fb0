//! Clearing pending state when synchronization has to start over.

use wavesync_types::QueueEvent;

use crate::queue::EventQueue;

/// What a [`clear_state`] call threw away.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClearOutcome {
    /// Events removed from the queue, not counting a re-inserted format change.
    pub discarded: usize,
    /// Whether a format change was put back at the front of the queue.
    pub kept_config: bool,
}

/// Drop everything pending and ask the producer to reset.
///
/// Resets `silence_budget`. The most recent `ConfigChange` among the removed
/// events is re-inserted as the only remaining entry so the next stream
/// format is not lost. The producer's
/// recovery hook runs on every call, even when nothing was pending.
pub fn clear_state<Q: EventQueue>(queue: &Q, silence_budget: &mut u64) -> ClearOutcome {
    *silence_budget = 0;

    let pending = queue.clear();
    let mut discarded = pending.len();
    let latest_config = pending.into_iter().rev().find(QueueEvent::is_config);

    let kept_config = latest_config.is_some();
    if let Some(config) = latest_config {
        discarded -= 1;
        queue.push_front(config);
    }

    queue.request_recovery();
    ClearOutcome {
        discarded,
        kept_config,
    }
}
