//! Cooperative timer queue.
//!
//! All deferred work (simulation reschedules, overlay expiry, delayed
//! analysis) is a timer on one queue. Time is an explicit `Duration` since the
//! session started: the owner advances it and pops due timers one at a time,
//! so no two callbacks ever overlap.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

pub struct TimerQueue<E> {
    /// Keyed by (deadline, id): due order, ties broken by scheduling order.
    pending: BTreeMap<(Duration, u64), E>,
    deadlines: HashMap<u64, Duration>,
    next_id: u64,
}

impl<E> TimerQueue<E> {
    pub fn new() -> Self {
        Self {
            pending: BTreeMap::new(),
            deadlines: HashMap::new(),
            next_id: 0,
        }
    }

    pub fn schedule_at(&mut self, deadline: Duration, event: E) -> TimerId {
        let id = self.next_id;
        self.next_id += 1;
        self.pending.insert((deadline, id), event);
        self.deadlines.insert(id, deadline);
        TimerId(id)
    }

    /// Cancel a pending timer. Returns false if it already fired or was cancelled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        match self.deadlines.remove(&id.0) {
            Some(deadline) => self.pending.remove(&(deadline, id.0)).is_some(),
            None => false,
        }
    }

    pub fn is_pending(&self, id: TimerId) -> bool {
        self.deadlines.contains_key(&id.0)
    }

    pub fn deadline(&self, id: TimerId) -> Option<Duration> {
        self.deadlines.get(&id.0).copied()
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        self.pending.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Remove and return the earliest timer due at or before `now`.
    pub fn pop_due(&mut self, now: Duration) -> Option<(TimerId, E)> {
        let key = *self.pending.keys().next()?;
        if key.0 > now {
            return None;
        }
        let event = self.pending.remove(&key)?;
        self.deadlines.remove(&key.1);
        Some((TimerId(key.1), event))
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl<E> Default for TimerQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn pops_in_deadline_then_schedule_order() {
        let mut timers = TimerQueue::new();
        timers.schedule_at(ms(300), "c");
        timers.schedule_at(ms(100), "a");
        timers.schedule_at(ms(100), "b");

        assert_eq!(timers.next_deadline(), Some(ms(100)));
        assert_eq!(timers.pop_due(ms(50)), None);

        let fired: Vec<&str> = std::iter::from_fn(|| timers.pop_due(ms(1_000)))
            .map(|(_, e)| e)
            .collect();
        assert_eq!(fired, vec!["a", "b", "c"]);
        assert!(timers.is_empty());
    }

    #[test]
    fn cancel_is_idempotent() {
        let mut timers = TimerQueue::new();
        let id = timers.schedule_at(ms(10), ());
        assert!(timers.is_pending(id));
        assert!(timers.cancel(id));
        assert!(!timers.cancel(id));
        assert!(!timers.is_pending(id));
        assert_eq!(timers.pop_due(ms(100)), None);
    }

    #[test]
    fn fired_timers_cannot_be_cancelled() {
        let mut timers = TimerQueue::new();
        let id = timers.schedule_at(ms(0), 1u8);
        assert_eq!(timers.pop_due(ms(0)), Some((id, 1)));
        assert!(!timers.cancel(id));
    }
}
