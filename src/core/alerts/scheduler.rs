// Deadline-ordered timer queue with cancellable handles.
//
// The queue never fires anything by itself: the owner asks for due timers
// with `pop_due` from its own loop, so callbacks never run concurrently.

use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

#[derive(Debug)]
pub struct FadeScheduler<T> {
    next_handle: u64,
    queue: BTreeMap<(Instant, TimerHandle), T>,
    deadlines: HashMap<TimerHandle, Instant>,
}

impl<T> Default for FadeScheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FadeScheduler<T> {
    pub fn new() -> Self {
        Self {
            next_handle: 0,
            queue: BTreeMap::new(),
            deadlines: HashMap::new(),
        }
    }

    pub fn schedule(&mut self, at: Instant, payload: T) -> TimerHandle {
        self.next_handle += 1;
        let handle = TimerHandle(self.next_handle);
        self.queue.insert((at, handle), payload);
        self.deadlines.insert(handle, at);
        handle
    }

    /// Drop a pending timer. Returns its payload if it had not fired yet.
    pub fn cancel(&mut self, handle: TimerHandle) -> Option<T> {
        let at = self.deadlines.remove(&handle)?;
        self.queue.remove(&(at, handle))
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.queue.keys().next().map(|(at, _)| *at)
    }

    /// Take the earliest timer whose deadline is at or before `now`.
    /// Timers with equal deadlines come out in scheduling order.
    pub fn pop_due(&mut self, now: Instant) -> Option<(TimerHandle, T)> {
        let key = *self.queue.keys().next()?;
        if key.0 > now {
            return None;
        }
        let payload = self.queue.remove(&key)?;
        self.deadlines.remove(&key.1);
        Some((key.1, payload))
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
