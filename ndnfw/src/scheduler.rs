use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::{Duration, Instant};

use crate::pit::PitId;

/// An event the forwarder asked to be woken up for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    /// A PIT entry's expiry timer fired; run the Interest finalize pipeline
    PitExpiry(PitId),
}

/// Cancelable handle to a scheduled event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

/// Timer queue for the single-threaded forwarding loop. The loop sleeps
/// until [`Scheduler::next_deadline`] and then drains [`Scheduler::pop_due`].
///
/// Cancellation is lazy: a cancelled handle's heap slot stays behind and is
/// skipped when it surfaces.
#[derive(Debug, Default)]
pub struct Scheduler {
    queue: BinaryHeap<Reverse<(Instant, u64)>>,
    events: HashMap<u64, TimerEvent>,
    next_seq: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `event` to fire `delay` after `now`
    pub fn schedule(&mut self, now: Instant, delay: Duration, event: TimerEvent) -> TimerHandle {
        let seq = self.next_seq;
        self.next_seq += 1;

        self.queue.push(Reverse((now + delay, seq)));
        self.events.insert(seq, event);
        TimerHandle(seq)
    }

    /// Cancel a previously scheduled event. Cancelling twice is harmless.
    pub fn cancel(&mut self, handle: TimerHandle) {
        self.events.remove(&handle.0);
    }

    /// Earliest live deadline, if any
    pub fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(Reverse((deadline, seq))) = self.queue.peek().copied() {
            if self.events.contains_key(&seq) {
                return Some(deadline);
            }
            self.queue.pop();
        }
        None
    }

    /// Pop the next event whose deadline has passed
    pub fn pop_due(&mut self, now: Instant) -> Option<TimerEvent> {
        while let Some(Reverse((deadline, seq))) = self.queue.peek().copied() {
            if deadline > now {
                return None;
            }
            self.queue.pop();
            if let Some(event) = self.events.remove(&seq) {
                return Some(event);
            }
        }
        None
    }

    /// Number of live (uncancelled) events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_in_deadline_order() {
        let mut scheduler = Scheduler::new();
        let now = Instant::now();

        scheduler.schedule(now, Duration::from_millis(20), TimerEvent::PitExpiry(PitId(2)));
        scheduler.schedule(now, Duration::from_millis(10), TimerEvent::PitExpiry(PitId(1)));

        let later = now + Duration::from_millis(30);
        assert_eq!(scheduler.pop_due(later), Some(TimerEvent::PitExpiry(PitId(1))));
        assert_eq!(scheduler.pop_due(later), Some(TimerEvent::PitExpiry(PitId(2))));
        assert_eq!(scheduler.pop_due(later), None);
    }

    #[test]
    fn test_not_due_yet() {
        let mut scheduler = Scheduler::new();
        let now = Instant::now();

        scheduler.schedule(now, Duration::from_secs(1), TimerEvent::PitExpiry(PitId(1)));
        assert_eq!(scheduler.pop_due(now), None);
        assert_eq!(scheduler.next_deadline(), Some(now + Duration::from_secs(1)));
    }

    #[test]
    fn test_zero_delay_fires_immediately() {
        let mut scheduler = Scheduler::new();
        let now = Instant::now();

        scheduler.schedule(now, Duration::ZERO, TimerEvent::PitExpiry(PitId(7)));
        assert_eq!(scheduler.pop_due(now), Some(TimerEvent::PitExpiry(PitId(7))));
    }

    #[test]
    fn test_cancel() {
        let mut scheduler = Scheduler::new();
        let now = Instant::now();

        let handle = scheduler.schedule(now, Duration::ZERO, TimerEvent::PitExpiry(PitId(1)));
        scheduler.schedule(now, Duration::from_millis(5), TimerEvent::PitExpiry(PitId(2)));
        scheduler.cancel(handle);
        scheduler.cancel(handle);

        let later = now + Duration::from_millis(10);
        assert_eq!(scheduler.next_deadline(), Some(now + Duration::from_millis(5)));
        assert_eq!(scheduler.pop_due(later), Some(TimerEvent::PitExpiry(PitId(2))));
        assert!(scheduler.is_empty());
    }
}
