use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use log::debug;
use ndnfw_core::Name;

/// Default retention window
pub const DEFAULT_LIFETIME: Duration = Duration::from_secs(6);

const INITIAL_CAPACITY: usize = 1 << 10;
const MIN_CAPACITY: usize = 1 << 7;
const MAX_CAPACITY: usize = 1 << 20;
/// Insertions between capacity re-evaluations
const ADJUST_INTERVAL: u64 = 1024;

/// Dead Nonce List: a bounded FIFO set of (name, nonce) pairs used to detect
/// Interest loops after the PIT entry is gone.
///
/// Memory stays bounded independently of the Interest rate: when the queue
/// exceeds its capacity the oldest pairs are evicted even if younger than
/// the lifetime, and the capacity is periodically re-sized toward keeping
/// actual retention close to the configured lifetime.
#[derive(Debug)]
pub struct DeadNonceList {
    queue: VecDeque<(Name, u32, Instant)>,
    index: HashMap<(Name, u32), u32>,
    lifetime: Duration,
    capacity: usize,
    inserts_since_adjust: u64,
    capacity_evictions_since_adjust: u64,
}

impl DeadNonceList {
    pub fn new(lifetime: Duration) -> Self {
        Self {
            queue: VecDeque::new(),
            index: HashMap::new(),
            lifetime,
            capacity: INITIAL_CAPACITY,
            inserts_since_adjust: 0,
            capacity_evictions_since_adjust: 0,
        }
    }

    /// Target retention window
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Record (name, nonce)
    pub fn add(&mut self, name: Name, nonce: u32, now: Instant) {
        self.evict_expired(now);

        *self.index.entry((name.clone(), nonce)).or_insert(0) += 1;
        self.queue.push_back((name, nonce, now));

        while self.queue.len() > self.capacity {
            if let Some((name, nonce, added_at)) = self.queue.pop_front() {
                self.unindex(name, nonce);
                if now.duration_since(added_at) < self.lifetime {
                    self.capacity_evictions_since_adjust += 1;
                }
            }
        }

        self.inserts_since_adjust += 1;
        if self.inserts_since_adjust >= ADJUST_INTERVAL {
            self.adjust_capacity();
        }
    }

    /// Is (name, nonce) recorded?
    pub fn has(&self, name: &Name, nonce: u32) -> bool {
        self.index.contains_key(&(name.clone(), nonce))
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn evict_expired(&mut self, now: Instant) {
        while let Some((_, _, added_at)) = self.queue.front() {
            if now.duration_since(*added_at) < self.lifetime {
                break;
            }
            if let Some((name, nonce, _)) = self.queue.pop_front() {
                self.unindex(name, nonce);
            }
        }
    }

    fn unindex(&mut self, name: Name, nonce: u32) {
        let key = (name, nonce);
        if let Some(count) = self.index.get_mut(&key) {
            *count -= 1;
            if *count == 0 {
                self.index.remove(&key);
            }
        }
    }

    /// Grow when entries younger than the lifetime had to be evicted for
    /// capacity; shrink when the queue sits far below capacity.
    fn adjust_capacity(&mut self) {
        if self.capacity_evictions_since_adjust > 0 {
            self.capacity = (self.capacity * 2).min(MAX_CAPACITY);
            debug!("dnl capacity grown to {}", self.capacity);
        } else if self.queue.len() < self.capacity / 4 {
            self.capacity = (self.capacity / 2).max(MIN_CAPACITY);
            debug!("dnl capacity shrunk to {}", self.capacity);
            while self.queue.len() > self.capacity {
                if let Some((name, nonce, _)) = self.queue.pop_front() {
                    self.unindex(name, nonce);
                }
            }
        }
        self.inserts_since_adjust = 0;
        self.capacity_evictions_since_adjust = 0;
    }
}

impl Default for DeadNonceList {
    fn default() -> Self {
        Self::new(DEFAULT_LIFETIME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_has() {
        let mut dnl = DeadNonceList::default();
        let now = Instant::now();
        let name = Name::from_uri("/a/b");

        assert!(!dnl.has(&name, 1));
        dnl.add(name.clone(), 1, now);
        assert!(dnl.has(&name, 1));
        assert!(!dnl.has(&name, 2));
        assert!(!dnl.has(&Name::from_uri("/a"), 1));
    }

    #[test]
    fn test_lifetime_eviction() {
        let mut dnl = DeadNonceList::new(Duration::from_secs(1));
        let now = Instant::now();
        let name = Name::from_uri("/a");

        dnl.add(name.clone(), 1, now);
        dnl.add(name.clone(), 2, now + Duration::from_secs(2));

        assert!(!dnl.has(&name, 1));
        assert!(dnl.has(&name, 2));
    }

    #[test]
    fn test_capacity_bound_and_growth() {
        let mut dnl = DeadNonceList::default();
        let now = Instant::now();
        let initial_capacity = dnl.capacity();
        let name = Name::from_uri("/a");

        for nonce in 0..(initial_capacity as u32 + ADJUST_INTERVAL as u32) {
            dnl.add(name.clone(), nonce, now);
        }

        // the queue never exceeds the configured bound in force at the time
        assert!(dnl.len() <= dnl.capacity());
        // young entries were capacity-evicted, so the window grew
        assert!(dnl.capacity() > initial_capacity);
        // the oldest nonces are gone even though they are younger than
        // the lifetime
        assert!(!dnl.has(&name, 0));
    }

    #[test]
    fn test_duplicate_pair_survives_partial_eviction() {
        let mut dnl = DeadNonceList::new(Duration::from_secs(10));
        let now = Instant::now();
        let name = Name::from_uri("/a");

        dnl.add(name.clone(), 1, now);
        dnl.add(name.clone(), 1, now + Duration::from_secs(1));
        assert_eq!(dnl.len(), 2);
        assert!(dnl.has(&name, 1));
    }
}
