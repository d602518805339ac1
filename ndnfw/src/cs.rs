use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

use log::debug;
use ndnfw_core::{Data, Interest, Name};

/// A cached Data packet
#[derive(Debug, Clone)]
pub struct CsEntry {
    pub data: Data,
    /// Cached without a matching PIT entry
    pub unsolicited: bool,
    /// Instant the Data stops being fresh
    pub stale_at: Instant,
    pub cached_at: Instant,
    pub hit_count: u64,
}

impl CsEntry {
    pub fn is_fresh(&self, now: Instant) -> bool {
        now < self.stale_at
    }
}

/// Content Store: capacity-bounded cache of recently observed Data with LRU
/// eviction. Keyed by name in sequence-lexicographic order so prefix lookups
/// are a range scan.
#[derive(Debug)]
pub struct ContentStore {
    entries: BTreeMap<Name, CsEntry>,
    lru_queue: VecDeque<Name>,
    capacity: usize,
    n_hits: u64,
    n_misses: u64,
}

impl ContentStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            lru_queue: VecDeque::new(),
            capacity: capacity.max(1),
            n_hits: 0,
            n_misses: 0,
        }
    }

    /// Insert a Data packet, evicting the least recently used entries when
    /// over capacity.
    pub fn insert(&mut self, data: Data, unsolicited: bool, now: Instant) {
        let name = data.name.clone();
        let stale_at = match data.freshness_period {
            Some(freshness) if !freshness.is_zero() => now + freshness,
            _ => now, // immediately non-fresh
        };

        if let Some(pos) = self.lru_queue.iter().position(|n| n == &name) {
            self.lru_queue.remove(pos);
        }
        self.lru_queue.push_front(name.clone());

        self.entries.insert(
            name.clone(),
            CsEntry {
                data,
                unsolicited,
                stale_at,
                cached_at: now,
                hit_count: 0,
            },
        );
        debug!("cs insert {} (size: {})", name, self.entries.len());

        while self.entries.len() > self.capacity {
            match self.lru_queue.pop_back() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                    debug!("cs evict {}", oldest);
                }
                None => break,
            }
        }
    }

    /// Look up a Data packet matching `interest`. Exactly one of hit or miss
    /// happens per call; the pipeline treats the returned value as the hit
    /// callback's argument.
    pub fn find(&mut self, interest: &Interest, now: Instant) -> Option<Data> {
        let found = if interest.can_be_prefix {
            self.entries
                .range(interest.name.clone()..)
                .take_while(|(name, _)| interest.name.is_prefix_of(name))
                .find(|(_, entry)| !interest.must_be_fresh || entry.is_fresh(now))
                .map(|(name, _)| name.clone())
        } else {
            match self.entries.get(&interest.name) {
                Some(entry) if !interest.must_be_fresh || entry.is_fresh(now) => {
                    Some(interest.name.clone())
                }
                _ => None,
            }
        };

        match found {
            Some(name) => {
                if let Some(pos) = self.lru_queue.iter().position(|n| n == &name) {
                    if let Some(bumped) = self.lru_queue.remove(pos) {
                        self.lru_queue.push_front(bumped);
                    }
                }
                self.n_hits += 1;
                self.entries.get_mut(&name).map(|entry| {
                    entry.hit_count += 1;
                    debug!("cs hit {} (hits: {})", name, entry.hit_count);
                    entry.data.clone()
                })
            }
            None => {
                self.n_misses += 1;
                debug!("cs miss {}", interest.name);
                None
            }
        }
    }

    /// Drop entries whose freshness lapsed more than `grace` ago. Periodic
    /// housekeeping; staleness itself only affects must-be-fresh lookups.
    pub fn evict_stale(&mut self, now: Instant, grace: Duration) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.stale_at + grace > now);
        self.lru_queue
            .retain(|name| self.entries.contains_key(name));
        before - self.entries.len()
    }

    pub fn contains(&self, name: &Name) -> bool {
        self.entries.contains_key(name)
    }

    pub fn get(&self, name: &Name) -> Option<&CsEntry> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn hits(&self) -> u64 {
        self.n_hits
    }

    pub fn misses(&self) -> u64 {
        self.n_misses
    }
}
