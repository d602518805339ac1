use std::any::Any;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use ndnfw_core::Name;

/// How long an entry lives past its last lifetime extension
pub const DEFAULT_ENTRY_LIFETIME: Duration = Duration::from_secs(16);

/// A measurements entry: per-name scratch storage for strategies
#[derive(Default)]
pub struct Entry {
    expiry: Option<Instant>,
    strategy_info: Option<Box<dyn Any + Send>>,
}

impl Entry {
    pub fn get_strategy_info<T: 'static>(&self) -> Option<&T> {
        self.strategy_info.as_ref().and_then(|b| b.downcast_ref())
    }

    pub fn get_strategy_info_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.strategy_info.as_mut().and_then(|b| b.downcast_mut())
    }

    pub fn set_strategy_info<T: Send + 'static>(&mut self, info: T) {
        self.strategy_info = Some(Box::new(info));
    }
}

/// Measurements table: name-keyed entries with extendable lifetimes,
/// pruned lazily on access.
#[derive(Default)]
pub struct Measurements {
    entries: HashMap<Name, Entry>,
}

impl Measurements {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find or create the entry for `name` and extend its lifetime
    pub fn lookup(&mut self, name: &Name, now: Instant) -> &mut Entry {
        let entry = self.entries.entry(name.clone()).or_default();
        let proposed = now + DEFAULT_ENTRY_LIFETIME;
        if entry.expiry.map_or(true, |expiry| expiry < proposed) {
            entry.expiry = Some(proposed);
        }
        entry
    }

    /// Find the entry for `name` without creating or extending it
    pub fn find(&self, name: &Name, now: Instant) -> Option<&Entry> {
        self.entries
            .get(name)
            .filter(|entry| entry.expiry.map_or(false, |expiry| expiry > now))
    }

    /// Drop expired entries
    pub fn prune(&mut self, now: Instant) {
        self.entries
            .retain(|_, entry| entry.expiry.map_or(false, |expiry| expiry > now));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
