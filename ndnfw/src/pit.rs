use std::any::Any;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use log::debug;
use ndnfw_core::{Data, FaceId, Interest, NackReason, Name};

use crate::name_tree::NameTree;
use crate::scheduler::TimerHandle;

/// Identifier of a PIT entry, stable for the entry's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PitId(pub u64);

/// Downstream state: the last Interest received from a face
#[derive(Debug, Clone)]
pub struct InRecord {
    pub face: FaceId,
    pub interest: Interest,
    pub last_nonce: u32,
    pub last_renewed: Instant,
    pub expiry: Instant,
}

/// Upstream state: the last Interest forwarded to a face
#[derive(Debug, Clone)]
pub struct OutRecord {
    pub face: FaceId,
    pub last_nonce: u32,
    pub last_renewed: Instant,
    pub expiry: Instant,
    /// Reason of a Nack received from this upstream, if any
    pub incoming_nack: Option<NackReason>,
}

/// Key identifying a PIT entry: the name plus the selector fields the
/// Interest model carries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PitKey {
    name: Name,
    can_be_prefix: bool,
    must_be_fresh: bool,
}

impl PitKey {
    fn of(interest: &Interest) -> Self {
        Self {
            name: interest.name.clone(),
            can_be_prefix: interest.can_be_prefix,
            must_be_fresh: interest.must_be_fresh,
        }
    }
}

/// A pending Interest: in-records per downstream face, out-records per
/// upstream face, satisfaction state and the expiry timer handle.
pub struct Entry {
    key: PitKey,
    /// Representative Interest (the one that created the entry)
    interest: Interest,
    in_records: HashMap<FaceId, InRecord>,
    out_records: HashMap<FaceId, OutRecord>,
    pub is_satisfied: bool,
    pub data_freshness_period: Option<Duration>,
    pub expiry_timer: Option<TimerHandle>,
    /// Opaque scratch state owned by the effective strategy
    pub strategy_state: Option<Box<dyn Any + Send>>,
}

impl Entry {
    pub fn name(&self) -> &Name {
        &self.key.name
    }

    pub fn interest(&self) -> &Interest {
        &self.interest
    }

    pub fn can_match_data(&self, data: &Data) -> bool {
        self.interest.matches_data(data)
    }

    pub fn has_in_records(&self) -> bool {
        !self.in_records.is_empty()
    }

    pub fn has_out_records(&self) -> bool {
        !self.out_records.is_empty()
    }

    pub fn in_records(&self) -> impl Iterator<Item = &InRecord> {
        self.in_records.values()
    }

    pub fn out_records(&self) -> impl Iterator<Item = &OutRecord> {
        self.out_records.values()
    }

    pub fn find_in_record(&self, face: FaceId) -> Option<&InRecord> {
        self.in_records.get(&face)
    }

    pub fn find_out_record(&self, face: FaceId) -> Option<&OutRecord> {
        self.out_records.get(&face)
    }

    pub fn find_out_record_mut(&mut self, face: FaceId) -> Option<&mut OutRecord> {
        self.out_records.get_mut(&face)
    }

    /// Upsert the in-record for `face`; at most one per face
    pub fn insert_or_update_in_record(&mut self, face: FaceId, interest: &Interest, now: Instant) {
        let expiry = now + interest.lifetime();
        let nonce = interest.nonce.unwrap_or_default();
        self.in_records
            .entry(face)
            .and_modify(|record| {
                record.interest = interest.clone();
                record.last_nonce = nonce;
                record.last_renewed = now;
                record.expiry = expiry;
            })
            .or_insert_with(|| InRecord {
                face,
                interest: interest.clone(),
                last_nonce: nonce,
                last_renewed: now,
                expiry,
            });
    }

    /// Upsert the out-record for `face`; at most one per face. Clears any
    /// previously recorded Nack.
    pub fn insert_or_update_out_record(&mut self, face: FaceId, interest: &Interest, now: Instant) {
        let expiry = now + interest.lifetime();
        let nonce = interest.nonce.unwrap_or_default();
        self.out_records
            .entry(face)
            .and_modify(|record| {
                record.last_nonce = nonce;
                record.last_renewed = now;
                record.expiry = expiry;
                record.incoming_nack = None;
            })
            .or_insert_with(|| OutRecord {
                face,
                last_nonce: nonce,
                last_renewed: now,
                expiry,
                incoming_nack: None,
            });
    }

    pub fn delete_in_record(&mut self, face: FaceId) {
        self.in_records.remove(&face);
    }

    pub fn delete_out_record(&mut self, face: FaceId) {
        self.out_records.remove(&face);
    }

    pub fn clear_in_records(&mut self) {
        self.in_records.clear();
    }

    /// Latest in-record expiry, used to arm the entry's expiry timer
    pub fn last_in_record_expiry(&self) -> Option<Instant> {
        self.in_records.values().map(|r| r.expiry).max()
    }
}

/// Pending Interest Table
#[derive(Default)]
pub struct Pit {
    entries: HashMap<PitId, Entry>,
    index: HashMap<PitKey, PitId>,
    next_id: u64,
}

impl Pit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the entry for (name, selectors), creating it if absent.
    /// The second element is true when the entry was created.
    pub fn insert(&mut self, tree: &mut NameTree, interest: &Interest) -> (PitId, bool) {
        let key = PitKey::of(interest);
        if let Some(&id) = self.index.get(&key) {
            return (id, false);
        }

        let id = PitId(self.next_id);
        self.next_id += 1;

        let entry = Entry {
            key: key.clone(),
            interest: interest.clone(),
            in_records: HashMap::new(),
            out_records: HashMap::new(),
            is_satisfied: false,
            data_freshness_period: None,
            expiry_timer: None,
            strategy_state: None,
        };
        self.entries.insert(id, entry);
        self.index.insert(key, id);
        tree.attach_pit_entry(&interest.name, id);
        debug!("pit insert {}", interest.name);
        (id, true)
    }

    /// Equality lookup by (name, selectors)
    pub fn find(&self, interest: &Interest) -> Option<PitId> {
        self.index.get(&PitKey::of(interest)).copied()
    }

    pub fn entry(&self, id: PitId) -> Option<&Entry> {
        self.entries.get(&id)
    }

    pub fn entry_mut(&mut self, id: PitId) -> Option<&mut Entry> {
        self.entries.get_mut(&id)
    }

    /// All entries whose name equals or is a prefix of `data.name` and whose
    /// selectors the Data satisfies.
    pub fn find_all_data_matches(&self, tree: &NameTree, data: &Data) -> Vec<PitId> {
        let mut matches = Vec::new();
        for depth in 0..=data.name.len() {
            let prefix = data.name.get_prefix(depth);
            for &id in tree.pit_entries_at(&prefix) {
                if let Some(entry) = self.entries.get(&id) {
                    if entry.can_match_data(data) {
                        matches.push(id);
                    }
                }
            }
        }
        matches
    }

    /// Detach the entry from its name tree node and drop it
    pub fn erase(&mut self, tree: &mut NameTree, id: PitId) {
        if let Some(entry) = self.entries.remove(&id) {
            self.index.remove(&entry.key);
            tree.detach_pit_entry(&entry.key.name, id);
            tree.cleanup(&entry.key.name);
            debug!("pit erase {}", entry.key.name);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> Vec<PitId> {
        self.entries.keys().copied().collect()
    }
}
