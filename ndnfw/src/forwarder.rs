use std::collections::{BTreeSet, VecDeque};
use std::time::{Duration, Instant};

use log::{debug, warn};
use ndnfw_core::{Data, FaceId, Interest, Nack, NackReason, Name};
use tokio::sync::mpsc;

use crate::algorithm::{self, duplicate_nonce};
use crate::cs::ContentStore;
use crate::dead_nonce_list::{self, DeadNonceList};
use crate::face::{FaceEvent, FaceMessage, FaceScope, FaceTable, LinkType};
use crate::fib::{Fib, NextHop};
use crate::measurements::Measurements;
use crate::name_tree::NameTree;
use crate::pit::{Pit, PitId};
use crate::region::NetworkRegionTable;
use crate::scheduler::{Scheduler, TimerEvent};
use crate::strategy::StrategyChoice;

/// How long past its freshness deadline cached Data may linger before the
/// periodic cleanup drops it
const CS_STALE_GRACE: Duration = Duration::from_secs(60);

/// Forwarder-wide packet counters
#[derive(Debug, Default, Clone, Copy)]
pub struct ForwarderCounters {
    pub n_in_interests: u64,
    pub n_out_interests: u64,
    pub n_in_data: u64,
    pub n_out_data: u64,
    pub n_in_nacks: u64,
    pub n_out_nacks: u64,
    pub n_cs_hits: u64,
    pub n_cs_misses: u64,
    pub n_satisfied_interests: u64,
    pub n_unsatisfied_interests: u64,
    pub n_unsolicited_data: u64,
}

/// Forwarder configuration (the `forwarder` config file section)
#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    /// Hop limit attached to Interests that carry none; 0 means "do not set"
    pub default_hop_limit: u8,
    /// Content store capacity, in packets
    pub cs_capacity: usize,
    /// Dead nonce list retention window
    pub dnl_lifetime: Duration,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            default_hop_limit: 0,
            cs_capacity: 65536,
            dnl_lifetime: dead_nonce_list::DEFAULT_LIFETIME,
        }
    }
}

/// What to do with Data that matched no PIT entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsolicitedDataPolicy {
    /// Never cache unsolicited Data
    DropAll,
    /// Cache unsolicited Data from local faces
    AdmitLocal,
    /// Cache unsolicited Data from non-local faces
    AdmitNetwork,
    /// Cache all unsolicited Data
    AdmitAll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsolicitedDataDecision {
    Drop,
    Cache,
}

impl UnsolicitedDataPolicy {
    pub fn decide(self, ingress_scope: FaceScope) -> UnsolicitedDataDecision {
        let cache = match self {
            UnsolicitedDataPolicy::DropAll => false,
            UnsolicitedDataPolicy::AdmitLocal => ingress_scope == FaceScope::Local,
            UnsolicitedDataPolicy::AdmitNetwork => ingress_scope == FaceScope::NonLocal,
            UnsolicitedDataPolicy::AdmitAll => true,
        };
        if cache {
            UnsolicitedDataDecision::Cache
        } else {
            UnsolicitedDataDecision::Drop
        }
    }
}

/// Work queued by an outgoing pipeline and dispatched after the current
/// pipeline step finishes, so a strategy hook is never entered from within
/// another hook.
#[derive(Debug)]
pub enum PendingEvent {
    DroppedInterest { face: FaceId, interest: Interest },
}

/// The forwarder's tables, counters and outgoing pipelines. This is what
/// strategy hooks receive: everything except the strategies themselves.
pub struct Forwarder {
    pub faces: FaceTable,
    pub name_tree: NameTree,
    pub fib: Fib,
    pub pit: Pit,
    pub cs: ContentStore,
    pub dnl: DeadNonceList,
    pub measurements: Measurements,
    pub regions: NetworkRegionTable,
    pub scheduler: Scheduler,
    pub counters: ForwarderCounters,
    pub config: ForwarderConfig,
    pub unsolicited_policy: UnsolicitedDataPolicy,
    pending: VecDeque<PendingEvent>,
}

impl Forwarder {
    pub fn new(config: ForwarderConfig) -> Self {
        Self {
            faces: FaceTable::new(),
            name_tree: NameTree::new(),
            fib: Fib::new(),
            pit: Pit::new(),
            cs: ContentStore::new(config.cs_capacity),
            dnl: DeadNonceList::new(config.dnl_lifetime),
            measurements: Measurements::new(),
            regions: NetworkRegionTable::new(),
            scheduler: Scheduler::new(),
            counters: ForwarderCounters::default(),
            config,
            unsolicited_policy: UnsolicitedDataPolicy::DropAll,
            pending: VecDeque::new(),
        }
    }

    pub(crate) fn take_pending(&mut self) -> Option<PendingEvent> {
        self.pending.pop_front()
    }

    /// Outgoing Interest pipeline. Returns true when the Interest was handed
    /// to the face.
    pub fn send_interest(
        &mut self,
        pit_id: PitId,
        egress: FaceId,
        interest: &Interest,
        now: Instant,
    ) -> bool {
        let egress_scope = match self.faces.get(egress) {
            Some(face) => face.scope(),
            None => {
                warn!("outgoing interest out=(unknown {}) name={}", egress, interest.name);
                return false;
            }
        };

        if interest.hop_limit == Some(0) && egress_scope == FaceScope::NonLocal {
            debug!(
                "outgoing interest out={} name={} non-local hop-limit=0",
                egress, interest.name
            );
            if let Some(face) = self.faces.get_mut(egress) {
                face.counters.n_out_hop_limit_zero += 1;
            }
            return false;
        }

        match self.pit.entry_mut(pit_id) {
            Some(entry) => entry.insert_or_update_out_record(egress, interest, now),
            None => return false,
        }

        debug!(
            "outgoing interest out={} name={} nonce={:?}",
            egress, interest.name, interest.nonce
        );
        if let Some(face) = self.faces.get_mut(egress) {
            if face.send(FaceMessage::Interest(interest.clone())).is_err() {
                self.pending.push_back(PendingEvent::DroppedInterest {
                    face: egress,
                    interest: interest.clone(),
                });
            }
        }
        self.counters.n_out_interests += 1;
        true
    }

    /// Outgoing Data pipeline
    pub fn send_data(&mut self, data: &Data, egress: FaceId) -> bool {
        if !egress.is_valid() {
            warn!("outgoing data out=(invalid) name={}", data.name);
            return false;
        }
        let egress_scope = match self.faces.get(egress) {
            Some(face) => face.scope(),
            None => {
                warn!("outgoing data out=(unknown {}) name={}", egress, data.name);
                return false;
            }
        };

        if egress_scope == FaceScope::NonLocal && algorithm::is_localhost_scoped(&data.name) {
            debug!("outgoing data out={} name={} violates /localhost", egress, data.name);
            return false;
        }

        debug!("outgoing data out={} name={}", egress, data.name);
        if let Some(face) = self.faces.get_mut(egress) {
            let _ = face.send(FaceMessage::Data(data.clone()));
        }
        self.counters.n_out_data += 1;
        true
    }

    /// Send Data to every downstream with a live in-record, except the face
    /// it arrived on (unless that face is ad-hoc).
    pub fn send_data_to_all(&mut self, pit_id: PitId, ingress: FaceId, data: &Data, now: Instant) {
        let ingress_is_ad_hoc = self
            .faces
            .get(ingress)
            .map(|f| f.link_type() == LinkType::AdHoc)
            .unwrap_or(false);

        let downstreams: Vec<FaceId> = match self.pit.entry(pit_id) {
            Some(entry) => entry
                .in_records()
                .filter(|r| r.expiry > now && (r.face != ingress || ingress_is_ad_hoc))
                .map(|r| r.face)
                .collect(),
            None => return,
        };

        for face in downstreams {
            self.send_data(data, face);
        }
    }

    /// Outgoing Nack pipeline: answer the pending Interest of `egress`'s
    /// in-record with a Nack and consume the in-record.
    pub fn send_nack(&mut self, pit_id: PitId, egress: FaceId, reason: NackReason) -> bool {
        let link_type = match self.faces.get(egress) {
            Some(face) => face.link_type(),
            None => {
                warn!("outgoing nack out=(unknown {}) reason={}", egress, reason);
                return false;
            }
        };

        let interest = match self.pit.entry(pit_id).and_then(|e| e.find_in_record(egress)) {
            Some(record) => record.interest.clone(),
            None => {
                debug!("outgoing nack out={} reason={} no-in-record", egress, reason);
                return false;
            }
        };

        if link_type != LinkType::PointToPoint {
            debug!(
                "outgoing nack out={} reason={} link-type={:?}",
                egress, reason, link_type
            );
            return false;
        }

        if let Some(entry) = self.pit.entry_mut(pit_id) {
            entry.delete_in_record(egress);
        }

        debug!("outgoing nack out={} name={} reason={}", egress, interest.name, reason);
        let nack = Nack::new(interest, reason);
        if let Some(face) = self.faces.get_mut(egress) {
            let _ = face.send(FaceMessage::Nack(nack));
        }
        self.counters.n_out_nacks += 1;
        true
    }

    /// Send a Nack to every downstream with an in-record
    pub fn send_nack_to_all(&mut self, pit_id: PitId, reason: NackReason) {
        let downstreams: Vec<FaceId> = match self.pit.entry(pit_id) {
            Some(entry) => entry.in_records().map(|r| r.face).collect(),
            None => return,
        };
        for face in downstreams {
            self.send_nack(pit_id, face, reason);
        }
    }

    /// Nack an Interest directly on a face, outside any PIT entry. Used for
    /// loop handling, where the looping Interest never joined the entry.
    pub fn send_nack_direct(&mut self, egress: FaceId, interest: &Interest, reason: NackReason) {
        debug!("outgoing nack out={} name={} reason={}", egress, interest.name, reason);
        if let Some(face) = self.faces.get_mut(egress) {
            let _ = face.send(FaceMessage::Nack(Nack::new(interest.clone(), reason)));
            self.counters.n_out_nacks += 1;
        }
    }

    /// (Re-)arm the entry's expiry timer; each entry owns at most one
    pub fn set_expiry_timer(&mut self, pit_id: PitId, delay: Duration, now: Instant) {
        let previous = match self.pit.entry_mut(pit_id) {
            Some(entry) => entry.expiry_timer.take(),
            None => return,
        };
        if let Some(handle) = previous {
            self.scheduler.cancel(handle);
        }
        let handle = self.scheduler.schedule(now, delay, TimerEvent::PitExpiry(pit_id));
        if let Some(entry) = self.pit.entry_mut(pit_id) {
            entry.expiry_timer = Some(handle);
        }
    }

    /// Record the entry's outgoing nonces in the dead nonce list if losing
    /// the entry would lose loop detection: always when unsatisfied; when
    /// satisfied only if the Interest demanded fresh Data whose freshness
    /// undercuts the list's lifetime. With `upstream` set, only that
    /// out-record's nonce is recorded.
    pub fn insert_dead_nonce_list(&mut self, pit_id: PitId, upstream: Option<FaceId>, now: Instant) {
        let entry = match self.pit.entry(pit_id) {
            Some(entry) => entry,
            None => return,
        };

        let need = if entry.is_satisfied {
            entry.interest().must_be_fresh
                && entry.data_freshness_period.unwrap_or(Duration::ZERO) < self.dnl.lifetime()
        } else {
            true
        };
        if !need {
            return;
        }

        let name = entry.name().clone();
        let nonces: Vec<u32> = match upstream {
            None => entry.out_records().map(|r| r.last_nonce).collect(),
            Some(face) => entry
                .find_out_record(face)
                .map(|r| vec![r.last_nonce])
                .unwrap_or_default(),
        };
        for nonce in nonces {
            self.dnl.add(name.clone(), nonce, now);
        }
    }

    /// Interest finalize pipeline: runs when the entry's expiry timer fires
    pub fn on_interest_finalize(&mut self, pit_id: PitId, now: Instant) {
        let (name, satisfied) = match self.pit.entry(pit_id) {
            Some(entry) => (entry.name().clone(), entry.is_satisfied),
            None => return,
        };
        debug!(
            "interest finalize name={} {}",
            name,
            if satisfied { "satisfied" } else { "unsatisfied" }
        );

        self.insert_dead_nonce_list(pit_id, None, now);

        if satisfied {
            self.counters.n_satisfied_interests += 1;
        } else {
            self.counters.n_unsatisfied_interests += 1;
        }

        if let Some(entry) = self.pit.entry_mut(pit_id) {
            if let Some(handle) = entry.expiry_timer.take() {
                self.scheduler.cancel(handle);
            }
        }
        self.pit.erase(&mut self.name_tree, pit_id);
    }

    /// Delete every PIT in/out-record referencing `face` and purge it from
    /// the FIB, erasing entries left without next hops.
    pub fn cleanup_on_face_removal(&mut self, face: FaceId) {
        for pit_id in self.pit.ids() {
            if let Some(entry) = self.pit.entry_mut(pit_id) {
                entry.delete_in_record(face);
                entry.delete_out_record(face);
            }
        }
        self.fib.remove_face_everywhere(&mut self.name_tree, face);
    }
}

/// The complete forwarding engine: the forwarder plus its strategies, and
/// the incoming pipelines that dispatch between them.
pub struct ForwardingEngine {
    strategies: StrategyChoice,
    fw: Forwarder,
}

impl ForwardingEngine {
    pub fn new(config: ForwarderConfig) -> Self {
        Self {
            strategies: StrategyChoice::new(),
            fw: Forwarder::new(config),
        }
    }

    pub fn forwarder(&self) -> &Forwarder {
        &self.fw
    }

    pub fn forwarder_mut(&mut self) -> &mut Forwarder {
        &mut self.fw
    }

    pub fn strategies_mut(&mut self) -> &mut StrategyChoice {
        &mut self.strategies
    }

    /// Register a face; the transport adapter drains `tx`'s receiving end
    pub fn add_face(
        &mut self,
        scope: FaceScope,
        link_type: LinkType,
        tx: mpsc::UnboundedSender<(FaceId, FaceMessage)>,
    ) -> FaceId {
        self.fw.faces.add(scope, link_type, tx)
    }

    /// Remove a face, cleaning every table reference to it first
    pub fn remove_face(&mut self, face: FaceId) {
        self.fw.cleanup_on_face_removal(face);
        self.fw.faces.remove(face);
    }

    /// Add a next hop for `prefix`, propagating new-next-hop to strategies
    /// of covered PIT entries.
    pub fn register_route(&mut self, prefix: &Name, face: FaceId, cost: u32, now: Instant) {
        let added = self
            .fw
            .fib
            .add_or_update_next_hop(&mut self.fw.name_tree, prefix, face, cost);
        if added {
            self.on_new_next_hop(prefix, NextHop { face, cost }, now);
            self.drain_pending(now);
        }
    }

    /// Remove a next hop for `prefix`, erasing the entry when empty
    pub fn unregister_route(&mut self, prefix: &Name, face: FaceId) {
        self.fw
            .fib
            .remove_next_hop(&mut self.fw.name_tree, prefix, face);
    }

    /// Dispatch one face event through the matching pipeline
    pub fn handle_face_event(&mut self, event: FaceEvent, now: Instant) {
        match event {
            FaceEvent::Interest { face, interest } => self.on_incoming_interest(interest, face, now),
            FaceEvent::Data { face, data } => self.on_incoming_data(data, face, now),
            FaceEvent::Nack { face, nack } => self.on_incoming_nack(nack, face, now),
            FaceEvent::DroppedInterest { face, interest } => {
                self.on_dropped_interest(&interest, face, now)
            }
        }
        self.drain_pending(now);
    }

    /// Run every due timer; the daemon loop calls this after waking up
    pub fn poll_timers(&mut self, now: Instant) {
        while let Some(event) = self.fw.scheduler.pop_due(now) {
            match event {
                TimerEvent::PitExpiry(pit_id) => self.fw.on_interest_finalize(pit_id, now),
            }
        }
        self.drain_pending(now);
    }

    /// Deadline the daemon loop should sleep until
    pub fn next_deadline(&mut self) -> Option<Instant> {
        self.fw.scheduler.next_deadline()
    }

    /// Periodic housekeeping: drop cached Data long past its freshness and
    /// expired measurements entries. Staleness only affects must-be-fresh
    /// lookups, so the grace period keeps recently stale Data servable.
    pub fn cleanup(&mut self, now: Instant) {
        let evicted = self.fw.cs.evict_stale(now, CS_STALE_GRACE);
        if evicted > 0 {
            debug!("cleanup evicted {} stale cs entries", evicted);
        }
        self.fw.measurements.prune(now);
    }

    /// Incoming Interest pipeline
    pub fn on_incoming_interest(&mut self, mut interest: Interest, ingress: FaceId, now: Instant) {
        let (ingress_scope, ingress_link) = match self.fw.faces.get(ingress) {
            Some(face) => (face.scope(), face.link_type()),
            None => return,
        };

        interest.tags.incoming_face_id = Some(ingress);
        self.fw.counters.n_in_interests += 1;
        if let Some(face) = self.fw.faces.get_mut(ingress) {
            face.counters.n_in_interests += 1;
        }

        let nonce = interest.ensure_nonce();

        // drop if hop limit is exhausted, decrement otherwise
        if let Some(hop_limit) = interest.hop_limit {
            debug!(
                "incoming interest in={} name={} nonce={} hop-limit={}",
                ingress, interest.name, nonce, hop_limit
            );
            if hop_limit == 0 {
                if let Some(face) = self.fw.faces.get_mut(ingress) {
                    face.counters.n_in_hop_limit_zero += 1;
                }
                return;
            }
            interest.hop_limit = Some(hop_limit - 1);
        } else {
            debug!(
                "incoming interest in={} name={} nonce={}",
                ingress, interest.name, nonce
            );
        }

        // /localhost scope control
        if ingress_scope == FaceScope::NonLocal && algorithm::is_localhost_scoped(&interest.name) {
            debug!(
                "incoming interest in={} name={} violates /localhost",
                ingress, interest.name
            );
            return;
        }

        // late loop detection across dead PIT entries
        if self.fw.dnl.has(&interest.name, nonce) {
            self.on_interest_loop(&interest, ingress, ingress_link, now);
            return;
        }

        // strip the forwarding hint once the producer region is reached
        if !interest.forwarding_hint.is_empty()
            && self.fw.regions.is_in_producer_region(&interest.forwarding_hint)
        {
            debug!(
                "incoming interest in={} name={} reaching producer region",
                ingress, interest.name
            );
            interest.forwarding_hint.clear();
        }

        let (pit_id, _) = self.fw.pit.insert(&mut self.fw.name_tree, &interest);

        // duplicate nonce within the entry; on p2p faces a duplicate from
        // the same incoming face is a retransmission, not a loop
        let mask = match self.fw.pit.entry(pit_id) {
            Some(entry) => algorithm::find_duplicate_nonce(entry, nonce, ingress),
            None => return,
        };
        let mut has_duplicate = mask != duplicate_nonce::NONE;
        if ingress_link == LinkType::PointToPoint && (mask & duplicate_nonce::IN_SAME) != 0 {
            has_duplicate = false;
        }
        if has_duplicate {
            self.on_interest_loop(&interest, ingress, ingress_link, now);
            return;
        }

        let is_pending = self
            .fw
            .pit
            .entry(pit_id)
            .map(|e| e.has_in_records())
            .unwrap_or(false);
        if !is_pending {
            match self.fw.cs.find(&interest, now) {
                Some(data) => self.on_content_store_hit(interest, ingress, pit_id, data, now),
                None => self.on_content_store_miss(interest, ingress, pit_id, now),
            }
        } else {
            // an aggregated Interest must not be answered from the cache,
            // the first copy already checked it
            self.on_content_store_miss(interest, ingress, pit_id, now);
        }
    }

    /// Interest loop pipeline
    fn on_interest_loop(
        &mut self,
        interest: &Interest,
        ingress: FaceId,
        ingress_link: LinkType,
        now: Instant,
    ) {
        if ingress_link != LinkType::PointToPoint {
            debug!(
                "interest loop in={} name={} link-type={:?} drop",
                ingress, interest.name, ingress_link
            );
            return;
        }
        let strategy = self.strategies.find_effective_strategy(&interest.name);
        strategy.on_interest_loop(&mut self.fw, interest, ingress, now);
    }

    /// Content store miss pipeline
    fn on_content_store_miss(
        &mut self,
        mut interest: Interest,
        ingress: FaceId,
        pit_id: PitId,
        now: Instant,
    ) {
        debug!("cs miss name={} nonce={:?}", interest.name, interest.nonce);
        self.fw.counters.n_cs_misses += 1;

        // attach the configured hop limit if the Interest carries none
        if self.fw.config.default_hop_limit > 0 && interest.hop_limit.is_none() {
            interest.hop_limit = Some(self.fw.config.default_hop_limit);
        }

        if let Some(entry) = self.fw.pit.entry_mut(pit_id) {
            entry.insert_or_update_in_record(ingress, &interest, now);
        }

        // the entry expires when its last in-record does
        if let Some(expiry) = self.fw.pit.entry(pit_id).and_then(|e| e.last_in_record_expiry()) {
            let delay = expiry.saturating_duration_since(now);
            self.fw.set_expiry_timer(pit_id, delay, now);
        }

        // a privileged local app may pin the upstream; scope control is
        // deliberately bypassed for it
        if let Some(next_hop) = interest.tags.next_hop_face_id {
            if self.fw.faces.contains(next_hop) {
                debug!(
                    "cs miss name={} nexthop-faceid={}",
                    interest.name, next_hop
                );
                self.fw.send_interest(pit_id, next_hop, &interest, now);
            }
            return;
        }

        let name = interest.name.clone();
        let strategy = self.strategies.find_effective_strategy(&name);
        strategy.after_receive_interest(&mut self.fw, &interest, ingress, pit_id, now);
    }

    /// Content store hit pipeline
    fn on_content_store_hit(
        &mut self,
        interest: Interest,
        ingress: FaceId,
        pit_id: PitId,
        mut data: Data,
        now: Instant,
    ) {
        debug!("cs hit name={} nonce={:?}", interest.name, interest.nonce);
        self.fw.counters.n_cs_hits += 1;

        data.tags.incoming_face_id = Some(FaceId::CONTENT_STORE);
        data.tags.pit_token = interest.tags.pit_token.clone();

        if let Some(entry) = self.fw.pit.entry_mut(pit_id) {
            entry.is_satisfied = true;
            entry.data_freshness_period = data.freshness_period;
        }
        self.fw.set_expiry_timer(pit_id, Duration::ZERO, now);

        let name = interest.name.clone();
        let strategy = self.strategies.find_effective_strategy(&name);
        strategy.after_content_store_hit(&mut self.fw, &data, ingress, pit_id, now);
    }

    /// Incoming Data pipeline
    pub fn on_incoming_data(&mut self, mut data: Data, ingress: FaceId, now: Instant) {
        let (ingress_scope, ingress_link) = match self.fw.faces.get(ingress) {
            Some(face) => (face.scope(), face.link_type()),
            None => return,
        };

        data.tags.incoming_face_id = Some(ingress);
        self.fw.counters.n_in_data += 1;
        if let Some(face) = self.fw.faces.get_mut(ingress) {
            face.counters.n_in_data += 1;
        }
        debug!("incoming data in={} name={}", ingress, data.name);

        // /localhost scope control
        if ingress_scope == FaceScope::NonLocal && algorithm::is_localhost_scoped(&data.name) {
            debug!(
                "incoming data in={} name={} violates /localhost",
                ingress, data.name
            );
            return;
        }

        let matches = self.fw.pit.find_all_data_matches(&self.fw.name_tree, &data);
        if matches.is_empty() {
            self.on_data_unsolicited(data, ingress_scope, now);
            return;
        }

        self.fw.cs.insert(data.clone(), false, now);

        if matches.len() == 1 {
            let pit_id = matches[0];
            self.fw.set_expiry_timer(pit_id, Duration::ZERO, now);

            let name = match self.fw.pit.entry(pit_id) {
                Some(entry) => entry.name().clone(),
                None => return,
            };
            debug!("incoming data matching={}", name);
            let strategy = self.strategies.find_effective_strategy(&name);
            strategy.after_receive_data(&mut self.fw, &data, ingress, pit_id, now);

            if let Some(entry) = self.fw.pit.entry_mut(pit_id) {
                entry.is_satisfied = true;
                entry.data_freshness_period = data.freshness_period;
            }
            self.fw.insert_dead_nonce_list(pit_id, Some(ingress), now);
            if let Some(entry) = self.fw.pit.entry_mut(pit_id) {
                entry.delete_out_record(ingress);
            }
        } else {
            let mut pending_downstreams: BTreeSet<FaceId> = BTreeSet::new();

            for &pit_id in &matches {
                if let Some(entry) = self.fw.pit.entry(pit_id) {
                    debug!("incoming data matching={}", entry.name());
                    for record in entry.in_records() {
                        if record.expiry > now {
                            pending_downstreams.insert(record.face);
                        }
                    }
                }

                self.fw.set_expiry_timer(pit_id, Duration::ZERO, now);

                let name = match self.fw.pit.entry(pit_id) {
                    Some(entry) => entry.name().clone(),
                    None => continue,
                };
                let strategy = self.strategies.find_effective_strategy(&name);
                strategy.before_satisfy_interest(&mut self.fw, &data, ingress, pit_id, now);

                if let Some(entry) = self.fw.pit.entry_mut(pit_id) {
                    entry.is_satisfied = true;
                    entry.data_freshness_period = data.freshness_period;
                }
                self.fw.insert_dead_nonce_list(pit_id, Some(ingress), now);
                if let Some(entry) = self.fw.pit.entry_mut(pit_id) {
                    entry.clear_in_records();
                    entry.delete_out_record(ingress);
                }
            }

            for face in pending_downstreams {
                if face == ingress && ingress_link != LinkType::AdHoc {
                    continue;
                }
                self.fw.send_data(&data, face);
            }
        }
    }

    /// Data unsolicited pipeline
    fn on_data_unsolicited(&mut self, data: Data, ingress_scope: FaceScope, now: Instant) {
        self.fw.counters.n_unsolicited_data += 1;
        let decision = self.fw.unsolicited_policy.decide(ingress_scope);
        debug!("unsolicited data name={} decision={:?}", data.name, decision);
        if decision == UnsolicitedDataDecision::Cache {
            self.fw.cs.insert(data, true, now);
        }
    }

    /// Incoming Nack pipeline
    pub fn on_incoming_nack(&mut self, mut nack: Nack, ingress: FaceId, now: Instant) {
        let ingress_link = match self.fw.faces.get(ingress) {
            Some(face) => face.link_type(),
            None => return,
        };

        nack.tags.incoming_face_id = Some(ingress);
        self.fw.counters.n_in_nacks += 1;
        if let Some(face) = self.fw.faces.get_mut(ingress) {
            face.counters.n_in_nacks += 1;
        }

        if ingress_link != LinkType::PointToPoint {
            debug!(
                "incoming nack in={} name={}~{} link-type={:?} drop",
                ingress, nack.interest.name, nack.reason, ingress_link
            );
            return;
        }

        let pit_id = match self.fw.pit.find(&nack.interest) {
            Some(pit_id) => pit_id,
            None => {
                debug!(
                    "incoming nack in={} name={}~{} no-pit-entry",
                    ingress, nack.interest.name, nack.reason
                );
                return;
            }
        };

        let last_nonce = match self.fw.pit.entry(pit_id).and_then(|e| e.find_out_record(ingress)) {
            Some(record) => record.last_nonce,
            None => {
                debug!(
                    "incoming nack in={} name={}~{} no-out-record",
                    ingress, nack.interest.name, nack.reason
                );
                return;
            }
        };

        if nack.interest.nonce != Some(last_nonce) {
            debug!(
                "incoming nack in={} name={}~{} nonce-mismatch {:?}!={}",
                ingress, nack.interest.name, nack.reason, nack.interest.nonce, last_nonce
            );
            return;
        }

        debug!("incoming nack in={} name={}~{}", ingress, nack.interest.name, nack.reason);
        if let Some(record) = self
            .fw
            .pit
            .entry_mut(pit_id)
            .and_then(|e| e.find_out_record_mut(ingress))
        {
            record.incoming_nack = Some(nack.reason);
        }

        // once every upstream has answered or lapsed, the entry may die now
        let any_pending = self
            .fw
            .pit
            .entry(pit_id)
            .map(|e| algorithm::has_pending_out_records(e, now))
            .unwrap_or(false);
        if !any_pending {
            self.fw.set_expiry_timer(pit_id, Duration::ZERO, now);
        }

        let name = match self.fw.pit.entry(pit_id) {
            Some(entry) => entry.name().clone(),
            None => return,
        };
        let strategy = self.strategies.find_effective_strategy(&name);
        strategy.after_receive_nack(&mut self.fw, &nack, ingress, pit_id, now);
    }

    /// Dropped Interest pipeline
    pub fn on_dropped_interest(&mut self, interest: &Interest, egress: FaceId, now: Instant) {
        let strategy = self.strategies.find_effective_strategy(&interest.name);
        strategy.on_dropped_interest(&mut self.fw, interest, egress, now);
    }

    /// New next hop pipeline: give strategies of PIT entries under `prefix`
    /// (not shadowed by a longer FIB entry) a chance to reforward.
    fn on_new_next_hop(&mut self, prefix: &Name, next_hop: NextHop, now: Instant) {
        let affected: Vec<PitId> = self
            .fw
            .name_tree
            .partial_enumerate(prefix, |node| {
                // a node with its own FIB entry shadows its subtree, unless
                // it is the node the enumeration started from
                if node.has_fib_entry() && node.name().len() > prefix.len() {
                    return (false, false);
                }
                (node.has_pit_entries(), true)
            })
            .iter()
            .flat_map(|node| node.pit_entries().iter().copied())
            .collect();

        for pit_id in affected {
            let name = match self.fw.pit.entry(pit_id) {
                Some(entry) => entry.name().clone(),
                None => continue,
            };
            let strategy = self.strategies.find_effective_strategy(&name);
            strategy.after_new_next_hop(&mut self.fw, next_hop, pit_id, now);
        }
    }

    fn drain_pending(&mut self, now: Instant) {
        while let Some(event) = self.fw.take_pending() {
            match event {
                PendingEvent::DroppedInterest { face, interest } => {
                    let strategy = self.strategies.find_effective_strategy(&interest.name);
                    strategy.on_dropped_interest(&mut self.fw, &interest, face, now);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multicast::MulticastStrategy;
    use tokio::sync::mpsc;

    struct TestFace {
        id: FaceId,
        rx: mpsc::UnboundedReceiver<(FaceId, FaceMessage)>,
    }

    impl TestFace {
        fn try_recv(&mut self) -> Option<FaceMessage> {
            self.rx.try_recv().ok().map(|(_, message)| message)
        }

        fn drain(&mut self) -> Vec<FaceMessage> {
            let mut messages = Vec::new();
            while let Some(message) = self.try_recv() {
                messages.push(message);
            }
            messages
        }
    }

    fn add_face(engine: &mut ForwardingEngine, scope: FaceScope, link_type: LinkType) -> TestFace {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = engine.add_face(scope, link_type, tx);
        TestFace { id, rx }
    }

    fn engine() -> ForwardingEngine {
        ForwardingEngine::new(ForwarderConfig::default())
    }

    fn interest(uri: &str, nonce: u32) -> Interest {
        Interest::new(Name::from_uri(uri)).with_nonce(nonce)
    }

    fn fresh_data(uri: &str, content: &[u8]) -> Data {
        Data::new(Name::from_uri(uri), content.to_vec())
            .with_freshness_period(Duration::from_secs(1))
    }

    #[test]
    fn scenario_basic_cs_hit() {
        let mut engine = engine();
        let now = Instant::now();
        let mut f1 = add_face(&mut engine, FaceScope::Local, LinkType::PointToPoint);

        engine
            .forwarder_mut()
            .cs
            .insert(fresh_data("/a/b", b"X"), false, now);

        engine.on_incoming_interest(interest("/a/b", 1), f1.id, now);

        let counters = engine.forwarder().counters;
        assert_eq!(counters.n_cs_hits, 1);
        assert_eq!(counters.n_cs_misses, 0);
        assert_eq!(counters.n_out_interests, 0);

        match f1.try_recv() {
            Some(FaceMessage::Data(data)) => {
                assert_eq!(data.name, Name::from_uri("/a/b"));
                assert_eq!(data.content, b"X".to_vec());
                assert_eq!(data.tags.incoming_face_id, Some(FaceId::CONTENT_STORE));
            }
            other => panic!("expected Data on f1, got {:?}", other),
        }
        assert!(f1.try_recv().is_none());

        engine.poll_timers(now);
        assert!(engine.forwarder().pit.is_empty());
        assert_eq!(engine.forwarder().counters.n_satisfied_interests, 1);
    }

    #[test]
    fn scenario_miss_then_satisfy() {
        let mut engine = engine();
        let now = Instant::now();
        let mut f1 = add_face(&mut engine, FaceScope::Local, LinkType::PointToPoint);
        let mut f2 = add_face(&mut engine, FaceScope::NonLocal, LinkType::PointToPoint);

        engine.register_route(&Name::from_uri("/a"), f2.id, 0, now);
        engine.on_incoming_interest(interest("/a/b", 2), f1.id, now);

        assert_eq!(engine.forwarder().counters.n_cs_misses, 1);
        match f2.try_recv() {
            Some(FaceMessage::Interest(forwarded)) => {
                assert_eq!(forwarded.name, Name::from_uri("/a/b"));
                assert_eq!(forwarded.nonce, Some(2));
            }
            other => panic!("expected Interest on f2, got {:?}", other),
        }

        engine.on_incoming_data(fresh_data("/a/b", b"X"), f2.id, now);

        match f1.try_recv() {
            Some(FaceMessage::Data(data)) => assert_eq!(data.name, Name::from_uri("/a/b")),
            other => panic!("expected Data on f1, got {:?}", other),
        }
        assert!(f2.try_recv().is_none());
        assert!(engine.forwarder().cs.contains(&Name::from_uri("/a/b")));

        engine.poll_timers(now);
        assert!(engine.forwarder().pit.is_empty());
        assert_eq!(engine.forwarder().counters.n_satisfied_interests, 1);
    }

    #[test]
    fn scenario_loop_via_dead_nonce_list() {
        let mut engine = engine();
        let now = Instant::now();
        let mut f1 = add_face(&mut engine, FaceScope::Local, LinkType::PointToPoint);
        let mut f2 = add_face(&mut engine, FaceScope::NonLocal, LinkType::PointToPoint);

        engine.register_route(&Name::from_uri("/a"), f2.id, 0, now);

        // a must-be-fresh exchange whose Data freshness undercuts the DNL
        // lifetime leaves the nonce in the dead nonce list
        let first = interest("/a/b", 2).with_must_be_fresh(true);
        engine.on_incoming_interest(first.clone(), f1.id, now);
        f2.drain();
        engine.on_incoming_data(fresh_data("/a/b", b"X"), f2.id, now);
        engine.poll_timers(now);
        f1.drain();
        assert!(engine.forwarder().pit.is_empty());
        assert!(engine.forwarder().dnl.has(&Name::from_uri("/a/b"), 2));

        engine.on_incoming_interest(first, f1.id, now);

        match f1.try_recv() {
            Some(FaceMessage::Nack(nack)) => {
                assert_eq!(nack.reason, NackReason::Duplicate);
                assert_eq!(nack.interest.name, Name::from_uri("/a/b"));
            }
            other => panic!("expected duplicate Nack on f1, got {:?}", other),
        }
        assert!(f2.try_recv().is_none());
    }

    #[test]
    fn scenario_hop_limit_exhaustion() {
        let mut engine = engine();
        let now = Instant::now();
        let f1 = add_face(&mut engine, FaceScope::NonLocal, LinkType::PointToPoint);
        let mut f2 = add_face(&mut engine, FaceScope::NonLocal, LinkType::PointToPoint);

        engine.register_route(&Name::from_uri("/x"), f2.id, 0, now);
        engine.on_incoming_interest(interest("/x", 1).with_hop_limit(1), f1.id, now);

        // decremented to zero at ingress, dropped at the non-local egress
        assert!(f2.try_recv().is_none());
        assert_eq!(engine.forwarder().counters.n_out_interests, 0);
        let f2_counters = engine.forwarder().faces.get(f2.id).unwrap().counters;
        assert_eq!(f2_counters.n_out_hop_limit_zero, 1);
    }

    #[test]
    fn hop_limit_zero_still_reaches_local_faces() {
        let mut engine = engine();
        let now = Instant::now();
        let f1 = add_face(&mut engine, FaceScope::NonLocal, LinkType::PointToPoint);
        let mut f2 = add_face(&mut engine, FaceScope::Local, LinkType::PointToPoint);

        engine.register_route(&Name::from_uri("/x"), f2.id, 0, now);
        engine.on_incoming_interest(interest("/x", 1).with_hop_limit(1), f1.id, now);

        match f2.try_recv() {
            Some(FaceMessage::Interest(forwarded)) => assert_eq!(forwarded.hop_limit, Some(0)),
            other => panic!("expected Interest on local f2, got {:?}", other),
        }
    }

    #[test]
    fn hop_limit_zero_at_ingress_is_counted_and_dropped() {
        let mut engine = engine();
        let now = Instant::now();
        let f1 = add_face(&mut engine, FaceScope::NonLocal, LinkType::PointToPoint);

        engine.on_incoming_interest(interest("/x", 1).with_hop_limit(0), f1.id, now);

        assert!(engine.forwarder().pit.is_empty());
        let f1_counters = engine.forwarder().faces.get(f1.id).unwrap().counters;
        assert_eq!(f1_counters.n_in_hop_limit_zero, 1);
        assert_eq!(engine.forwarder().counters.n_cs_misses, 0);
    }

    #[test]
    fn scenario_localhost_scope_violation() {
        let mut engine = engine();
        let now = Instant::now();
        let mut f2 = add_face(&mut engine, FaceScope::NonLocal, LinkType::PointToPoint);

        engine.on_incoming_interest(interest("/localhost/status", 1), f2.id, now);

        assert!(engine.forwarder().pit.is_empty());
        let counters = engine.forwarder().counters;
        assert_eq!(counters.n_in_interests, 1);
        assert_eq!(counters.n_cs_hits, 0);
        assert_eq!(counters.n_cs_misses, 0);
        assert!(f2.try_recv().is_none());

        // the same Interest from a local face is processed normally
        let f_local = add_face(&mut engine, FaceScope::Local, LinkType::PointToPoint);
        engine.on_incoming_interest(interest("/localhost/status", 2), f_local.id, now);
        assert_eq!(engine.forwarder().counters.n_cs_misses, 1);
    }

    #[test]
    fn scenario_multi_match_data() {
        let mut engine = engine();
        let now = Instant::now();
        let mut f1 = add_face(&mut engine, FaceScope::Local, LinkType::PointToPoint);
        let mut f2 = add_face(&mut engine, FaceScope::NonLocal, LinkType::PointToPoint);
        let mut f3 = add_face(&mut engine, FaceScope::Local, LinkType::PointToPoint);

        engine.register_route(&Name::from_uri("/a"), f2.id, 0, now);

        // two pending entries under /a with different selectors
        engine.on_incoming_interest(
            interest("/a", 10).with_can_be_prefix(true),
            f1.id,
            now,
        );
        engine.on_incoming_interest(interest("/a/b", 11), f3.id, now);
        assert_eq!(engine.forwarder().pit.len(), 2);
        f2.drain();

        engine.on_incoming_data(fresh_data("/a/b", b"X"), f2.id, now);

        match f1.try_recv() {
            Some(FaceMessage::Data(data)) => assert_eq!(data.name, Name::from_uri("/a/b")),
            other => panic!("expected Data on f1, got {:?}", other),
        }
        match f3.try_recv() {
            Some(FaceMessage::Data(data)) => assert_eq!(data.name, Name::from_uri("/a/b")),
            other => panic!("expected Data on f3, got {:?}", other),
        }
        assert!(f2.try_recv().is_none());

        engine.poll_timers(now);
        assert!(engine.forwarder().pit.is_empty());
        assert_eq!(engine.forwarder().counters.n_satisfied_interests, 2);
    }

    #[test]
    fn same_face_retransmission_is_not_a_loop() {
        let mut engine = engine();
        let now = Instant::now();
        let mut f1 = add_face(&mut engine, FaceScope::Local, LinkType::PointToPoint);
        let mut f2 = add_face(&mut engine, FaceScope::NonLocal, LinkType::PointToPoint);

        engine.register_route(&Name::from_uri("/a"), f2.id, 0, now);

        engine.on_incoming_interest(interest("/a", 5), f1.id, now);
        let later = now + Duration::from_millis(10);
        engine.on_incoming_interest(interest("/a", 5), f1.id, later);

        // no Nack back, in-record refreshed, upstream contacted only once
        assert!(f1.try_recv().is_none());
        assert_eq!(f2.drain().len(), 1);
        assert_eq!(engine.forwarder().counters.n_cs_misses, 2);

        let ids = engine.forwarder().pit.ids();
        assert_eq!(ids.len(), 1);
        let entry = engine.forwarder().pit.entry(ids[0]).unwrap();
        assert_eq!(entry.find_in_record(f1.id).unwrap().last_renewed, later);
    }

    #[test]
    fn nonce_matching_out_record_triggers_loop() {
        let mut engine = engine();
        let now = Instant::now();
        let f1 = add_face(&mut engine, FaceScope::Local, LinkType::PointToPoint);
        let mut f2 = add_face(&mut engine, FaceScope::NonLocal, LinkType::PointToPoint);

        engine.register_route(&Name::from_uri("/a"), f2.id, 0, now);
        engine.on_incoming_interest(interest("/a", 5), f1.id, now);
        f2.drain();

        // the forwarded Interest loops back from the upstream
        engine.on_incoming_interest(interest("/a", 5), f2.id, now);

        match f2.try_recv() {
            Some(FaceMessage::Nack(nack)) => assert_eq!(nack.reason, NackReason::Duplicate),
            other => panic!("expected duplicate Nack on f2, got {:?}", other),
        }
    }

    #[test]
    fn loop_on_multi_access_face_is_dropped_silently() {
        let mut engine = engine();
        let now = Instant::now();
        let f1 = add_face(&mut engine, FaceScope::Local, LinkType::PointToPoint);
        let mut f2 = add_face(&mut engine, FaceScope::NonLocal, LinkType::MultiAccess);

        engine.register_route(&Name::from_uri("/a"), f2.id, 0, now);
        engine.on_incoming_interest(interest("/a", 5), f1.id, now);
        f2.drain();

        engine.on_incoming_interest(interest("/a", 5), f2.id, now);
        assert!(f2.try_recv().is_none());
        assert_eq!(engine.forwarder().counters.n_out_nacks, 0);
    }

    #[test]
    fn nack_fan_in_relays_downstream() {
        let mut engine = engine();
        let now = Instant::now();
        let mut f1 = add_face(&mut engine, FaceScope::Local, LinkType::PointToPoint);
        let mut f2 = add_face(&mut engine, FaceScope::NonLocal, LinkType::PointToPoint);

        engine.register_route(&Name::from_uri("/a"), f2.id, 0, now);
        engine.on_incoming_interest(interest("/a/b", 7), f1.id, now);

        let forwarded = match f2.try_recv() {
            Some(FaceMessage::Interest(forwarded)) => forwarded,
            other => panic!("expected Interest on f2, got {:?}", other),
        };

        engine.on_incoming_nack(
            Nack::new(forwarded, NackReason::Congestion),
            f2.id,
            now,
        );

        match f1.try_recv() {
            Some(FaceMessage::Nack(nack)) => {
                assert_eq!(nack.reason, NackReason::Congestion);
                assert_eq!(nack.interest.name, Name::from_uri("/a/b"));
            }
            other => panic!("expected relayed Nack on f1, got {:?}", other),
        }

        engine.poll_timers(now);
        assert!(engine.forwarder().pit.is_empty());
        assert_eq!(engine.forwarder().counters.n_unsatisfied_interests, 1);
    }

    #[test]
    fn nack_with_stale_nonce_is_dropped() {
        let mut engine = engine();
        let now = Instant::now();
        let mut f1 = add_face(&mut engine, FaceScope::Local, LinkType::PointToPoint);
        let mut f2 = add_face(&mut engine, FaceScope::NonLocal, LinkType::PointToPoint);

        engine.register_route(&Name::from_uri("/a"), f2.id, 0, now);
        engine.on_incoming_interest(interest("/a/b", 7), f1.id, now);
        f2.drain();

        let wrong_nonce = interest("/a/b", 999);
        engine.on_incoming_nack(Nack::new(wrong_nonce, NackReason::NoRoute), f2.id, now);

        assert!(f1.try_recv().is_none());
        let ids = engine.forwarder().pit.ids();
        let entry = engine.forwarder().pit.entry(ids[0]).unwrap();
        assert!(entry.find_out_record(f2.id).unwrap().incoming_nack.is_none());
    }

    #[test]
    fn nack_on_multi_access_face_is_dropped() {
        let mut engine = engine();
        let now = Instant::now();
        let mut f1 = add_face(&mut engine, FaceScope::Local, LinkType::PointToPoint);
        let mut f2 = add_face(&mut engine, FaceScope::NonLocal, LinkType::MultiAccess);

        engine.register_route(&Name::from_uri("/a"), f2.id, 0, now);
        engine.on_incoming_interest(interest("/a/b", 7), f1.id, now);
        let forwarded = match f2.drain().pop() {
            Some(FaceMessage::Interest(forwarded)) => forwarded,
            other => panic!("expected Interest on f2, got {:?}", other),
        };

        engine.on_incoming_nack(Nack::new(forwarded, NackReason::NoRoute), f2.id, now);
        assert!(f1.try_recv().is_none());
        assert_eq!(engine.forwarder().counters.n_in_nacks, 1);
    }

    #[test]
    fn unsolicited_data_dropped_by_default() {
        let mut engine = engine();
        let now = Instant::now();
        let f2 = add_face(&mut engine, FaceScope::NonLocal, LinkType::PointToPoint);

        engine.on_incoming_data(fresh_data("/u", b"x"), f2.id, now);

        assert_eq!(engine.forwarder().counters.n_unsolicited_data, 1);
        assert!(engine.forwarder().cs.is_empty());
    }

    #[test]
    fn unsolicited_data_cached_when_admitted() {
        let mut engine = engine();
        let now = Instant::now();
        let f2 = add_face(&mut engine, FaceScope::NonLocal, LinkType::PointToPoint);

        engine.forwarder_mut().unsolicited_policy = UnsolicitedDataPolicy::AdmitNetwork;
        engine.on_incoming_data(fresh_data("/u", b"x"), f2.id, now);

        let entry = engine.forwarder().cs.get(&Name::from_uri("/u")).unwrap();
        assert!(entry.unsolicited);

        // but Data from a local face is outside the admit-network policy
        let f_local = add_face(&mut engine, FaceScope::Local, LinkType::PointToPoint);
        engine.on_incoming_data(fresh_data("/v", b"x"), f_local.id, now);
        assert!(!engine.forwarder().cs.contains(&Name::from_uri("/v")));
    }

    #[test]
    fn localhost_data_from_non_local_face_is_dropped() {
        let mut engine = engine();
        let now = Instant::now();
        let f2 = add_face(&mut engine, FaceScope::NonLocal, LinkType::PointToPoint);

        engine.forwarder_mut().unsolicited_policy = UnsolicitedDataPolicy::AdmitAll;
        engine.on_incoming_data(fresh_data("/localhost/d", b"x"), f2.id, now);

        assert!(engine.forwarder().cs.is_empty());
        assert_eq!(engine.forwarder().counters.n_unsolicited_data, 0);
    }

    #[test]
    fn new_next_hop_resurrects_pending_entry() {
        let mut engine = engine();
        let now = Instant::now();
        // multi-access downstream: the no-route Nack cannot be sent, so the
        // entry stays pending with its in-record
        let mut f1 = add_face(&mut engine, FaceScope::NonLocal, LinkType::MultiAccess);
        let mut f2 = add_face(&mut engine, FaceScope::NonLocal, LinkType::PointToPoint);

        engine.on_incoming_interest(interest("/a/b", 3), f1.id, now);
        assert!(f1.try_recv().is_none());
        assert_eq!(engine.forwarder().pit.len(), 1);

        engine.register_route(&Name::from_uri("/a"), f2.id, 0, now);

        match f2.try_recv() {
            Some(FaceMessage::Interest(forwarded)) => {
                assert_eq!(forwarded.name, Name::from_uri("/a/b"))
            }
            other => panic!("expected reforwarded Interest on f2, got {:?}", other),
        }
    }

    #[test]
    fn new_next_hop_skips_shadowed_subtrees() {
        let mut engine = engine();
        let now = Instant::now();
        let f1 = add_face(&mut engine, FaceScope::NonLocal, LinkType::MultiAccess);
        let mut f2 = add_face(&mut engine, FaceScope::NonLocal, LinkType::PointToPoint);
        let mut f3 = add_face(&mut engine, FaceScope::NonLocal, LinkType::PointToPoint);

        // /a/b has its own FIB entry, so the pending /a/b/c entry is
        // shadowed from updates at /a
        engine.register_route(&Name::from_uri("/a/b"), f3.id, 0, now);
        engine.on_incoming_interest(interest("/a/b/c", 3), f1.id, now);
        f3.drain();

        engine.register_route(&Name::from_uri("/a"), f2.id, 0, now);
        assert!(f2.try_recv().is_none());
    }

    #[test]
    fn multicast_strategy_fans_out() {
        let mut engine = engine();
        let now = Instant::now();
        let f1 = add_face(&mut engine, FaceScope::Local, LinkType::PointToPoint);
        let mut f2 = add_face(&mut engine, FaceScope::NonLocal, LinkType::PointToPoint);
        let mut f3 = add_face(&mut engine, FaceScope::NonLocal, LinkType::PointToPoint);

        engine
            .strategies_mut()
            .set_strategy(Name::from_uri("/m"), Box::new(MulticastStrategy::new()));
        engine.register_route(&Name::from_uri("/m"), f2.id, 10, now);
        engine.register_route(&Name::from_uri("/m"), f3.id, 20, now);

        engine.on_incoming_interest(interest("/m/x", 4), f1.id, now);

        assert_eq!(f2.drain().len(), 1);
        assert_eq!(f3.drain().len(), 1);
        assert_eq!(engine.forwarder().counters.n_out_interests, 2);
    }

    #[test]
    fn face_removal_cleans_tables() {
        let mut engine = engine();
        let now = Instant::now();
        let f1 = add_face(&mut engine, FaceScope::Local, LinkType::PointToPoint);
        let f2 = add_face(&mut engine, FaceScope::NonLocal, LinkType::PointToPoint);

        engine.register_route(&Name::from_uri("/a"), f2.id, 0, now);
        engine.on_incoming_interest(interest("/a/b", 9), f1.id, now);

        let ids = engine.forwarder().pit.ids();
        assert_eq!(ids.len(), 1);
        assert!(engine.forwarder().pit.entry(ids[0]).unwrap().find_out_record(f2.id).is_some());

        engine.remove_face(f2.id);

        assert!(engine.forwarder().fib.is_empty());
        let entry = engine.forwarder().pit.entry(ids[0]).unwrap();
        assert!(entry.find_out_record(f2.id).is_none());
        assert!(entry.find_in_record(f1.id).is_some());

        engine.remove_face(f1.id);
        let entry = engine.forwarder().pit.entry(ids[0]).unwrap();
        assert!(!entry.has_in_records());
    }

    #[test]
    fn one_expiry_timer_per_entry() {
        let mut engine = engine();
        let now = Instant::now();
        let f1 = add_face(&mut engine, FaceScope::Local, LinkType::PointToPoint);
        let mut f2 = add_face(&mut engine, FaceScope::NonLocal, LinkType::PointToPoint);

        engine.register_route(&Name::from_uri("/a"), f2.id, 0, now);
        engine.on_incoming_interest(interest("/a", 1), f1.id, now);
        engine.on_incoming_interest(interest("/a", 2), f1.id, now + Duration::from_millis(1));

        assert_eq!(engine.forwarder_mut().scheduler.len(), 1);
        f2.drain();
    }

    #[test]
    fn entry_expires_unsatisfied() {
        let mut engine = engine();
        let now = Instant::now();
        let f1 = add_face(&mut engine, FaceScope::Local, LinkType::PointToPoint);
        let mut f2 = add_face(&mut engine, FaceScope::NonLocal, LinkType::PointToPoint);

        engine.register_route(&Name::from_uri("/a"), f2.id, 0, now);
        let lifetime = Duration::from_millis(100);
        engine.on_incoming_interest(
            interest("/a", 1).with_lifetime(lifetime),
            f1.id,
            now,
        );
        f2.drain();

        engine.poll_timers(now + Duration::from_millis(50));
        assert_eq!(engine.forwarder().pit.len(), 1);

        engine.poll_timers(now + Duration::from_millis(150));
        assert!(engine.forwarder().pit.is_empty());
        assert_eq!(engine.forwarder().counters.n_unsatisfied_interests, 1);
        // an unsatisfied entry always records its outgoing nonces
        assert!(engine.forwarder().dnl.has(&Name::from_uri("/a"), 1));
    }

    #[test]
    fn satisfied_without_must_be_fresh_skips_dead_nonce_list() {
        let mut engine = engine();
        let now = Instant::now();
        let mut f1 = add_face(&mut engine, FaceScope::Local, LinkType::PointToPoint);
        let mut f2 = add_face(&mut engine, FaceScope::NonLocal, LinkType::PointToPoint);

        engine.register_route(&Name::from_uri("/a"), f2.id, 0, now);
        engine.on_incoming_interest(interest("/a/b", 2), f1.id, now);
        f2.drain();
        engine.on_incoming_data(fresh_data("/a/b", b"X"), f2.id, now);
        engine.poll_timers(now);
        f1.drain();

        assert!(engine.forwarder().pit.is_empty());
        assert!(!engine.forwarder().dnl.has(&Name::from_uri("/a/b"), 2));
    }

    #[test]
    fn next_hop_face_id_tag_bypasses_strategy() {
        let mut engine = engine();
        let now = Instant::now();
        let f1 = add_face(&mut engine, FaceScope::Local, LinkType::PointToPoint);
        let mut f2 = add_face(&mut engine, FaceScope::NonLocal, LinkType::PointToPoint);
        let mut f3 = add_face(&mut engine, FaceScope::NonLocal, LinkType::PointToPoint);

        // best-route would pick f2; the tag pins f3
        engine.register_route(&Name::from_uri("/a"), f2.id, 0, now);
        engine.register_route(&Name::from_uri("/a"), f3.id, 100, now);

        let mut pinned = interest("/a/b", 6);
        pinned.tags.next_hop_face_id = Some(f3.id);
        engine.on_incoming_interest(pinned, f1.id, now);

        assert!(f2.try_recv().is_none());
        assert_eq!(f3.drain().len(), 1);
    }

    #[test]
    fn forwarding_hint_stripped_in_producer_region() {
        let mut engine = engine();
        let now = Instant::now();
        let f1 = add_face(&mut engine, FaceScope::Local, LinkType::PointToPoint);
        let mut f2 = add_face(&mut engine, FaceScope::NonLocal, LinkType::PointToPoint);

        engine
            .forwarder_mut()
            .regions
            .add(Name::from_uri("/net/campus"));
        engine.register_route(&Name::from_uri("/a"), f2.id, 0, now);

        let hinted = interest("/a/b", 8)
            .with_forwarding_hint(vec![Name::from_uri("/net/campus/router")]);
        engine.on_incoming_interest(hinted, f1.id, now);

        match f2.try_recv() {
            Some(FaceMessage::Interest(forwarded)) => {
                assert!(forwarded.forwarding_hint.is_empty())
            }
            other => panic!("expected Interest on f2, got {:?}", other),
        }
    }

    #[test]
    fn default_hop_limit_applied_on_miss() {
        let mut engine = ForwardingEngine::new(ForwarderConfig {
            default_hop_limit: 16,
            ..ForwarderConfig::default()
        });
        let now = Instant::now();
        let f1 = add_face(&mut engine, FaceScope::Local, LinkType::PointToPoint);
        let mut f2 = add_face(&mut engine, FaceScope::NonLocal, LinkType::PointToPoint);

        engine.register_route(&Name::from_uri("/a"), f2.id, 0, now);
        engine.on_incoming_interest(interest("/a", 1), f1.id, now);

        match f2.try_recv() {
            Some(FaceMessage::Interest(forwarded)) => assert_eq!(forwarded.hop_limit, Some(16)),
            other => panic!("expected Interest on f2, got {:?}", other),
        }
    }

    #[test]
    fn in_interest_counter_balances_hits_misses_and_drops() {
        let mut engine = engine();
        let now = Instant::now();
        let mut f1 = add_face(&mut engine, FaceScope::Local, LinkType::PointToPoint);
        let f2 = add_face(&mut engine, FaceScope::NonLocal, LinkType::PointToPoint);

        engine
            .forwarder_mut()
            .cs
            .insert(fresh_data("/hit", b"x"), false, now);
        engine
            .forwarder_mut()
            .dnl
            .add(Name::from_uri("/looped"), 4, now);

        engine.on_incoming_interest(interest("/hit", 1), f1.id, now); // cs hit
        engine.on_incoming_interest(interest("/miss", 2), f1.id, now); // cs miss
        engine.on_incoming_interest(interest("/localhost/x", 3), f2.id, now); // scope drop
        engine.on_incoming_interest(interest("/looped", 4), f1.id, now); // dnl loop
        engine.on_incoming_interest(interest("/z", 5).with_hop_limit(0), f1.id, now); // hop-limit drop

        let counters = engine.forwarder().counters;
        let dropped = 3;
        assert_eq!(counters.n_in_interests, 5);
        assert_eq!(
            counters.n_in_interests,
            counters.n_cs_hits + counters.n_cs_misses + dropped
        );
        f1.drain();
    }

    struct RecordingStrategy {
        n_after_data: std::sync::Arc<std::sync::atomic::AtomicUsize>,
        n_before_satisfy: std::sync::Arc<std::sync::atomic::AtomicUsize>,
    }

    impl crate::strategy::Strategy for RecordingStrategy {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn after_receive_interest(
            &mut self,
            _fw: &mut Forwarder,
            _interest: &Interest,
            _ingress: FaceId,
            _pit_id: PitId,
            _now: Instant,
        ) {
        }

        fn after_receive_data(
            &mut self,
            fw: &mut Forwarder,
            data: &Data,
            ingress: FaceId,
            pit_id: PitId,
            now: Instant,
        ) {
            self.n_after_data
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            fw.send_data_to_all(pit_id, ingress, data, now);
        }

        fn before_satisfy_interest(
            &mut self,
            _fw: &mut Forwarder,
            _data: &Data,
            _ingress: FaceId,
            _pit_id: PitId,
            _now: Instant,
        ) {
            self.n_before_satisfy
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
    }

    #[test]
    fn single_match_calls_after_receive_data_multi_match_calls_before_satisfy() {
        use std::sync::atomic::Ordering;

        let mut engine = engine();
        let now = Instant::now();
        let mut f1 = add_face(&mut engine, FaceScope::Local, LinkType::PointToPoint);
        let f2 = add_face(&mut engine, FaceScope::NonLocal, LinkType::PointToPoint);
        let mut f3 = add_face(&mut engine, FaceScope::Local, LinkType::PointToPoint);

        let n_after_data = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let n_before_satisfy = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        engine.strategies_mut().set_strategy(
            Name::from_uri("/a"),
            Box::new(RecordingStrategy {
                n_after_data: n_after_data.clone(),
                n_before_satisfy: n_before_satisfy.clone(),
            }),
        );

        // one matching entry: exactly one after_receive_data, no
        // before_satisfy_interest
        engine.on_incoming_interest(interest("/a/b", 1), f1.id, now);
        engine.on_incoming_data(fresh_data("/a/b", b"x"), f2.id, now);
        assert_eq!(n_after_data.load(Ordering::SeqCst), 1);
        assert_eq!(n_before_satisfy.load(Ordering::SeqCst), 0);
        engine.poll_timers(now);
        f1.drain();

        // two matching entries: before_satisfy_interest once per entry,
        // after_receive_data untouched
        engine.on_incoming_interest(
            interest("/a", 2).with_can_be_prefix(true),
            f1.id,
            now,
        );
        engine.on_incoming_interest(interest("/a/y", 3), f3.id, now);
        engine.on_incoming_data(fresh_data("/a/y", b"x"), f2.id, now);
        assert_eq!(n_after_data.load(Ordering::SeqCst), 1);
        assert_eq!(n_before_satisfy.load(Ordering::SeqCst), 2);
        f1.drain();
        f3.drain();
    }

    #[test]
    fn best_route_prefers_remembered_upstream() {
        let mut engine = engine();
        let now = Instant::now();
        let mut f1 = add_face(&mut engine, FaceScope::Local, LinkType::PointToPoint);
        let mut f2 = add_face(&mut engine, FaceScope::NonLocal, LinkType::PointToPoint);
        let mut f3 = add_face(&mut engine, FaceScope::NonLocal, LinkType::PointToPoint);

        // f2 is cheaper, but f3 is the one that actually produced Data
        engine.register_route(&Name::from_uri("/a"), f2.id, 0, now);
        engine.register_route(&Name::from_uri("/a"), f3.id, 10, now);

        engine.on_incoming_interest(interest("/a/1", 1), f1.id, now);
        assert_eq!(f2.drain().len(), 1);
        engine.on_incoming_data(fresh_data("/a/1", b"x"), f3.id, now);
        engine.poll_timers(now);
        f1.drain();

        engine.on_incoming_interest(interest("/a/2", 2), f1.id, now);
        assert!(f2.try_recv().is_none());
        assert_eq!(f3.drain().len(), 1);
    }
}
