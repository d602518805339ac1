use std::collections::HashMap;
use std::time::Instant;

use log::debug;
use ndnfw_core::{Data, FaceId, Interest, Nack, NackReason, Name};

use crate::best_route::BestRouteStrategy;
use crate::fib::NextHop;
use crate::forwarder::Forwarder;
use crate::pit::PitId;

/// A pluggable forwarding policy. The pipelines call the hooks below at
/// well-defined points; hooks receive the forwarder's tables and outgoing
/// pipelines and operate on ids, never raw references, so deferred work
/// tolerates face removal.
///
/// The provided defaults mirror the common behavior most strategies share:
/// Data is returned to all pending downstreams and an Interest loop is
/// answered with a `duplicate` Nack.
pub trait Strategy: Send {
    fn name(&self) -> &'static str;

    /// An Interest missed the content store; choose upstream(s) and forward
    fn after_receive_interest(
        &mut self,
        fw: &mut Forwarder,
        interest: &Interest,
        ingress: FaceId,
        pit_id: PitId,
        now: Instant,
    );

    /// An Interest was satisfied from the content store
    fn after_content_store_hit(
        &mut self,
        fw: &mut Forwarder,
        data: &Data,
        ingress: FaceId,
        pit_id: PitId,
        now: Instant,
    ) {
        let _ = (pit_id, now);
        fw.send_data(data, ingress);
    }

    /// Data arrived and matched exactly one PIT entry
    fn after_receive_data(
        &mut self,
        fw: &mut Forwarder,
        data: &Data,
        ingress: FaceId,
        pit_id: PitId,
        now: Instant,
    ) {
        self.before_satisfy_interest(fw, data, ingress, pit_id, now);
        fw.send_data_to_all(pit_id, ingress, data, now);
    }

    /// Data arrived and matched this entry among several
    fn before_satisfy_interest(
        &mut self,
        fw: &mut Forwarder,
        data: &Data,
        ingress: FaceId,
        pit_id: PitId,
        now: Instant,
    ) {
        let _ = (fw, ingress, pit_id, now);
        debug!("{} before-satisfy data={}", self.name(), data.name);
    }

    /// A Nack arrived on an out-record of this entry
    fn after_receive_nack(
        &mut self,
        fw: &mut Forwarder,
        nack: &Nack,
        ingress: FaceId,
        pit_id: PitId,
        now: Instant,
    ) {
        let _ = (fw, ingress, pit_id, now);
        debug!(
            "{} ignoring nack {}~{}",
            self.name(),
            nack.interest.name,
            nack.reason
        );
    }

    /// The FIB gained a next hop under a prefix covering this entry
    fn after_new_next_hop(
        &mut self,
        fw: &mut Forwarder,
        next_hop: NextHop,
        pit_id: PitId,
        now: Instant,
    ) {
        let _ = (fw, next_hop, pit_id, now);
    }

    /// A looping Interest arrived on a point-to-point face
    fn on_interest_loop(
        &mut self,
        fw: &mut Forwarder,
        interest: &Interest,
        ingress: FaceId,
        now: Instant,
    ) {
        let _ = now;
        debug!(
            "{} interest loop name={}, answering duplicate nack",
            self.name(),
            interest.name
        );
        fw.send_nack_direct(ingress, interest, NackReason::Duplicate);
    }

    /// A face's transport discarded an outgoing Interest
    fn on_dropped_interest(
        &mut self,
        fw: &mut Forwarder,
        interest: &Interest,
        egress: FaceId,
        now: Instant,
    ) {
        let _ = (fw, now);
        debug!(
            "{} dropped interest name={} out={}",
            self.name(),
            interest.name,
            egress
        );
    }
}

/// Maps name prefixes to strategy instances. The effective strategy for a
/// name is the longest-prefix match; the root prefix always carries the
/// default (best-route).
pub struct StrategyChoice {
    choices: HashMap<Name, Box<dyn Strategy>>,
}

impl StrategyChoice {
    pub fn new() -> Self {
        let mut choices: HashMap<Name, Box<dyn Strategy>> = HashMap::new();
        choices.insert(Name::new(), Box::new(BestRouteStrategy::new()));
        Self { choices }
    }

    /// Install `strategy` for all names under `prefix`
    pub fn set_strategy(&mut self, prefix: Name, strategy: Box<dyn Strategy>) {
        debug!("strategy choice {} -> {}", prefix, strategy.name());
        self.choices.insert(prefix, strategy);
    }

    /// Remove the choice at `prefix`, falling back to the shorter-prefix
    /// choice. The root choice cannot be unset.
    pub fn unset_strategy(&mut self, prefix: &Name) -> bool {
        if prefix.is_empty() {
            return false;
        }
        self.choices.remove(prefix).is_some()
    }

    /// The strategy responsible for `name`
    pub fn find_effective_strategy(&mut self, name: &Name) -> &mut dyn Strategy {
        let mut key = Name::new();
        for depth in (0..=name.len()).rev() {
            let prefix = name.get_prefix(depth);
            if self.choices.contains_key(&prefix) {
                key = prefix;
                break;
            }
        }
        // the root entry is installed at construction and cannot be unset,
        // but self-heal rather than panic if it is ever missing
        self.choices
            .entry(key)
            .or_insert_with(|| Box::new(BestRouteStrategy::new()))
            .as_mut()
    }

    pub fn len(&self) -> usize {
        self.choices.len()
    }
}

impl Default for StrategyChoice {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multicast::MulticastStrategy;

    #[test]
    fn test_default_strategy_is_best_route() {
        let mut choice = StrategyChoice::new();
        assert_eq!(
            choice.find_effective_strategy(&Name::from_uri("/anything")).name(),
            "best-route"
        );
    }

    #[test]
    fn test_longest_prefix_choice() {
        let mut choice = StrategyChoice::new();
        choice.set_strategy(Name::from_uri("/a"), Box::new(MulticastStrategy::new()));

        assert_eq!(
            choice.find_effective_strategy(&Name::from_uri("/a/b/c")).name(),
            "multicast"
        );
        assert_eq!(
            choice.find_effective_strategy(&Name::from_uri("/b")).name(),
            "best-route"
        );
    }

    #[test]
    fn test_unset_falls_back() {
        let mut choice = StrategyChoice::new();
        choice.set_strategy(Name::from_uri("/a"), Box::new(MulticastStrategy::new()));

        assert!(choice.unset_strategy(&Name::from_uri("/a")));
        assert_eq!(
            choice.find_effective_strategy(&Name::from_uri("/a/b")).name(),
            "best-route"
        );

        // the root choice is not removable
        assert!(!choice.unset_strategy(&Name::new()));
        assert_eq!(choice.len(), 1);
    }
}
