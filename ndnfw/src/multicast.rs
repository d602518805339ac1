use std::time::{Duration, Instant};

use log::debug;
use ndnfw_core::{FaceId, Interest, NackReason};

use crate::algorithm;
use crate::face::FaceScope;
use crate::fib::NextHop;
use crate::forwarder::Forwarder;
use crate::pit::PitId;
use crate::strategy::Strategy;

/// Forwards every Interest to all eligible next hops of the longest-prefix
/// FIB match.
pub struct MulticastStrategy;

impl MulticastStrategy {
    pub fn new() -> Self {
        Self
    }

    fn eligible_next_hops(fw: &Forwarder, interest: &Interest, ingress: FaceId) -> Vec<NextHop> {
        let ingress_scope = fw
            .faces
            .get(ingress)
            .map(|f| f.scope())
            .unwrap_or(FaceScope::NonLocal);

        match fw.fib.find_longest_prefix_match(&interest.name) {
            Some(entry) => entry
                .next_hops()
                .iter()
                .filter(|nh| {
                    nh.face != ingress
                        && fw
                            .faces
                            .get(nh.face)
                            .map(|f| {
                                !algorithm::would_violate_scope(ingress_scope, &interest.name, f)
                            })
                            .unwrap_or(false)
                })
                .copied()
                .collect(),
            None => Vec::new(),
        }
    }
}

impl Default for MulticastStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for MulticastStrategy {
    fn name(&self) -> &'static str {
        "multicast"
    }

    fn after_receive_interest(
        &mut self,
        fw: &mut Forwarder,
        interest: &Interest,
        ingress: FaceId,
        pit_id: PitId,
        now: Instant,
    ) {
        let eligible = Self::eligible_next_hops(fw, interest, ingress);
        if eligible.is_empty() {
            debug!("multicast name={} no eligible upstream", interest.name);
            fw.send_nack(pit_id, ingress, NackReason::NoRoute);
            fw.set_expiry_timer(pit_id, Duration::ZERO, now);
            return;
        }

        for next_hop in eligible {
            fw.send_interest(pit_id, next_hop.face, interest, now);
        }
    }

    fn after_new_next_hop(
        &mut self,
        fw: &mut Forwarder,
        next_hop: NextHop,
        pit_id: PitId,
        now: Instant,
    ) {
        let (interest, already_tried, has_downstream) = match fw.pit.entry(pit_id) {
            Some(entry) => (
                entry.interest().clone(),
                entry.find_out_record(next_hop.face).is_some(),
                entry.has_in_records(),
            ),
            None => return,
        };
        if already_tried || !has_downstream {
            return;
        }

        debug!(
            "multicast name={} forwarding to new next hop {}",
            interest.name, next_hop.face
        );
        fw.send_interest(pit_id, next_hop.face, &interest, now);
    }
}
