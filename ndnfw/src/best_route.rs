use std::time::{Duration, Instant};

use log::debug;
use ndnfw_core::{Data, FaceId, Interest, Nack, NackReason};

use crate::algorithm;
use crate::face::FaceScope;
use crate::fib::NextHop;
use crate::forwarder::Forwarder;
use crate::pit::PitId;
use crate::strategy::Strategy;

/// Retransmissions arriving within this window of the last forward are
/// suppressed instead of forwarded again.
pub const RETX_SUPPRESSION_WINDOW: Duration = Duration::from_millis(250);

/// Per-PIT-entry scratch state, stored in the entry's strategy slot
struct BestRouteInfo {
    last_forwarded: Instant,
}

/// Per-prefix memory of the upstream that last returned Data, kept in the
/// measurements table
pub struct LastWorkingUpstream {
    pub face: FaceId,
}

/// The default strategy: forward to the lowest-cost eligible next hop,
/// preferring the upstream that last produced Data for the prefix. A
/// retransmission outside the suppression window is sent to an upstream not
/// currently awaiting a reply.
pub struct BestRouteStrategy {
    suppression_window: Duration,
}

impl BestRouteStrategy {
    pub fn new() -> Self {
        Self {
            suppression_window: RETX_SUPPRESSION_WINDOW,
        }
    }

    /// Next hops from the longest-prefix FIB match that are usable for this
    /// Interest: not the downstream itself and not scope-violating.
    fn eligible_next_hops(
        fw: &Forwarder,
        interest: &Interest,
        ingress: FaceId,
    ) -> Vec<NextHop> {
        let ingress_scope = fw
            .faces
            .get(ingress)
            .map(|f| f.scope())
            .unwrap_or(FaceScope::NonLocal);

        let entry = match fw.fib.find_longest_prefix_match(&interest.name) {
            Some(entry) => entry,
            None => return Vec::new(),
        };
        entry
            .next_hops()
            .iter()
            .filter(|nh| {
                nh.face != ingress
                    && fw
                        .faces
                        .get(nh.face)
                        .map(|f| !algorithm::would_violate_scope(ingress_scope, &interest.name, f))
                        .unwrap_or(false)
            })
            .copied()
            .collect()
    }
}

impl Default for BestRouteStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for BestRouteStrategy {
    fn name(&self) -> &'static str {
        "best-route"
    }

    fn after_receive_interest(
        &mut self,
        fw: &mut Forwarder,
        interest: &Interest,
        ingress: FaceId,
        pit_id: PitId,
        now: Instant,
    ) {
        let is_retransmission = fw
            .pit
            .entry(pit_id)
            .map(|e| e.has_out_records())
            .unwrap_or(false);

        if is_retransmission {
            let suppressed = fw
                .pit
                .entry(pit_id)
                .and_then(|e| e.strategy_state.as_ref())
                .and_then(|s| s.downcast_ref::<BestRouteInfo>())
                .map(|info| now < info.last_forwarded + self.suppression_window)
                .unwrap_or(false);
            if suppressed {
                debug!("best-route name={} retransmission suppressed", interest.name);
                return;
            }
        }

        let eligible = Self::eligible_next_hops(fw, interest, ingress);

        let chosen = if is_retransmission {
            // pick an upstream that is not currently awaiting a reply
            let idle = match fw.pit.entry(pit_id) {
                Some(entry) => eligible
                    .iter()
                    .find(|nh| match entry.find_out_record(nh.face) {
                        None => true,
                        Some(record) => record.expiry <= now,
                    })
                    .copied(),
                None => None,
            };
            idle.or_else(|| eligible.first().copied())
        } else {
            // prefer the upstream that last returned Data for this prefix
            let hinted = fw
                .fib
                .find_longest_prefix_match(&interest.name)
                .and_then(|entry| fw.measurements.find(entry.prefix(), now))
                .and_then(|m| m.get_strategy_info::<LastWorkingUpstream>())
                .map(|info| info.face)
                .and_then(|face| eligible.iter().find(|nh| nh.face == face).copied());
            hinted.or_else(|| eligible.first().copied())
        };

        match chosen {
            Some(next_hop) => {
                fw.send_interest(pit_id, next_hop.face, interest, now);
                if let Some(entry) = fw.pit.entry_mut(pit_id) {
                    entry.strategy_state = Some(Box::new(BestRouteInfo { last_forwarded: now }));
                }
            }
            None => {
                debug!("best-route name={} no eligible upstream", interest.name);
                fw.send_nack(pit_id, ingress, NackReason::NoRoute);
                fw.set_expiry_timer(pit_id, Duration::ZERO, now);
            }
        }
    }

    fn after_receive_data(
        &mut self,
        fw: &mut Forwarder,
        data: &Data,
        ingress: FaceId,
        pit_id: PitId,
        now: Instant,
    ) {
        // remember the upstream that produced Data for this prefix
        if ingress != FaceId::CONTENT_STORE {
            if let Some(prefix) = fw
                .fib
                .find_longest_prefix_match(&data.name)
                .map(|entry| entry.prefix().clone())
            {
                fw.measurements
                    .lookup(&prefix, now)
                    .set_strategy_info(LastWorkingUpstream { face: ingress });
            }
        }

        self.before_satisfy_interest(fw, data, ingress, pit_id, now);
        fw.send_data_to_all(pit_id, ingress, data, now);
    }

    fn after_receive_nack(
        &mut self,
        fw: &mut Forwarder,
        nack: &Nack,
        _ingress: FaceId,
        pit_id: PitId,
        now: Instant,
    ) {
        let entry = match fw.pit.entry(pit_id) {
            Some(entry) => entry,
            None => return,
        };

        // wait until every upstream has answered or lapsed
        if algorithm::has_pending_out_records(entry, now) {
            debug!(
                "best-route nack name={} upstreams still pending",
                nack.interest.name
            );
            return;
        }

        let reason = entry
            .out_records()
            .filter_map(|r| r.incoming_nack)
            .fold(NackReason::None, NackReason::less_severe);
        if reason == NackReason::None {
            return;
        }

        debug!(
            "best-route nack name={} relaying {} downstream",
            nack.interest.name, reason
        );
        fw.send_nack_to_all(pit_id, reason);
    }

    fn after_new_next_hop(
        &mut self,
        fw: &mut Forwarder,
        next_hop: NextHop,
        pit_id: PitId,
        now: Instant,
    ) {
        // only entries never forwarded anywhere get a second chance here
        let (interest, ingress) = match fw.pit.entry(pit_id) {
            Some(entry) if !entry.has_out_records() && entry.has_in_records() => {
                let ingress = entry.in_records().map(|r| r.face).next();
                (entry.interest().clone(), ingress)
            }
            _ => return,
        };

        let ingress = match ingress {
            Some(face) => face,
            None => return,
        };
        if next_hop.face == ingress {
            return;
        }

        let ingress_scope = fw
            .faces
            .get(ingress)
            .map(|f| f.scope())
            .unwrap_or(FaceScope::NonLocal);
        let usable = fw
            .faces
            .get(next_hop.face)
            .map(|f| !algorithm::would_violate_scope(ingress_scope, &interest.name, f))
            .unwrap_or(false);
        if !usable {
            return;
        }

        debug!(
            "best-route name={} forwarding to new next hop {}",
            interest.name, next_hop.face
        );
        fw.send_interest(pit_id, next_hop.face, &interest, now);
        if let Some(entry) = fw.pit.entry_mut(pit_id) {
            entry.strategy_state = Some(Box::new(BestRouteInfo { last_forwarded: now }));
        }
    }
}
