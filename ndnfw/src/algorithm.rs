use std::time::Instant;

use ndnfw_core::{FaceId, Name};

use crate::face::{Face, FaceScope};
use crate::pit::Entry;

/// Bitmask describing where a nonce was seen within a PIT entry
pub mod duplicate_nonce {
    pub const NONE: u8 = 0;
    /// in-record of the same face
    pub const IN_SAME: u8 = 1 << 0;
    /// in-record of another face
    pub const IN_OTHER: u8 = 1 << 1;
    /// out-record of the same face
    pub const OUT_SAME: u8 = 1 << 2;
    /// out-record of another face
    pub const OUT_OTHER: u8 = 1 << 3;
}

/// Where does `nonce` already appear in `entry`, relative to `ingress`?
pub fn find_duplicate_nonce(entry: &Entry, nonce: u32, ingress: FaceId) -> u8 {
    let mut mask = duplicate_nonce::NONE;
    for record in entry.in_records() {
        if record.last_nonce == nonce {
            mask |= if record.face == ingress {
                duplicate_nonce::IN_SAME
            } else {
                duplicate_nonce::IN_OTHER
            };
        }
    }
    for record in entry.out_records() {
        if record.last_nonce == nonce {
            mask |= if record.face == ingress {
                duplicate_nonce::OUT_SAME
            } else {
                duplicate_nonce::OUT_OTHER
            };
        }
    }
    mask
}

/// An out-record is pending while it has not expired and has not received a
/// Nack.
pub fn has_pending_out_records(entry: &Entry, now: Instant) -> bool {
    entry
        .out_records()
        .any(|record| record.incoming_nack.is_none() && record.expiry > now)
}

/// First component of the local-only scope
pub const LOCALHOST_COMPONENT: &[u8] = b"localhost";
/// First component of the one-hop scope
pub const LOCALHOP_COMPONENT: &[u8] = b"localhop";

pub fn is_localhost_scoped(name: &Name) -> bool {
    name.get(0) == Some(LOCALHOST_COMPONENT)
}

pub fn is_localhop_scoped(name: &Name) -> bool {
    name.get(0) == Some(LOCALHOP_COMPONENT)
}

/// Would sending a packet named `name`, received on a face of scope
/// `ingress_scope`, out of `egress` violate scope control?
pub fn would_violate_scope(ingress_scope: FaceScope, name: &Name, egress: &Face) -> bool {
    if egress.scope() == FaceScope::Local {
        // a local face can receive anything
        return false;
    }
    if is_localhost_scoped(name) {
        return true;
    }
    if is_localhop_scoped(name) {
        // /localhop is allowed to travel exactly one hop off the host
        return ingress_scope != FaceScope::Local;
    }
    false
}
