use std::collections::HashMap;

use log::{debug, info};
use ndnfw_core::{Data, FaceId, Interest, Nack};
use tokio::sync::mpsc;

/// Whether a face terminates at an application on the same host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaceScope {
    Local,
    NonLocal,
}

/// Link type of the underlying channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    PointToPoint,
    MultiAccess,
    AdHoc,
}

/// Per-face counters
#[derive(Debug, Clone, Copy, Default)]
pub struct FaceCounters {
    pub n_in_interests: u64,
    pub n_out_interests: u64,
    pub n_in_data: u64,
    pub n_out_data: u64,
    pub n_in_nacks: u64,
    pub n_out_nacks: u64,
    pub n_in_hop_limit_zero: u64,
    pub n_out_hop_limit_zero: u64,
}

/// A packet handed to a face for transmission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaceMessage {
    Interest(Interest),
    Data(Data),
    Nack(Nack),
}

/// An inbound event delivered by a face to the forwarder
#[derive(Debug, Clone)]
pub enum FaceEvent {
    Interest { face: FaceId, interest: Interest },
    Data { face: FaceId, data: Data },
    Nack { face: FaceId, nack: Nack },
    /// The face's transport discarded an outgoing Interest
    DroppedInterest { face: FaceId, interest: Interest },
}

#[derive(Debug, thiserror::Error)]
pub enum FaceError {
    #[error("face {0} not found")]
    NotFound(FaceId),
    #[error("face {0} is closed")]
    Closed(FaceId),
}

/// An active face: a stable id, its scope and link type, counters, and the
/// egress channel its transport adapter drains
#[derive(Debug)]
pub struct Face {
    id: FaceId,
    scope: FaceScope,
    link_type: LinkType,
    pub counters: FaceCounters,
    tx: mpsc::UnboundedSender<(FaceId, FaceMessage)>,
}

impl Face {
    pub fn id(&self) -> FaceId {
        self.id
    }

    pub fn scope(&self) -> FaceScope {
        self.scope
    }

    pub fn link_type(&self) -> LinkType {
        self.link_type
    }

    pub fn is_local(&self) -> bool {
        self.scope == FaceScope::Local
    }

    /// Hand a packet to the transport adapter
    pub fn send(&mut self, message: FaceMessage) -> Result<(), FaceError> {
        match &message {
            FaceMessage::Interest(_) => self.counters.n_out_interests += 1,
            FaceMessage::Data(_) => self.counters.n_out_data += 1,
            FaceMessage::Nack(_) => self.counters.n_out_nacks += 1,
        }
        self.tx
            .send((self.id, message))
            .map_err(|_| FaceError::Closed(self.id))
    }
}

/// Registry of active faces. Ids are allocated monotonically starting at
/// [`FaceId::MIN_ALLOCATED`]; the range below is reserved.
#[derive(Debug, Default)]
pub struct FaceTable {
    faces: HashMap<FaceId, Face>,
    next_face_id: u64,
}

impl FaceTable {
    pub fn new() -> Self {
        Self {
            faces: HashMap::new(),
            next_face_id: FaceId::MIN_ALLOCATED,
        }
    }

    /// Register a face and allocate its id
    pub fn add(
        &mut self,
        scope: FaceScope,
        link_type: LinkType,
        tx: mpsc::UnboundedSender<(FaceId, FaceMessage)>,
    ) -> FaceId {
        let id = FaceId(self.next_face_id);
        self.next_face_id += 1;

        self.faces.insert(
            id,
            Face {
                id,
                scope,
                link_type,
                counters: FaceCounters::default(),
                tx,
            },
        );
        info!("added face {} scope={:?} link-type={:?}", id, scope, link_type);
        id
    }

    /// Remove a face. The caller is responsible for cleaning tables first.
    pub fn remove(&mut self, id: FaceId) -> Option<Face> {
        let face = self.faces.remove(&id);
        if face.is_some() {
            info!("removed face {}", id);
        } else {
            debug!("remove of unknown face {}", id);
        }
        face
    }

    pub fn get(&self, id: FaceId) -> Option<&Face> {
        self.faces.get(&id)
    }

    pub fn get_mut(&mut self, id: FaceId) -> Option<&mut Face> {
        self.faces.get_mut(&id)
    }

    pub fn contains(&self, id: FaceId) -> bool {
        self.faces.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Face> {
        self.faces.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndnfw_core::Name;

    fn channel() -> (
        mpsc::UnboundedSender<(FaceId, FaceMessage)>,
        mpsc::UnboundedReceiver<(FaceId, FaceMessage)>,
    ) {
        mpsc::unbounded_channel()
    }

    #[test]
    fn test_id_allocation_starts_above_reserved_range() {
        let mut table = FaceTable::new();
        let (tx, _rx) = channel();
        let first = table.add(FaceScope::Local, LinkType::PointToPoint, tx.clone());
        let second = table.add(FaceScope::NonLocal, LinkType::MultiAccess, tx);

        assert_eq!(first.0, FaceId::MIN_ALLOCATED);
        assert_eq!(second.0, FaceId::MIN_ALLOCATED + 1);
        assert!(first.0 > FaceId::CONTENT_STORE.0);
    }

    #[test]
    fn test_send_updates_counters_and_delivers() {
        let mut table = FaceTable::new();
        let (tx, mut rx) = channel();
        let id = table.add(FaceScope::Local, LinkType::PointToPoint, tx);

        let interest = Interest::new(Name::from_uri("/a")).with_nonce(1);
        table
            .get_mut(id)
            .unwrap()
            .send(FaceMessage::Interest(interest.clone()))
            .unwrap();

        assert_eq!(table.get(id).unwrap().counters.n_out_interests, 1);
        let (from, message) = rx.try_recv().unwrap();
        assert_eq!(from, id);
        assert_eq!(message, FaceMessage::Interest(interest));
    }

    #[test]
    fn test_send_to_closed_transport_fails() {
        let mut table = FaceTable::new();
        let (tx, rx) = channel();
        drop(rx);
        let id = table.add(FaceScope::NonLocal, LinkType::PointToPoint, tx);

        let data = Data::new(Name::from_uri("/a"), vec![]);
        assert!(matches!(
            table.get_mut(id).unwrap().send(FaceMessage::Data(data)),
            Err(FaceError::Closed(_))
        ));
    }

    #[test]
    fn test_remove() {
        let mut table = FaceTable::new();
        let (tx, _rx) = channel();
        let id = table.add(FaceScope::Local, LinkType::AdHoc, tx);

        assert!(table.contains(id));
        assert!(table.remove(id).is_some());
        assert!(!table.contains(id));
        assert!(table.remove(id).is_none());
    }
}
