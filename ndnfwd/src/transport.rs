use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use ndnfw::{FaceMessage, FaceScope, ForwardingEngine, LinkType};
use ndnfw_core::{FaceId, Packet};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

/// Largest datagram the transport accepts
pub const MAX_PACKET_SIZE: usize = 8800;

/// A packet received from the network before it is attributed to a face
#[derive(Debug)]
pub struct TransportPacket {
    pub remote: SocketAddr,
    pub packet: Packet,
}

/// UDP face adapter: one socket, one face per remote address. Ingress
/// datagrams are decoded by the reader task and attributed to faces by the
/// event loop; egress packets are encoded and sent back to the mapped
/// address.
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    addr_to_face: HashMap<SocketAddr, FaceId>,
    face_to_addr: HashMap<FaceId, SocketAddr>,
    /// Egress sender handed to every UDP face
    egress_tx: mpsc::UnboundedSender<(FaceId, FaceMessage)>,
}

impl UdpTransport {
    pub async fn bind(
        addr: SocketAddr,
        egress_tx: mpsc::UnboundedSender<(FaceId, FaceMessage)>,
    ) -> Result<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .with_context(|| format!("binding udp socket on {}", addr))?;
        info!("udp transport listening on {}", addr);
        Ok(Self {
            socket: Arc::new(socket),
            addr_to_face: HashMap::new(),
            face_to_addr: HashMap::new(),
            egress_tx,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Spawn the reader task feeding decoded packets into `tx`
    pub fn spawn_reader(&self, tx: mpsc::UnboundedSender<TransportPacket>) {
        let socket = Arc::clone(&self.socket);
        tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_PACKET_SIZE];
            loop {
                let (len, remote) = match socket.recv_from(&mut buf).await {
                    Ok(received) => received,
                    Err(e) => {
                        warn!("udp receive error: {}", e);
                        continue;
                    }
                };
                match Packet::decode(&buf[..len]) {
                    Ok((packet, _)) => {
                        if tx.send(TransportPacket { remote, packet }).is_err() {
                            // event loop is gone
                            return;
                        }
                    }
                    Err(e) => {
                        debug!("dropping malformed datagram from {}: {}", remote, e);
                    }
                }
            }
        });
    }

    /// The face for `remote`, creating one on first contact
    pub fn face_for_addr(&mut self, engine: &mut ForwardingEngine, remote: SocketAddr) -> FaceId {
        if let Some(&face) = self.addr_to_face.get(&remote) {
            return face;
        }
        let face = engine.add_face(
            FaceScope::NonLocal,
            LinkType::PointToPoint,
            self.egress_tx.clone(),
        );
        info!("udp face {} for {}", face, remote);
        self.addr_to_face.insert(remote, face);
        self.face_to_addr.insert(face, remote);
        face
    }

    pub fn addr_of_face(&self, face: FaceId) -> Option<SocketAddr> {
        self.face_to_addr.get(&face).copied()
    }

    /// Encode and transmit an egress packet for a UDP face
    pub async fn transmit(&self, face: FaceId, message: FaceMessage) {
        let remote = match self.face_to_addr.get(&face) {
            Some(remote) => *remote,
            None => {
                debug!("egress for face {} without transport mapping", face);
                return;
            }
        };
        let packet = match message {
            FaceMessage::Interest(interest) => Packet::Interest(interest),
            FaceMessage::Data(data) => Packet::Data(data),
            FaceMessage::Nack(nack) => Packet::Nack(nack),
        };
        match packet.encode() {
            Ok(wire) => {
                if let Err(e) = self.socket.send_to(&wire, remote).await {
                    warn!("udp send to {} failed: {}", remote, e);
                }
            }
            Err(e) => warn!("cannot encode egress packet for {}: {}", remote, e),
        }
    }

    /// Drop the mapping of a removed face
    pub fn forget_face(&mut self, face: FaceId) {
        if let Some(remote) = self.face_to_addr.remove(&face) {
            self.addr_to_face.remove(&remote);
        }
    }
}
