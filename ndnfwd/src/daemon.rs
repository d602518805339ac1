use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log::{debug, info};
use ndnfw::{FaceEvent, FaceMessage, FaceScope, ForwarderConfig, ForwardingEngine, LinkType};
use ndnfw_core::{Data, FaceId, Interest, Nack, Name, Packet};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::service::Service;
use crate::transport::{TransportPacket, UdpTransport};

/// Handle to an in-process application face (scope Local). The application
/// injects packets into the forwarder and receives whatever the forwarder
/// sends to its face.
pub struct AppFaceHandle {
    face: FaceId,
    ingress: mpsc::UnboundedSender<FaceEvent>,
    egress: mpsc::UnboundedReceiver<(FaceId, FaceMessage)>,
}

impl AppFaceHandle {
    pub fn face(&self) -> FaceId {
        self.face
    }

    pub fn express_interest(&self, interest: Interest) -> Result<()> {
        self.ingress
            .send(FaceEvent::Interest {
                face: self.face,
                interest,
            })
            .map_err(|_| anyhow!("forwarder event loop is gone"))
    }

    pub fn put_data(&self, data: Data) -> Result<()> {
        self.ingress
            .send(FaceEvent::Data {
                face: self.face,
                data,
            })
            .map_err(|_| anyhow!("forwarder event loop is gone"))
    }

    pub fn put_nack(&self, nack: Nack) -> Result<()> {
        self.ingress
            .send(FaceEvent::Nack {
                face: self.face,
                nack,
            })
            .map_err(|_| anyhow!("forwarder event loop is gone"))
    }

    /// Next packet the forwarder sent to this face
    pub async fn recv(&mut self) -> Option<FaceMessage> {
        self.egress.recv().await.map(|(_, message)| message)
    }
}

struct DaemonState {
    engine: Option<ForwardingEngine>,
    ingress_rx: Option<mpsc::UnboundedReceiver<FaceEvent>>,
    udp_egress_tx: mpsc::UnboundedSender<(FaceId, FaceMessage)>,
    udp_egress_rx: Option<mpsc::UnboundedReceiver<(FaceId, FaceMessage)>>,
    shutdown: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

/// The forwarding daemon: owns the engine until start, then hands it to the
/// single event loop task.
pub struct Daemon {
    config: Config,
    ingress_tx: mpsc::UnboundedSender<FaceEvent>,
    state: Mutex<DaemonState>,
}

impl Daemon {
    pub fn new(config: Config) -> Self {
        let (ingress_tx, ingress_rx) = mpsc::unbounded_channel();
        let (udp_egress_tx, udp_egress_rx) = mpsc::unbounded_channel();

        let forwarder_config = ForwarderConfig {
            default_hop_limit: config.forwarder.default_hop_limit,
            ..ForwarderConfig::default()
        };

        Self {
            config,
            ingress_tx,
            state: Mutex::new(DaemonState {
                engine: Some(ForwardingEngine::new(forwarder_config)),
                ingress_rx: Some(ingress_rx),
                udp_egress_tx,
                udp_egress_rx: Some(udp_egress_rx),
                shutdown: None,
                task: None,
            }),
        }
    }

    /// Register an in-process application face. Must be called before
    /// `start`.
    pub async fn create_app_face(&self) -> Result<AppFaceHandle> {
        let mut state = self.state.lock().await;
        let engine = state
            .engine
            .as_mut()
            .ok_or_else(|| anyhow!("daemon already started"))?;

        let (egress_tx, egress_rx) = mpsc::unbounded_channel();
        let face = engine.add_face(FaceScope::Local, LinkType::PointToPoint, egress_tx);
        Ok(AppFaceHandle {
            face,
            ingress: self.ingress_tx.clone(),
            egress: egress_rx,
        })
    }

    /// Install a route toward an already known face. Must be called before
    /// `start`; network routes from the configuration are installed by
    /// `start` itself.
    pub async fn register_route(&self, prefix: &Name, face: FaceId, cost: u32) -> Result<()> {
        let mut state = self.state.lock().await;
        let engine = state
            .engine
            .as_mut()
            .ok_or_else(|| anyhow!("daemon already started"))?;
        engine.register_route(prefix, face, cost, Instant::now());
        Ok(())
    }
}

#[async_trait]
impl Service for Daemon {
    async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        ndnfw_core::init();
        ndnfw::init();

        let mut state = self.state.lock().await;
        let mut engine = state
            .engine
            .take()
            .ok_or_else(|| anyhow!("daemon already started"))?;
        let ingress_rx = state
            .ingress_rx
            .take()
            .ok_or_else(|| anyhow!("daemon already started"))?;
        let udp_egress_rx = state
            .udp_egress_rx
            .take()
            .ok_or_else(|| anyhow!("daemon already started"))?;

        let bind_addr = self.config.bind_socket_addr()?;
        let mut transport = UdpTransport::bind(bind_addr, state.udp_egress_tx.clone()).await?;

        // static routes: a UDP face per configured next hop
        let now = Instant::now();
        for route in &self.config.network.routes {
            let face = transport.face_for_addr(&mut engine, route.next_hop);
            engine.register_route(&Name::from_uri(&route.prefix), face, route.cost, now);
            info!(
                "route {} -> {} (face {}, cost {})",
                route.prefix, route.next_hop, face, route.cost
            );
        }

        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        transport.spawn_reader(transport_tx);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run_event_loop(
            engine,
            transport,
            transport_rx,
            ingress_rx,
            udp_egress_rx,
            shutdown_rx,
        ));

        state.shutdown = Some(shutdown_tx);
        state.task = Some(task);
        info!("forwarding daemon started on {}", bind_addr);
        Ok(())
    }

    async fn stop(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let (shutdown, task) = {
            let mut state = self.state.lock().await;
            (state.shutdown.take(), state.task.take())
        };

        if let Some(shutdown) = shutdown {
            let _ = shutdown.send(true);
        }
        if let Some(task) = task {
            let _ = task.await;
        }
        info!("forwarding daemon stopped");
        Ok(())
    }

    fn name(&self) -> &str {
        "ndnfwd"
    }
}

/// The single-threaded forwarding loop: face events, UDP ingress, UDP
/// egress and PIT expiry timers all run here, one at a time.
async fn run_event_loop(
    mut engine: ForwardingEngine,
    mut transport: UdpTransport,
    mut transport_rx: mpsc::UnboundedReceiver<TransportPacket>,
    mut ingress_rx: mpsc::UnboundedReceiver<FaceEvent>,
    mut udp_egress_rx: mpsc::UnboundedReceiver<(FaceId, FaceMessage)>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let cleanup_interval = Duration::from_secs(10);
    let mut last_cleanup = Instant::now();

    loop {
        let now = Instant::now();
        engine.poll_timers(now);
        if now.duration_since(last_cleanup) >= cleanup_interval {
            engine.cleanup(now);
            last_cleanup = now;
        }

        let wake_at = engine
            .next_deadline()
            .map(tokio::time::Instant::from_std)
            .unwrap_or_else(|| tokio::time::Instant::now() + Duration::from_secs(60));

        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            received = transport_rx.recv() => {
                match received {
                    Some(TransportPacket { remote, packet }) => {
                        let face = transport.face_for_addr(&mut engine, remote);
                        let event = match packet {
                            Packet::Interest(interest) => FaceEvent::Interest { face, interest },
                            Packet::Data(data) => FaceEvent::Data { face, data },
                            Packet::Nack(nack) => FaceEvent::Nack { face, nack },
                        };
                        engine.handle_face_event(event, Instant::now());
                    }
                    None => break,
                }
            }
            event = ingress_rx.recv() => {
                match event {
                    Some(event) => engine.handle_face_event(event, Instant::now()),
                    None => break,
                }
            }
            egress = udp_egress_rx.recv() => {
                if let Some((face, message)) = egress {
                    transport.transmit(face, message).await;
                }
            }
            _ = tokio::time::sleep_until(wake_at) => {
                debug!("timer wakeup");
            }
        }
    }
    info!("forwarding event loop stopped");
}
