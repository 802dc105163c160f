use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use mesh_primitives::{NodeInfo, ServiceSummary};
use mesh_transport::Transport;
use parking_lot::{Mutex, RwLock};
use rand::seq::SliceRandom;
use tracing::{info, warn};

use crate::error::GossipError;
use crate::interval::AdaptiveInterval;
use crate::table::{PeerTable, Transition};
use crate::wire::{GossipMessage, WireFrame};

pub type StatusListener = Box<dyn Fn(&NodeInfo, Transition) + Send + Sync>;
pub type ServiceProjection = Box<dyn Fn() -> BTreeMap<String, ServiceSummary> + Send + Sync>;

pub struct GossipConfig {
    pub gossip_interval_min: f64,
    pub gossip_interval_max: f64,
    pub failure_timeout: f64,
    pub cleanup_interval: f64,
    pub adjust_interval_period: f64,
    pub max_gossip_targets: usize,
    pub compression_threshold: usize,
}

/// The membership component (spec.md §4.2): owns the peer table, paces
/// outgoing rounds, runs failure detection, and dispatches listener
/// callbacks on status transitions.
pub struct GossipService {
    pub table: Arc<PeerTable>,
    transport: Arc<Transport>,
    config: GossipConfig,
    interval: Mutex<AdaptiveInterval>,
    messages_this_window: AtomicU64,
    listeners: RwLock<Vec<StatusListener>>,
    projection: RwLock<Option<ServiceProjection>>,
}

impl GossipService {
    pub fn new(self_info: NodeInfo, transport: Arc<Transport>, config: GossipConfig) -> Self {
        let interval = AdaptiveInterval::new(config.gossip_interval_min, config.gossip_interval_max);
        Self {
            table: Arc::new(PeerTable::new(self_info)),
            transport,
            config,
            interval: Mutex::new(interval),
            messages_this_window: AtomicU64::new(0),
            listeners: RwLock::new(Vec::new()),
            projection: RwLock::new(None),
        }
    }

    pub fn current_interval_secs(&self) -> f64 {
        self.interval.lock().current()
    }

    /// Registered by the service lifecycle component; invoked right before
    /// every outgoing gossip message is serialized (spec.md §4.2 "Service
    /// projection").
    pub fn set_service_projection(&self, projection: ServiceProjection) {
        *self.projection.write() = Some(projection);
    }

    pub fn add_listener(&self, listener: StatusListener) {
        self.listeners.write().push(listener);
    }

    /// Probes `join_addresses` in order until one responds to a JOIN
    /// request; merges the responder's peer table (spec.md §4.2 "Peer
    /// table").
    pub async fn join(&self, join_addresses: &[String]) -> Result<(), GossipError> {
        for address in join_addresses {
            let url = format!("https://{address}");
            match self.exchange(&url, "/internal/gossip/join").await {
                Ok(()) => {
                    info!(peer = %address, "joined cluster via bootstrap address");
                    return Ok(());
                }
                Err(err) => {
                    warn!(peer = %address, error = %err, "join probe failed, trying next address");
                }
            }
        }
        Err(GossipError::NoTargets)
    }

    /// One gossip round (spec.md §4.2 "Gossip round"): picks up to
    /// `max_gossip_targets` random alive peers and exchanges node lists
    /// with each.
    pub async fn run_round(&self) -> Result<(), GossipError> {
        let alive = self.table.alive_peers();
        if alive.is_empty() {
            return Ok(());
        }
        let mut rng = rand::thread_rng();
        let mut targets = alive;
        targets.shuffle(&mut rng);
        targets.truncate(self.config.max_gossip_targets);

        for target in targets {
            let url = target.base_url();
            if let Err(err) = self.exchange(&url, "/internal/gossip/exchange").await {
                warn!(peer = %target.node_id, error = %err, "gossip exchange failed");
            }
        }
        Ok(())
    }

    async fn exchange(&self, peer_url: &str, path: &str) -> Result<(), GossipError> {
        self.refresh_self_services();
        let outgoing = GossipMessage::new(self.table.self_id(), self.table.snapshot_all());
        let frame = outgoing.to_wire(self.config.compression_threshold)?;
        let body = serde_json::to_value(&frame)?;

        let response = self.transport.request(peer_url, path, &body, &[]).await?;
        self.messages_this_window.fetch_add(1, Ordering::Relaxed);

        let reply_frame: WireFrame = serde_json::from_value(response)?;
        let reply = GossipMessage::from_wire(reply_frame)?;
        self.apply_incoming(reply);
        Ok(())
    }

    /// Handles an inbound gossip frame (JOIN or steady-state exchange),
    /// returning the response frame to send back to the caller. Invoked by
    /// the RPC layer's `/internal/gossip/join` and `/internal/gossip/exchange`
    /// handlers.
    pub fn handle_incoming(&self, frame: WireFrame) -> Result<WireFrame, GossipError> {
        let incoming = GossipMessage::from_wire(frame)?;
        self.apply_incoming(incoming);

        self.refresh_self_services();
        let outgoing = GossipMessage::new(self.table.self_id(), self.table.snapshot_all());
        outgoing.to_wire(self.config.compression_threshold)
    }

    fn apply_incoming(&self, message: GossipMessage) {
        let transitions = self.table.merge_many(message.nodes);
        self.dispatch_transitions(transitions);
    }

    fn refresh_self_services(&self) {
        if let Some(projection) = self.projection.read().as_ref() {
            self.table.set_self_services(projection());
        }
        self.table.touch_self();
    }

    /// Runs the failure-detection sweep and fires listeners for any
    /// resulting status transitions. Called on a periodic timer separate
    /// from the gossip round itself.
    pub fn run_failure_sweep(&self) {
        let transitions =
            self.table.sweep(self.config.failure_timeout, self.config.cleanup_interval);
        self.dispatch_transitions(transitions);
    }

    fn dispatch_transitions(&self, transitions: Vec<(String, Transition)>) {
        if transitions.is_empty() {
            return;
        }
        let listeners = self.listeners.read();
        for (node_id, transition) in transitions {
            let Some(info) = self.table.get(&node_id) else { continue };
            for listener in listeners.iter() {
                listener(&info, transition);
            }
        }
    }

    /// Recomputes the adaptive interval from the message count accumulated
    /// since the last call (spec.md §4.2 "Adaptive interval"). Called every
    /// `adjust_interval_period` seconds.
    pub fn adjust_interval(&self) -> f64 {
        let count = self.messages_this_window.swap(0, Ordering::Relaxed);
        let rate = count as f64 / self.config.adjust_interval_period.max(0.001);
        self.interval.lock().adjust(rate)
    }
}
