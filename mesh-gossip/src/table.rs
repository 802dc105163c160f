use std::collections::{BTreeMap, HashMap};

use mesh_primitives::{now_unix, NodeInfo, NodeStatus, ServiceSummary};
use parking_lot::RwLock;
use tracing::debug;

/// Status transition fired to listeners on every sweep that changes a
/// peer's liveness (spec.md §4.2 "Listeners").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    FirstSeen,
    BecameAlive,
    BecameSuspected,
    BecameDead,
    Removed,
}

/// `node_id -> NodeInfo`, plus the local node's own entry. The only shared,
/// mutable piece of gossip state; every other gossip concern (wire
/// encoding, interval pacing) is a pure function over snapshots of this
/// table.
pub struct PeerTable {
    self_id: String,
    inner: RwLock<Inner>,
}

struct Inner {
    self_info: NodeInfo,
    peers: HashMap<String, NodeInfo>,
}

impl PeerTable {
    pub fn new(self_info: NodeInfo) -> Self {
        let self_id = self_info.node_id.clone();
        Self { self_id, inner: RwLock::new(Inner { self_info, peers: HashMap::new() }) }
    }

    pub fn self_id(&self) -> &str {
        &self.self_id
    }

    /// Refreshes the local node's own `last_seen` immediately before it is
    /// serialized into an outgoing gossip message (spec.md §3 `NodeInfo`
    /// invariant).
    pub fn touch_self(&self) -> NodeInfo {
        let mut inner = self.inner.write();
        inner.self_info.touch();
        inner.self_info.clone()
    }

    pub fn self_snapshot(&self) -> NodeInfo {
        self.inner.read().self_info.clone()
    }

    /// Refreshes self's `services` map from the lifecycle component's
    /// projection callback (spec.md §4.2 "Service projection").
    pub fn set_self_services(&self, services: BTreeMap<String, ServiceSummary>) {
        self.inner.write().self_info.services = services;
    }

    /// Bumps one versioned metadata key owned by the local node (spec.md
    /// §4.8 publishes job/batch/worker-status state this way).
    pub fn set_self_metadata(&self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.write().self_info.set_owned_metadata(key, value);
    }

    pub fn self_metadata(&self, key: &str) -> Option<mesh_primitives::VersionedValue> {
        self.inner.read().self_info.metadata.get(key).cloned()
    }

    /// Full snapshot of self + all known peers, for serialization into a
    /// gossip round.
    pub fn snapshot_all(&self) -> Vec<NodeInfo> {
        let inner = self.inner.read();
        std::iter::once(inner.self_info.clone())
            .chain(inner.peers.values().cloned())
            .collect()
    }

    pub fn alive_peers(&self) -> Vec<NodeInfo> {
        self.inner
            .read()
            .peers
            .values()
            .filter(|p| p.status == NodeStatus::Alive)
            .cloned()
            .collect()
    }

    pub fn get(&self, node_id: &str) -> Option<NodeInfo> {
        if node_id == self.self_id {
            return Some(self.inner.read().self_info.clone());
        }
        self.inner.read().peers.get(node_id).cloned()
    }

    /// Merges one incoming `NodeInfo` (spec.md §4.2 gossip round): replaces
    /// the local entry only if the incoming `last_seen` is newer. Returns
    /// `Some(Transition::FirstSeen)` the first time a node_id is observed.
    pub fn merge_one(&self, incoming: NodeInfo) -> Option<Transition> {
        if incoming.node_id == self.self_id {
            return None;
        }
        let mut inner = self.inner.write();
        match inner.peers.get_mut(&incoming.node_id) {
            Some(existing) => {
                if incoming.last_seen > existing.last_seen {
                    for (key, value) in incoming.metadata.iter() {
                        existing.adopt_metadata(key.clone(), value.clone(), &incoming.node_id);
                    }
                    existing.services = incoming.services.clone();
                    existing.capabilities = incoming.capabilities.clone();
                    existing.address = incoming.address.clone();
                    existing.port = incoming.port;
                    existing.last_seen = incoming.last_seen;
                    existing.status = incoming.status;
                }
                None
            }
            None => {
                debug!(peer = %incoming.node_id, "first gossip contact with peer");
                inner.peers.insert(incoming.node_id.clone(), incoming);
                Some(Transition::FirstSeen)
            }
        }
    }

    pub fn merge_many(&self, incoming: Vec<NodeInfo>) -> Vec<(String, Transition)> {
        incoming
            .into_iter()
            .filter_map(|node| {
                let id = node.node_id.clone();
                self.merge_one(node).map(|t| (id, t))
            })
            .collect()
    }

    /// Runs the failure-detection sweep described in spec.md §4.2: marks
    /// peers suspected / dead based on elapsed time since `last_seen`, and
    /// drops peers that have been dead for `2 * cleanup_interval`. Returns
    /// the transitions that occurred, for listener dispatch.
    pub fn sweep(&self, failure_timeout: f64, cleanup_interval: f64) -> Vec<(String, Transition)> {
        let now = now_unix();
        let mut transitions = Vec::new();
        let mut inner = self.inner.write();
        let mut to_remove = Vec::new();

        for (id, peer) in inner.peers.iter_mut() {
            let elapsed = (now - peer.last_seen) as f64;
            match peer.status {
                NodeStatus::Alive if elapsed > failure_timeout => {
                    peer.status = NodeStatus::Dead;
                    transitions.push((id.clone(), Transition::BecameDead));
                }
                NodeStatus::Alive if elapsed > failure_timeout / 2.0 => {
                    peer.status = NodeStatus::Suspected;
                    transitions.push((id.clone(), Transition::BecameSuspected));
                }
                NodeStatus::Suspected if elapsed > failure_timeout => {
                    peer.status = NodeStatus::Dead;
                    transitions.push((id.clone(), Transition::BecameDead));
                }
                NodeStatus::Suspected if elapsed <= failure_timeout / 2.0 => {
                    peer.status = NodeStatus::Alive;
                    transitions.push((id.clone(), Transition::BecameAlive));
                }
                NodeStatus::Dead if elapsed > failure_timeout + 2.0 * cleanup_interval => {
                    to_remove.push(id.clone());
                }
                _ => {}
            }
        }

        for id in to_remove {
            inner.peers.remove(&id);
            transitions.push((id, Transition::Removed));
        }

        transitions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_primitives::{NodeInfo, NodeRole};

    fn node(id: &str) -> NodeInfo {
        NodeInfo::new(id.to_string(), "127.0.0.1".into(), 9001, NodeRole::Worker)
    }

    #[test]
    fn first_contact_reports_first_seen() {
        let table = PeerTable::new(node("self"));
        let transition = table.merge_one(node("peer-1"));
        assert_eq!(transition, Some(Transition::FirstSeen));
        assert!(table.get("peer-1").is_some());
    }

    #[test]
    fn stale_incoming_does_not_replace_newer_local() {
        let table = PeerTable::new(node("self"));
        table.merge_one(node("peer-1"));
        let mut stale = node("peer-1");
        stale.last_seen -= 1000;
        table.merge_one(stale.clone());
        let current = table.get("peer-1").unwrap();
        assert_ne!(current.last_seen, stale.last_seen);
    }

    #[test]
    fn sweep_marks_suspected_then_dead() {
        let table = PeerTable::new(node("self"));
        let mut peer = node("peer-1");
        peer.last_seen = now_unix() - 100;
        table.merge_one(peer);
        let transitions = table.sweep(10.0, 30.0);
        assert!(transitions.iter().any(|(_, t)| *t == Transition::BecameDead));
    }
}
