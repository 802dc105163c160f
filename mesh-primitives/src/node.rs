use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Role a node plays in the cluster. Exactly one node is `Coordinator`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    Coordinator,
    Worker,
}

impl NodeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::Coordinator => "coordinator",
            NodeRole::Worker => "worker",
        }
    }
}

/// Failure-detector state of a peer, per the membership design.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Alive,
    Suspected,
    Dead,
}

/// One metadata value carried inside [`NodeInfo::metadata`].
///
/// A node may only bump the version of a key it owns; keys learned from
/// others are adopted with the observed version verbatim. Two replicas of
/// the same key are reconciled by [`VersionedValue::merge`]: higher version
/// wins, ties break on `node_id` lexical order (the caller supplies the
/// owning node id for the tie-break since this type doesn't carry it).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedValue {
    pub version: u64,
    pub value: String,
}

impl VersionedValue {
    pub fn new(version: u64, value: impl Into<String>) -> Self {
        Self { version, value: value.into() }
    }

    /// Returns `true` if `incoming` should replace `self`, given the
    /// `node_id` each replica was observed from (used only to break ties).
    pub fn should_replace(&self, incoming: &VersionedValue, self_node: &str, incoming_node: &str) -> bool {
        match incoming.version.cmp(&self.version) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => incoming_node > self_node,
        }
    }
}

/// Freshest local view of one loaded service, as projected into gossip by
/// the lifecycle component's service-projection callback (spec.md §4.2).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSummary {
    pub status: String,
    pub version: String,
    pub exposed_methods: Vec<String>,
}

/// Everything the cluster knows about one peer (or itself).
///
/// Invariant: a node's own entry's `last_seen` is refreshed before every
/// outgoing gossip message; other nodes' entries are only ever replaced
/// wholesale from inbound gossip, never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub node_id: String,
    pub address: String,
    pub port: u16,
    pub role: NodeRole,
    pub status: NodeStatus,
    pub last_seen: i64,
    pub capabilities: Vec<String>,
    pub services: BTreeMap<String, ServiceSummary>,
    pub metadata: BTreeMap<String, VersionedValue>,
}

impl NodeInfo {
    pub fn new(node_id: impl Into<String>, address: impl Into<String>, port: u16, role: NodeRole) -> Self {
        Self {
            node_id: node_id.into(),
            address: address.into(),
            port,
            role,
            status: NodeStatus::Alive,
            last_seen: crate::now_unix(),
            capabilities: Vec::new(),
            services: BTreeMap::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn base_url(&self) -> String {
        format!("https://{}:{}", self.address, self.port)
    }

    pub fn touch(&mut self) {
        self.last_seen = crate::now_unix();
    }

    /// Sets a metadata key owned by this node, incrementing its version.
    /// Keys learned from peers must go through [`NodeInfo::adopt_metadata`]
    /// instead, never through this method.
    pub fn set_owned_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let next_version = self.metadata.get(&key).map(|v| v.version + 1).unwrap_or(0);
        self.metadata.insert(key, VersionedValue::new(next_version, value));
    }

    /// Merges a metadata key observed from a peer, verbatim version included.
    pub fn adopt_metadata(&mut self, key: impl Into<String>, incoming: VersionedValue, incoming_node: &str) {
        let key = key.into();
        match self.metadata.get(&key) {
            Some(current) if !current.should_replace(&incoming, &self.node_id, incoming_node) => {}
            _ => {
                self.metadata.insert(key, incoming);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn higher_version_wins() {
        let a = VersionedValue::new(1, "a");
        let b = VersionedValue::new(2, "b");
        assert!(a.should_replace(&b, "node-a", "node-b"));
        assert!(!b.should_replace(&a, "node-b", "node-a"));
    }

    #[test]
    fn ties_break_on_node_id() {
        let a = VersionedValue::new(1, "a");
        let b = VersionedValue::new(1, "b");
        // node-a < node-b lexically, so node-b's replica wins the tie.
        assert!(a.should_replace(&b, "node-a", "node-b"));
        assert!(!b.should_replace(&a, "node-b", "node-a"));
    }

    #[test]
    fn owned_metadata_always_increments() {
        let mut node = NodeInfo::new("n1", "127.0.0.1", 9001, NodeRole::Worker);
        node.set_owned_metadata("status", "busy");
        node.set_owned_metadata("status", "idle");
        assert_eq!(node.metadata["status"].version, 1);
        assert_eq!(node.metadata["status"].value, "idle");
    }
}
