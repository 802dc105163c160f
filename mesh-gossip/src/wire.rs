use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use mesh_primitives::NodeInfo;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::GossipError;

/// The literal wire shape of `/internal/gossip/join` and
/// `/internal/gossip/exchange` (spec.md §6): `nodes` is either a plain JSON
/// array (`compressed: false`) or a hex string of gzip-compressed JSON
/// (`compressed: true`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireFrame {
    pub sender_id: String,
    pub timestamp: i64,
    pub nodes: Value,
    #[serde(default)]
    pub compressed: bool,
}

/// One gossip round message: sender identity, timestamp, and the sender's
/// full node list (spec.md §4.2 "Gossip round").
#[derive(Debug, Clone)]
pub struct GossipMessage {
    pub sender_id: String,
    pub timestamp: i64,
    pub nodes: Vec<NodeInfo>,
}

impl GossipMessage {
    pub fn new(sender_id: impl Into<String>, nodes: Vec<NodeInfo>) -> Self {
        Self { sender_id: sender_id.into(), timestamp: mesh_primitives::now_unix(), nodes }
    }

    /// Builds the wire frame, compressing the node list when its raw JSON
    /// is at least `threshold` bytes and compression actually shrinks it
    /// (spec.md §4.2 "Compression").
    pub fn to_wire(&self, threshold: usize) -> Result<WireFrame, GossipError> {
        let raw = serde_json::to_vec(&self.nodes)?;
        if raw.len() < threshold {
            return Ok(WireFrame {
                sender_id: self.sender_id.clone(),
                timestamp: self.timestamp,
                nodes: serde_json::to_value(&self.nodes)?,
                compressed: false,
            });
        }

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&raw)?;
        let compressed = encoder.finish()?;
        if compressed.len() < raw.len() {
            Ok(WireFrame {
                sender_id: self.sender_id.clone(),
                timestamp: self.timestamp,
                nodes: Value::String(hex::encode(compressed)),
                compressed: true,
            })
        } else {
            Ok(WireFrame {
                sender_id: self.sender_id.clone(),
                timestamp: self.timestamp,
                nodes: serde_json::to_value(&self.nodes)?,
                compressed: false,
            })
        }
    }

    pub fn from_wire(frame: WireFrame) -> Result<Self, GossipError> {
        let nodes: Vec<NodeInfo> = if frame.compressed {
            let hex_body = frame.nodes.as_str().ok_or(GossipError::Framing)?;
            let compressed = hex::decode(hex_body).map_err(|_| GossipError::Framing)?;
            let mut decoder = GzDecoder::new(&compressed[..]);
            let mut raw = Vec::new();
            decoder.read_to_end(&mut raw)?;
            serde_json::from_slice(&raw)?
        } else {
            serde_json::from_value(frame.nodes)?
        };
        Ok(Self { sender_id: frame.sender_id, timestamp: frame.timestamp, nodes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_messages_are_not_compressed() {
        let msg = GossipMessage::new("node-1", vec![]);
        let frame = msg.to_wire(4096).unwrap();
        assert!(!frame.compressed);
    }

    #[test]
    fn roundtrip_preserves_content() {
        let msg = GossipMessage::new("node-1", vec![]);
        let frame = msg.to_wire(4096).unwrap();
        let decoded = GossipMessage::from_wire(frame).unwrap();
        assert_eq!(decoded.sender_id, "node-1");
    }

    #[test]
    fn large_repetitive_payload_is_compressed() {
        let nodes: Vec<NodeInfo> = (0..200)
            .map(|i| {
                mesh_primitives::NodeInfo::new(
                    format!("node-{i}"),
                    "127.0.0.1",
                    9001,
                    mesh_primitives::NodeRole::Worker,
                )
            })
            .collect();
        let msg = GossipMessage::new("node-1", nodes);
        let frame = msg.to_wire(256).unwrap();
        assert!(frame.compressed);
        let decoded = GossipMessage::from_wire(frame).unwrap();
        assert_eq!(decoded.nodes.len(), 200);
    }
}
