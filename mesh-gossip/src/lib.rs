//! Peer discovery, failure detection, and adaptive metadata dissemination
//! (spec.md §4.2).

mod error;
mod interval;
mod service;
mod table;
mod wire;

pub use error::GossipError;
pub use interval::AdaptiveInterval;
pub use service::{GossipConfig, GossipService, ServiceProjection, StatusListener};
pub use table::{PeerTable, Transition};
pub use wire::{GossipMessage, WireFrame};
