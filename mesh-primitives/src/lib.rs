//! Shared types and error kinds used across every `mesh-*` crate.
//!
//! Nothing in this crate talks to the network or the filesystem; it only
//! defines the vocabulary the rest of the workspace shares, the way
//! `near-primitives` is the common vocabulary for the rest of nearcore.

mod error;
mod node;
mod service;

pub use error::MeshError;
pub use node::{NodeInfo, NodeRole, NodeStatus, ServiceSummary, VersionedValue};
pub use service::{MethodEntry, MethodParams};

/// Monotonic logical clock in seconds since the Unix epoch, used wherever
/// `spec.md` talks about `last_seen` / `timestamp` without requiring
/// wall-clock precision finer than a second.
pub fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}
