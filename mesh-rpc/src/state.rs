use std::sync::Arc;
use std::time::Instant;

use mesh_crypto::{Ca, TokenService};
use mesh_gossip::GossipService;
use mesh_primitives::NodeRole;
use mesh_transport::Transport;

use crate::registry::MethodRegistry;
use crate::proxy::Proxy;

/// Everything the HTTP layer needs to serve a request. Built once by
/// `mesh-node` and shared (via `actix_web::web::Data`) across workers;
/// this is the only "global" the application has, per spec.md §9's
/// ambient-context design note.
pub struct RpcState {
    pub node_id: String,
    pub role: NodeRole,
    pub registry: Arc<MethodRegistry>,
    pub gossip: Arc<GossipService>,
    pub tokens: Arc<TokenService>,
    pub transport: Arc<Transport>,
    /// Present only on the coordinator: the cluster CA used to sign
    /// worker leaf certificates during bootstrap (spec.md §4.3).
    pub ca: Option<Arc<Ca>>,
    pub started_at: Instant,
}

impl RpcState {
    pub fn new(
        node_id: impl Into<String>,
        role: NodeRole,
        registry: Arc<MethodRegistry>,
        gossip: Arc<GossipService>,
        tokens: Arc<TokenService>,
        transport: Arc<Transport>,
        ca: Option<Arc<Ca>>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            role,
            registry,
            gossip,
            tokens,
            transport,
            ca,
            started_at: Instant::now(),
        }
    }

    pub fn proxy(&self) -> Proxy {
        Proxy::new(
            self.registry.clone(),
            self.gossip.table.clone(),
            self.transport.clone(),
            self.tokens.clone(),
            self.node_id.clone(),
        )
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
