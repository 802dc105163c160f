use std::sync::Arc;

use mesh_crypto::TokenService;
use mesh_gossip::PeerTable;
use mesh_primitives::{MeshError, MethodParams, NodeRole};
use mesh_transport::Transport;
use serde_json::{json, Value};

use crate::registry::MethodRegistry;

/// Routing qualifier for a proxied call (spec.md §4.4 "Uniform proxy",
/// and §9's design note replacing the source's dynamic attribute lookup
/// with an explicit builder).
#[derive(Debug, Clone)]
pub enum Target {
    Local,
    Peer(String),
    Role(NodeRole),
}

/// `proxy.service("name").target(Target).call("method", params)` — the
/// single call site business code uses whether the method lives in this
/// process or across the cluster.
pub struct Proxy {
    registry: Arc<MethodRegistry>,
    table: Arc<PeerTable>,
    transport: Arc<Transport>,
    tokens: Arc<TokenService>,
    self_node_id: String,
}

impl Proxy {
    pub fn new(
        registry: Arc<MethodRegistry>,
        table: Arc<PeerTable>,
        transport: Arc<Transport>,
        tokens: Arc<TokenService>,
        self_node_id: impl Into<String>,
    ) -> Self {
        Self { registry, table, transport, tokens, self_node_id: self_node_id.into() }
    }

    pub fn service<'a>(&'a self, name: &'a str) -> ServiceProxy<'a> {
        ServiceProxy { proxy: self, service: name, target: Target::Local }
    }
}

pub struct ServiceProxy<'a> {
    proxy: &'a Proxy,
    service: &'a str,
    target: Target,
}

impl<'a> ServiceProxy<'a> {
    pub fn target(mut self, target: Target) -> Self {
        self.target = target;
        self
    }

    pub async fn call(self, method: &str, params: MethodParams) -> Result<Value, MeshError> {
        let path = format!("{}/{}", self.service, method);
        match self.target {
            Target::Local => self.proxy.registry.dispatch(&path, params).await,
            Target::Peer(node_id) => self.proxy.call_remote(&node_id, &path, params).await,
            Target::Role(role) => {
                let node_id = self
                    .proxy
                    .table
                    .alive_peers()
                    .into_iter()
                    .find(|p| p.role == role)
                    .map(|p| p.node_id)
                    .ok_or_else(|| MeshError::NotFound(format!("no alive peer with role {:?}", role)))?;
                self.proxy.call_remote(&node_id, &path, params).await
            }
        }
    }
}

impl Proxy {
    async fn call_remote(
        &self,
        node_id: &str,
        path: &str,
        params: MethodParams,
    ) -> Result<Value, MeshError> {
        let peer = self
            .table
            .get(node_id)
            .ok_or_else(|| MeshError::NotFound(format!("unknown peer: {node_id}")))?;

        let body = match params {
            MethodParams::Positional(values) => json!({ "method": path, "params": values, "id": uuid::Uuid::new_v4().to_string() }),
            MethodParams::Named(map) => json!({ "method": path, "params": map, "id": uuid::Uuid::new_v4().to_string() }),
        };

        let token = self
            .tokens
            .issue(&self.self_node_id, true)
            .map_err(|err| MeshError::Auth(err.to_string()))?;
        let auth_header = format!("Bearer {token}");

        let response = self
            .transport
            .request_with_retry(&peer.base_url(), "/rpc", &body, &[("Authorization", &auth_header)])
            .await
            .map_err(|err| MeshError::Transport(err.to_string()))?;

        if let Some(error) = response.get("error") {
            return Err(MeshError::Remote {
                peer: node_id.to_string(),
                message: error.as_str().unwrap_or("remote error").to_string(),
            });
        }
        Ok(response.get("result").cloned().unwrap_or(Value::Null))
    }
}
