use std::time::Instant;

use async_trait::async_trait;
use mesh_primitives::{MeshError, MethodParams, NodeRole};
use mesh_rpc::MethodRegistry;
use serde_json::json;

use mesh_lifecycle::{Service, ServiceInfo};

/// Reports this node's hostname, role, and uptime at `system/get_system_info`
/// (spec.md §8 scenario S3: role-qualified routing resolves this the same
/// way regardless of which node the call originates from).
pub struct SystemInfoService {
    role: NodeRole,
    started_at: Instant,
}

impl SystemInfoService {
    pub fn new(role: NodeRole) -> Self {
        Self { role, started_at: Instant::now() }
    }
}

#[async_trait]
impl Service for SystemInfoService {
    fn info(&self) -> ServiceInfo {
        ServiceInfo {
            name: "system".into(),
            version: "1.0.0".into(),
            description: "host introspection".into(),
            dependencies: Vec::new(),
            domain: "core".into(),
        }
    }

    async fn initialize(&self) -> Result<(), MeshError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), MeshError> {
        Ok(())
    }

    fn register_methods(&self, registry: &MethodRegistry) {
        let role = self.role;
        let started_at = self.started_at;
        registry.register(
            "system",
            "get_system_info",
            true,
            "hostname, role, and uptime of this node",
            std::sync::Arc::new(move |_params: MethodParams| {
                let hostname = hostname::get()
                    .ok()
                    .and_then(|h| h.into_string().ok())
                    .unwrap_or_else(|| "unknown".to_string());
                let payload = json!({
                    "hostname": hostname,
                    "role": role.as_str(),
                    "uptime_seconds": started_at.elapsed().as_secs(),
                });
                Box::pin(async move { Ok(payload) })
            }),
        );
    }
}
