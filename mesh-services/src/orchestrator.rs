use std::sync::Arc;

use async_trait::async_trait;
use mesh_gossip::PeerTable;
use mesh_lifecycle::{LifecycleManager, Service, ServiceInfo};
use mesh_orchestrator::{Manifest, Orchestrator};
use mesh_primitives::{MeshError, MethodParams};
use mesh_rpc::MethodRegistry;
use serde_json::json;

fn params_to_value(params: MethodParams) -> serde_json::Value {
    match params {
        MethodParams::Positional(values) => values.into_iter().next().unwrap_or(serde_json::Value::Null),
        MethodParams::Named(map) => serde_json::Value::Object(map),
    }
}

/// A generically-installed package (spec.md §4.6): the orchestrator has no
/// way to compile or interpret an arbitrary `main` module dropped on disk,
/// so what gets loaded back into the lifecycle manager after install is
/// this placeholder — it carries the manifest's identity and dependency
/// edges so the service participates in the DAG and shows up in
/// `/cluster/nodes`, without pretending to execute foreign code.
pub struct PackagedService {
    name: String,
    version: String,
    dependencies: Vec<String>,
}

impl PackagedService {
    pub fn from_manifest(service_name: &str, manifest: Option<&Manifest>) -> Self {
        match manifest {
            Some(m) => Self { name: m.name.clone(), version: m.version.clone(), dependencies: m.dependencies.clone() },
            None => Self { name: service_name.to_string(), version: "0.0.0".into(), dependencies: Vec::new() },
        }
    }
}

#[async_trait]
impl Service for PackagedService {
    fn info(&self) -> ServiceInfo {
        ServiceInfo {
            name: self.name.clone(),
            version: self.version.clone(),
            description: "installed package".into(),
            dependencies: self.dependencies.clone(),
            domain: "package".into(),
        }
    }

    async fn initialize(&self) -> Result<(), MeshError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), MeshError> {
        Ok(())
    }

    fn register_methods(&self, registry: &MethodRegistry) {
        let version = self.version.clone();
        registry.register(
            &self.name,
            "ping",
            true,
            "liveness probe for an installed package",
            Arc::new(move |_params: MethodParams| {
                let version = version.clone();
                Box::pin(async move { Ok(json!({ "ok": true, "version": version })) })
            }),
        );
    }
}

/// Exposes `orchestrator/{install_service, export_service,
/// distribute_service}` and, on a successful install, loads the resulting
/// `PackagedService` into the lifecycle manager (spec.md §4.6 "Install":
/// "...then ask the lifecycle component to load the service").
pub struct OrchestratorService {
    orchestrator: Arc<Orchestrator>,
    lifecycle: Arc<LifecycleManager>,
    table: Arc<PeerTable>,
}

impl OrchestratorService {
    pub fn new(orchestrator: Arc<Orchestrator>, lifecycle: Arc<LifecycleManager>, table: Arc<PeerTable>) -> Self {
        Self { orchestrator, lifecycle, table }
    }
}

#[async_trait]
impl Service for OrchestratorService {
    fn info(&self) -> ServiceInfo {
        ServiceInfo {
            name: "orchestrator".into(),
            version: "1.0.0".into(),
            description: "service package install/export/distribute".into(),
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
        let orchestrator = self.orchestrator.clone();
        let lifecycle = self.lifecycle.clone();
        registry.register(
            "orchestrator",
            "install_service",
            false,
            "validates and installs a service package archive",
            Arc::new(move |params: MethodParams| {
                let orchestrator = orchestrator.clone();
                let lifecycle = lifecycle.clone();
                Box::pin(async move {
                    let value = params_to_value(params);
                    let archive_hex = value
                        .get("archive")
                        .and_then(|v| v.as_str())
                        .ok_or_else(|| MeshError::Validation("install_service requires archive".into()))?;
                    let force_reinstall =
                        value.get("force_reinstall").and_then(|v| v.as_bool()).unwrap_or(false);
                    let archive = hex::decode(archive_hex)
                        .map_err(|e| MeshError::Validation(format!("archive is not valid hex: {e}")))?;

                    let result = orchestrator.install(&archive, force_reinstall).await.map_err(MeshError::from)?;
                    let manifest = orchestrator.meta_of(&result.service_name).and_then(|m| m.manifest);
                    let packaged = Arc::new(PackagedService::from_manifest(&result.service_name, manifest.as_ref()));
                    lifecycle.load(packaged);

                    Ok(json!(result))
                })
            }),
        );

        let orchestrator = self.orchestrator.clone();
        registry.register(
            "orchestrator",
            "export_service",
            false,
            "re-tars an installed service's directory",
            Arc::new(move |params: MethodParams| {
                let orchestrator = orchestrator.clone();
                Box::pin(async move {
                    let value = params_to_value(params);
                    let service_name = value
                        .get("service_name")
                        .and_then(|v| v.as_str())
                        .ok_or_else(|| MeshError::Validation("export_service requires service_name".into()))?;
                    let archive = orchestrator.export(service_name).map_err(MeshError::from)?;
                    Ok(json!({ "archive": hex::encode(archive) }))
                })
            }),
        );

        let orchestrator = self.orchestrator.clone();
        let table = self.table.clone();
        registry.register(
            "orchestrator",
            "distribute_service",
            false,
            "exports a service and pushes it to a set of target peers",
            Arc::new(move |params: MethodParams| {
                let orchestrator = orchestrator.clone();
                let table = table.clone();
                Box::pin(async move {
                    let value = params_to_value(params);
                    let service_name = value
                        .get("service_name")
                        .and_then(|v| v.as_str())
                        .ok_or_else(|| MeshError::Validation("distribute_service requires service_name".into()))?
                        .to_string();
                    let target_node_ids: Vec<String> = serde_json::from_value(
                        value
                            .get("target_nodes")
                            .cloned()
                            .ok_or_else(|| MeshError::Validation("distribute_service requires target_nodes".into()))?,
                    )
                    .map_err(|e| MeshError::Validation(e.to_string()))?;

                    let mut targets = Vec::with_capacity(target_node_ids.len());
                    for node_id in &target_node_ids {
                        let peer = table
                            .get(node_id)
                            .ok_or_else(|| MeshError::NotFound(format!("unknown peer: {node_id}")))?;
                        targets.push((node_id.clone(), peer.base_url()));
                    }

                    let results = orchestrator.distribute(&service_name, &targets).await.map_err(MeshError::from)?;
                    Ok(json!({ "results": results }))
                })
            }),
        );
    }
}
