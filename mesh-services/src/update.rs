use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mesh_gossip::PeerTable;
use mesh_primitives::{now_unix, MeshError, MethodParams};
use mesh_rpc::MethodRegistry;
use mesh_transport::Transport;
use mesh_update::{BundleInfo, RolloutStrategy, UpdateEngine};
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use mesh_lifecycle::{Service, ServiceInfo};

fn params_to_value(params: MethodParams) -> Value {
    match params {
        MethodParams::Positional(values) => values.into_iter().next().unwrap_or(Value::Null),
        MethodParams::Named(map) => Value::Object(map),
    }
}

#[derive(Clone)]
struct CatalogEntry {
    info: BundleInfo,
    archive_hex: String,
    signature_hex: String,
}

/// Coordinator-side runtime update catalog (spec.md §4.7: "the coordinator
/// hosts the public key and a catalog of bundles"). Bundles are signed
/// offline and published here, not generated at runtime.
pub struct UpdateCatalogService {
    entries: Arc<RwLock<Vec<CatalogEntry>>>,
    table: Arc<PeerTable>,
    transport: Arc<Transport>,
    default_strategy: RolloutStrategy,
}

impl UpdateCatalogService {
    /// `rolling_interval_secs`/`max_failures` come from `mesh-config`'s
    /// `UpdateConfig` and become the rollout strategy for callers of
    /// `update/start_rollout` that omit one entirely.
    pub fn new(table: Arc<PeerTable>, transport: Arc<Transport>, rolling_interval_secs: u64, max_failures: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
            table,
            transport,
            default_strategy: RolloutStrategy::Rolling { interval_seconds: rolling_interval_secs, max_failures },
        }
    }

    /// Adds a pre-signed bundle to the catalog. Called by the operator
    /// tooling that produces signed releases, not exposed over RPC.
    pub fn publish(&self, info: BundleInfo, archive: &[u8], signature: &[u8; 64]) {
        self.entries.write().push(CatalogEntry {
            info,
            archive_hex: hex::encode(archive),
            signature_hex: hex::encode(signature),
        });
    }
}

#[async_trait]
impl Service for UpdateCatalogService {
    fn info(&self) -> ServiceInfo {
        ServiceInfo {
            name: "update".into(),
            version: "1.0.0".into(),
            description: "runtime update catalog and cluster rollout".into(),
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
        let entries = self.entries.clone();
        registry.register(
            "update",
            "catalog",
            false,
            "lists catalog bundles newer than the caller's current_version",
            Arc::new(move |params: MethodParams| {
                let entries = entries.clone();
                Box::pin(async move {
                    let value = params_to_value(params);
                    let node_role = value.get("node_role").and_then(|v| v.as_str()).unwrap_or_default().to_string();
                    let current_version =
                        value.get("current_version").and_then(|v| v.as_str()).unwrap_or("0.0.0").to_string();
                    let matches: Vec<BundleInfo> = entries
                        .read()
                        .iter()
                        .filter(|e| node_role.is_empty() || e.info.node_role == node_role)
                        .filter(|e| mesh_update::is_newer(&e.info.version, &current_version))
                        .map(|e| e.info.clone())
                        .collect();
                    Ok(json!(matches))
                })
            }),
        );

        let entries = self.entries.clone();
        registry.register(
            "update",
            "fetch_bundle",
            false,
            "returns the archive and detached signature for one catalog version",
            Arc::new(move |params: MethodParams| {
                let entries = entries.clone();
                Box::pin(async move {
                    let value = params_to_value(params);
                    let version = value
                        .get("version")
                        .and_then(|v| v.as_str())
                        .ok_or_else(|| MeshError::Validation("fetch_bundle requires version".into()))?;
                    let entries = entries.read();
                    let entry = entries
                        .iter()
                        .find(|e| e.info.version == version)
                        .ok_or_else(|| MeshError::NotFound(format!("no catalog entry for version {version}")))?;
                    Ok(json!({ "archive": entry.archive_hex, "signature": entry.signature_hex }))
                })
            }),
        );

        let table = self.table.clone();
        let transport = self.transport.clone();
        let default_strategy = self.default_strategy.clone();
        registry.register(
            "update",
            "start_rollout",
            false,
            "pushes a catalog version to target workers via their own update/apply RPC",
            Arc::new(move |params: MethodParams| {
                let table = table.clone();
                let transport = transport.clone();
                let default_strategy = default_strategy.clone();
                Box::pin(async move {
                    let value = params_to_value(params);
                    let strategy: RolloutStrategy = match value.get("strategy").cloned() {
                        Some(raw) => serde_json::from_value(raw).map_err(|e| MeshError::Validation(e.to_string()))?,
                        None => default_strategy,
                    };
                    let version = value
                        .get("version")
                        .and_then(|v| v.as_str())
                        .ok_or_else(|| MeshError::Validation("start_rollout requires version".into()))?
                        .to_string();
                    let target_node_ids: Vec<String> = serde_json::from_value(
                        value
                            .get("target_nodes")
                            .cloned()
                            .ok_or_else(|| MeshError::Validation("start_rollout requires target_nodes".into()))?,
                    )
                    .map_err(|e| MeshError::Validation(e.to_string()))?;

                    let mut targets = Vec::with_capacity(target_node_ids.len());
                    for node_id in &target_node_ids {
                        let peer =
                            table.get(node_id).ok_or_else(|| MeshError::NotFound(format!("unknown peer: {node_id}")))?;
                        targets.push((node_id.clone(), peer.base_url()));
                    }

                    let report = mesh_update::run_rollout(&strategy, &targets, |_node_id, base_url| {
                        let transport = transport.clone();
                        let version = version.clone();
                        async move {
                            let body = json!({
                                "method": "update/apply",
                                "params": { "version": version },
                                "id": Uuid::new_v4().to_string(),
                            });
                            match transport.request(&base_url, "/rpc", &body, &[]).await {
                                Ok(resp) if resp.get("error").is_none() => Ok(()),
                                Ok(resp) => Err(resp
                                    .get("error")
                                    .and_then(|e| e.as_str())
                                    .unwrap_or("remote error")
                                    .to_string()),
                                Err(err) => Err(err.to_string()),
                            }
                        }
                    })
                    .await;
                    Ok(json!(report))
                })
            }),
        );
    }
}

/// Worker-side update runner (spec.md §4.7 "Worker update flow"): polls the
/// coordinator's catalog on an interval and applies the newest matching
/// bundle; also exposes `update/apply` so a coordinator-driven rollout can
/// push a specific version immediately, reusing the same install path.
pub struct UpdateWorkerService {
    engine: Arc<UpdateEngine>,
    node_role: String,
    current_version: RwLock<String>,
    poll_interval: Duration,
    tick_task: Mutex<Option<JoinHandle<()>>>,
}

impl UpdateWorkerService {
    pub fn new(engine: Arc<UpdateEngine>, node_role: String, current_version: String, poll_interval: Duration) -> Self {
        Self {
            engine,
            node_role,
            current_version: RwLock::new(current_version),
            poll_interval,
            tick_task: Mutex::new(None),
        }
    }

    async fn check_and_apply_newest(engine: &UpdateEngine, node_role: &str, current: &str) -> Option<String> {
        let candidates = match engine.check_updates(current, node_role).await {
            Ok(c) => c,
            Err(err) => {
                warn!(error = %err, "update check failed");
                return None;
            }
        };
        let newest = candidates.into_iter().max_by(|a, b| a.version.cmp(&b.version))?;
        match engine.install_update(&newest, current, now_unix()).await {
            Ok(new_version) => {
                info!(version = %new_version, "runtime update applied");
                Some(new_version)
            }
            Err(err) => {
                warn!(version = %newest.version, error = %err, "runtime update failed, rolled back");
                None
            }
        }
    }
}

#[async_trait]
impl Service for UpdateWorkerService {
    fn info(&self) -> ServiceInfo {
        ServiceInfo {
            name: "update".into(),
            version: "1.0.0".into(),
            description: "runtime self-update worker".into(),
            dependencies: Vec::new(),
            domain: "core".into(),
        }
    }

    async fn initialize(&self) -> Result<(), MeshError> {
        let engine = self.engine.clone();
        let node_role = self.node_role.clone();
        let interval = self.poll_interval;
        let mut current = self.current_version.read().clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if let Some(new_version) = Self::check_and_apply_newest(&engine, &node_role, &current).await {
                    current = new_version;
                }
            }
        });
        *self.tick_task.lock() = Some(handle);
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), MeshError> {
        if let Some(handle) = self.tick_task.lock().take() {
            handle.abort();
        }
        Ok(())
    }

    fn register_methods(&self, registry: &MethodRegistry) {
        let engine = self.engine.clone();
        let node_role = self.node_role.clone();
        registry.register(
            "update",
            "apply",
            false,
            "applies a specific catalog version immediately, for coordinator-driven rollout",
            Arc::new(move |params: MethodParams| {
                let engine = engine.clone();
                let node_role = node_role.clone();
                Box::pin(async move {
                    let value = params_to_value(params);
                    let version = value
                        .get("version")
                        .and_then(|v| v.as_str())
                        .ok_or_else(|| MeshError::Validation("apply requires version".into()))?
                        .to_string();
                    // The worker has no local notion of "current_version" reachable
                    // from this handler without another shared field; `0.0.0`
                    // ensures `check_updates` never filters the requested version
                    // out, and `install_update` itself is idempotent-safe to re-run.
                    let candidates = engine.check_updates("0.0.0", &node_role).await.map_err(MeshError::from)?;
                    let target = candidates
                        .into_iter()
                        .find(|c| c.version == version)
                        .ok_or_else(|| MeshError::NotFound(format!("version {version} not in coordinator catalog")))?;
                    let new_version =
                        engine.install_update(&target, "0.0.0", now_unix()).await.map_err(MeshError::from)?;
                    Ok(json!({ "accepted": true, "version": new_version }))
                })
            }),
        );
    }
}
