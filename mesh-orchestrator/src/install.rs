use std::path::{Path, PathBuf};
use std::sync::Arc;

use mesh_lifecycle::LifecycleManager;
use mesh_transport::Transport;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::error::OrchestratorError;
use crate::package::{self, Manifest, ParsedPackage};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageMeta {
    pub installed_at: i64,
    pub archive_hash: String,
    pub manifest: Option<Manifest>,
    pub files_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstallResult {
    pub success: bool,
    pub service_name: String,
    pub auto_started: bool,
}

/// Package install/export/distribute (spec.md §4.6). `services_dir` is
/// typically `state_directory/services`.
pub struct Orchestrator {
    services_dir: PathBuf,
    lifecycle: Arc<LifecycleManager>,
    transport: Arc<Transport>,
}

impl Orchestrator {
    pub fn new(services_dir: PathBuf, lifecycle: Arc<LifecycleManager>, transport: Arc<Transport>) -> Self {
        Self { services_dir, lifecycle, transport }
    }

    fn install_dir(&self, service_name: &str) -> PathBuf {
        self.services_dir.join(service_name)
    }

    fn meta_path(&self, service_name: &str) -> PathBuf {
        self.services_dir.join(format!(".{service_name}.meta.json"))
    }

    pub fn meta_of(&self, service_name: &str) -> Option<PackageMeta> {
        let bytes = std::fs::read(self.meta_path(service_name)).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    /// Validates, stops any running instance, replaces the on-disk
    /// directory, and records install metadata. Loading the reloaded
    /// service back into the lifecycle manager is the caller's
    /// responsibility (it requires a concrete `Service` impl this crate
    /// has no way to construct from raw files alone; see
    /// `mesh-services::PackagedService` for the loader this produces
    /// input for).
    pub async fn install(
        &self,
        archive_bytes: &[u8],
        force_reinstall: bool,
    ) -> Result<InstallResult, OrchestratorError> {
        let parsed = package::validate_archive(archive_bytes)?;
        let already_installed = self.install_dir(&parsed.service_name).exists();

        if already_installed && !force_reinstall {
            return Err(OrchestratorError::AlreadyInstalled(parsed.service_name));
        }

        if already_installed {
            if let Err(err) = self.lifecycle.stop_if_running(&parsed.service_name).await {
                tracing::warn!(service = %parsed.service_name, error = %err, "service did not stop cleanly before reinstall");
            }
            std::fs::remove_dir_all(self.install_dir(&parsed.service_name))?;
        }

        let files_count = package::write_files(&self.install_dir(&parsed.service_name), &parsed)?;
        self.write_meta(&parsed, files_count)?;

        info!(service = %parsed.service_name, files = files_count, "service package installed");
        Ok(InstallResult { success: true, service_name: parsed.service_name, auto_started: true })
    }

    fn write_meta(&self, parsed: &ParsedPackage, files_count: usize) -> Result<(), OrchestratorError> {
        let meta = PackageMeta {
            installed_at: mesh_primitives::now_unix(),
            archive_hash: parsed.archive_hash.clone(),
            manifest: parsed.manifest.clone(),
            files_count,
        };
        std::fs::write(self.meta_path(&parsed.service_name), serde_json::to_vec_pretty(&meta)?)?;
        Ok(())
    }

    pub fn export(&self, service_name: &str) -> Result<Vec<u8>, OrchestratorError> {
        let dir = self.install_dir(service_name);
        if !dir.exists() {
            return Err(OrchestratorError::NotInstalled(service_name.to_string()));
        }
        package::export_directory(&dir, service_name)
    }

    /// Exports once, then POSTs the bytes to each target's
    /// `orchestrator/install_service` RPC path. Partial failure across
    /// targets is reported, not rolled back (spec.md §4.6 "Distribute").
    pub async fn distribute(
        &self,
        service_name: &str,
        targets: &[(String, String)],
    ) -> Result<Vec<serde_json::Value>, OrchestratorError> {
        let archive = self.export(service_name)?;
        let mut results = Vec::with_capacity(targets.len());
        for (node_id, base_url) in targets {
            let body = json!({ "archive": hex::encode(&archive), "force_reinstall": true });
            match self.transport.request(base_url, "/rpc", &body, &[]).await {
                Ok(response) => {
                    results.push(json!({ "node_id": node_id, "ok": true, "response": response }))
                }
                Err(err) => {
                    results.push(json!({ "node_id": node_id, "ok": false, "error": err.to_string() }))
                }
            }
        }
        Ok(results)
    }

    /// Compares `local_version` to the coordinator-reported `remote_version`
    /// (spec.md §4.6 "Versioned upgrade"): if the coordinator is newer,
    /// fetch-and-install with `force_reinstall = true` is the caller's next
    /// step once it has the bytes.
    pub fn needs_upgrade(local_version: &str, remote_version: &str) -> bool {
        remote_version != local_version
    }
}

pub fn services_root(state_directory: &Path) -> PathBuf {
    state_directory.join("services")
}
