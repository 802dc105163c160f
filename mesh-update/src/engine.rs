use std::path::{Path, PathBuf};

use ed25519_dalek::VerifyingKey;
use mesh_crypto::TokenService;
use mesh_transport::Transport;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::backup::{create_backup, prune_backups, restore_backup};
use crate::bundle::{verify_bundle, Bundle, BundleInfo};
use crate::error::UpdateError;
use crate::semver::is_newer;

/// Directories copied into a timestamped backup before an in-place update,
/// and restored from on rollback.
pub struct UpdateLayout {
    pub live_dirs: Vec<PathBuf>,
    pub backup_root: PathBuf,
    pub backup_retention: usize,
}

/// Runtime self-update flow, driven from the worker side (spec.md §4.7
/// "Worker update flow").
pub struct UpdateEngine {
    coordinator_url: String,
    transport: std::sync::Arc<Transport>,
    tokens: std::sync::Arc<TokenService>,
    self_node_id: String,
    public_key: VerifyingKey,
    layout: UpdateLayout,
}

impl UpdateEngine {
    pub fn new(
        coordinator_url: String,
        transport: std::sync::Arc<Transport>,
        tokens: std::sync::Arc<TokenService>,
        self_node_id: String,
        public_key: VerifyingKey,
        layout: UpdateLayout,
    ) -> Self {
        Self { coordinator_url, transport, tokens, self_node_id, public_key, layout }
    }

    /// Issues a bearer token for this node and calls `method` at the
    /// coordinator's `/rpc` endpoint, unwrapping `{result, error, id}` the
    /// same way `mesh-rpc::Proxy::call_remote` does (this crate has no
    /// dependency on `mesh-rpc` itself, so the envelope is reproduced here).
    async fn call_coordinator(&self, method: &str, params: Value) -> Result<Value, UpdateError> {
        let body = json!({ "method": method, "params": params, "id": uuid::Uuid::new_v4().to_string() });
        let token = self
            .tokens
            .issue(&self.self_node_id, true)
            .map_err(|err| UpdateError::Malformed(err.to_string()))?;
        let auth_header = format!("Bearer {token}");
        let response = self
            .transport
            .request(&self.coordinator_url, "/rpc", &body, &[("Authorization", &auth_header)])
            .await?;
        if let Some(error) = response.get("error") {
            return Err(UpdateError::Malformed(error.as_str().unwrap_or("remote error").to_string()));
        }
        Ok(response.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Asks the coordinator for catalog entries newer than `current_version`
    /// (spec.md §4.7 step 1).
    pub async fn check_updates(
        &self,
        current_version: &str,
        node_role: &str,
    ) -> Result<Vec<BundleInfo>, UpdateError> {
        let params = json!({ "node_role": node_role, "current_version": current_version });
        let result = self.call_coordinator("update/catalog", params).await?;
        let catalog: Vec<BundleInfo> = serde_json::from_value(result)?;
        Ok(catalog.into_iter().filter(|entry| is_newer(&entry.version, current_version)).collect())
    }

    /// Downloads, verifies, backs up, extracts, and — on any failure from
    /// extraction onward — restores the prior state (spec.md §4.7 steps
    /// 2-5 and "Failure rollback"). Returns the new version on success.
    pub async fn install_update(
        &self,
        info: &BundleInfo,
        current_version: &str,
        timestamp: i64,
    ) -> Result<String, UpdateError> {
        let bundle = self.fetch_bundle(info).await?;
        verify_bundle(&bundle, &self.public_key)?;

        let backup_dir =
            create_backup(&self.layout.live_dirs, &self.layout.backup_root, current_version, timestamp)?;

        match self.extract_and_apply(&bundle).await {
            Ok(()) => {
                prune_backups(&self.layout.backup_root, self.layout.backup_retention)?;
                info!(version = %info.version, "update installed");
                Ok(info.version.clone())
            }
            Err(err) => {
                warn!(error = %err, "update failed, restoring from backup");
                for dir in &self.layout.live_dirs {
                    if let Some(parent) = dir.parent() {
                        restore_backup(&backup_dir, parent)?;
                    }
                }
                Err(err)
            }
        }
    }

    async fn fetch_bundle(&self, info: &BundleInfo) -> Result<Bundle, UpdateError> {
        let params = json!({ "version": info.version });
        let result = self.call_coordinator("update/fetch_bundle", params).await?;
        let archive_hex = result
            .get("archive")
            .and_then(|v| v.as_str())
            .ok_or_else(|| UpdateError::Malformed("bundle response missing archive".into()))?;
        let signature_hex = result
            .get("signature")
            .and_then(|v| v.as_str())
            .ok_or_else(|| UpdateError::Malformed("bundle response missing signature".into()))?;

        let archive = hex::decode(archive_hex)
            .map_err(|e| UpdateError::Malformed(format!("archive is not valid hex: {e}")))?;
        let signature_bytes = hex::decode(signature_hex)
            .map_err(|e| UpdateError::Malformed(format!("signature is not valid hex: {e}")))?;
        let signature: [u8; 64] = signature_bytes
            .try_into()
            .map_err(|_| UpdateError::Malformed("signature must be 64 bytes".into()))?;

        Ok(Bundle { info: info.clone(), archive, signature })
    }

    /// Extracts the bundle into a scratch directory, then copies each
    /// top-level entry atop the live layout (spec.md §4.7 step 4).
    async fn extract_and_apply(&self, bundle: &Bundle) -> Result<(), UpdateError> {
        let scratch = tempfile::tempdir()?;
        extract_tar_gz(&bundle.archive, scratch.path())?;

        for dir in &self.layout.live_dirs {
            let name = dir.file_name().ok_or_else(|| {
                UpdateError::Malformed(format!("live dir has no file name: {}", dir.display()))
            })?;
            let extracted = scratch.path().join(name);
            if !extracted.exists() {
                continue;
            }
            copy_over(&extracted, dir)?;
        }
        Ok(())
    }
}

fn extract_tar_gz(bytes: &[u8], dest: &Path) -> Result<(), UpdateError> {
    let decoder = flate2::read::GzDecoder::new(bytes);
    let mut archive = tar::Archive::new(decoder);
    archive.unpack(dest)?;
    Ok(())
}

fn copy_over(src: &Path, dst: &Path) -> Result<(), UpdateError> {
    if dst.exists() {
        if dst.is_dir() {
            std::fs::remove_dir_all(dst)?;
        } else {
            std::fs::remove_file(dst)?;
        }
    }
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent)?;
    }
    copy_recursive(src, dst)
}

fn copy_recursive(src: &Path, dst: &Path) -> Result<(), UpdateError> {
    if src.is_dir() {
        std::fs::create_dir_all(dst)?;
        for entry in std::fs::read_dir(src)? {
            let entry = entry?;
            copy_recursive(&entry.path(), &dst.join(entry.file_name()))?;
        }
    } else {
        std::fs::copy(src, dst)?;
    }
    Ok(())
}
