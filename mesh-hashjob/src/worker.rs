use std::sync::Arc;

use mesh_gossip::PeerTable;
use mesh_primitives::NodeRole;
use mesh_rpc::Proxy;
use serde_json::json;
use tracing::{info, warn};

use crate::error::HashJobError;
use crate::pool::optimal_worker_count;
use crate::types::{ChunkStatus, HashBatch, HashJob, Solution, WorkerStatus};

const JOB_METADATA_PREFIX: &str = "hash_job_";
const BATCH_METADATA_PREFIX: &str = "hash_batches_";
const WORKER_STATUS_KEY: &str = "hash_worker_status";

/// One claimable unit discovered from gossip: the job, its current batch,
/// and the index of a chunk assigned to this worker with
/// `status ∈ {assigned, recovery}` (spec.md §4.8 step 2).
pub struct ClaimedChunk {
    pub job: HashJob,
    pub chunk_index: usize,
}

/// Worker-side chunk discovery, claiming, and reporting (spec.md §4.8 step
/// 2-3). Reads the coordinator's published job/batch metadata from the
/// peer table and writes its own progress back into its own metadata plus
/// an RPC call for the final solution report.
pub struct ChunkWorker {
    table: Arc<PeerTable>,
    proxy: Proxy,
    pool_ceiling: usize,
    progress_interval: u64,
}

impl ChunkWorker {
    pub fn new(table: Arc<PeerTable>, proxy: Proxy, pool_ceiling: usize, progress_interval: u64) -> Self {
        Self { table, proxy, pool_ceiling, progress_interval }
    }

    fn coordinator_metadata(&self, key_prefix: &str, job_id: &str) -> Option<String> {
        let key = format!("{key_prefix}{job_id}");
        self.table
            .alive_peers()
            .into_iter()
            .find(|p| p.role == NodeRole::Coordinator)
            .and_then(|coordinator| coordinator.metadata.get(&key).cloned())
            .map(|v| v.value)
    }

    /// Scans every known job for a chunk assigned to this node whose status
    /// is still claimable, preferring the first match.
    pub fn find_claimable(&self) -> Option<ClaimedChunk> {
        let self_id = self.table.self_id().to_string();
        let coordinator = self.table.alive_peers().into_iter().find(|p| p.role == NodeRole::Coordinator)?;

        for (key, value) in coordinator.metadata.iter() {
            let Some(job_id) = key.strip_prefix(JOB_METADATA_PREFIX) else { continue };
            let Ok(job): Result<HashJob, _> = serde_json::from_str(&value.value) else { continue };
            let Some(batch_value) = coordinator.metadata.get(&format!("{BATCH_METADATA_PREFIX}{job_id}")) else {
                continue;
            };
            let Ok(batch): Result<HashBatch, _> = serde_json::from_str(&batch_value.value) else { continue };

            if let Some(chunk_index) = batch.chunks.iter().position(|c| {
                c.assigned_worker == self_id
                    && matches!(c.status, ChunkStatus::Assigned | ChunkStatus::Recovery)
            }) {
                return Some(ClaimedChunk { job, chunk_index });
            }
        }
        None
    }

    fn set_chunk_working(&self, job_id: &str, chunk_start: u64) {
        let mut status = self.own_status();
        status.chunks.entry(job_id.to_string()).or_default().insert(chunk_start, ChunkStatus::Working);
        self.publish_status(&status);
    }

    fn own_status(&self) -> WorkerStatus {
        self.table
            .self_metadata(WORKER_STATUS_KEY)
            .and_then(|v| serde_json::from_str(&v.value).ok())
            .unwrap_or_default()
    }

    fn publish_status(&self, status: &WorkerStatus) {
        if let Ok(json) = serde_json::to_string(status) {
            self.table.set_self_metadata(WORKER_STATUS_KEY, json);
        }
    }

    /// Claims, computes, and reports one chunk (spec.md §4.8 steps 2-3).
    /// Returns the solutions found, if any. The caller is expected to call
    /// this repeatedly from a background loop.
    pub async fn process_one(&self) -> Result<Vec<Solution>, HashJobError> {
        let Some(claim) = self.find_claimable() else { return Ok(Vec::new()) };
        let Some(batch_value) = self.coordinator_metadata(BATCH_METADATA_PREFIX, &claim.job.id) else {
            return Ok(Vec::new());
        };
        let batch: HashBatch = serde_json::from_str(&batch_value)?;
        let chunk = batch.chunks[claim.chunk_index].clone();

        self.set_chunk_working(&claim.job.id, chunk.start);

        let pool_size = optimal_worker_count(self.pool_ceiling);
        let progress_interval = self.progress_interval;
        let spec = claim.job.spec.clone();
        let chunk_for_compute = chunk.clone();
        let result = tokio::task::spawn_blocking(move || {
            crate::compute::compute_chunk(&spec, &chunk_for_compute, pool_size, progress_interval)
        })
        .await
        .map_err(|e| HashJobError::InvalidSpec(format!("worker pool task panicked: {e}")))??;

        let mut status = self.own_status();
        status.hashes_computed += result.hashes_computed;
        status.chunks.entry(claim.job.id.clone()).or_default().insert(chunk.start, ChunkStatus::Solved);
        self.publish_status(&status);

        for solution in &result.solutions {
            if let Err(err) = self.report_solution(&claim.job.id, solution).await {
                warn!(job_id = %claim.job.id, error = %err, "failed to report solution over RPC");
            }
        }

        info!(job_id = %claim.job.id, chunk_start = chunk.start, hashes = result.hashes_computed, "chunk processed");
        Ok(result.solutions)
    }

    async fn report_solution(&self, job_id: &str, solution: &Solution) -> Result<(), HashJobError> {
        let params = mesh_primitives::MethodParams::from_value(json!({ "job_id": job_id, "solution": solution }));
        self.proxy
            .service("hash_coordinator")
            .target(mesh_rpc::Target::Role(NodeRole::Coordinator))
            .call("report_solution", params)
            .await?;
        Ok(())
    }
}
