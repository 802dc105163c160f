use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use mesh_gossip::PeerTable;
use mesh_primitives::{now_unix, NodeRole};
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::error::HashJobError;
use crate::types::{Chunk, ChunkStatus, HashBatch, HashJob, JobSpec, JobStatus, Solution};

const JOB_METADATA_PREFIX: &str = "hash_job_";
const BATCH_METADATA_PREFIX: &str = "hash_batches_";

/// Coordinator-side job lifecycle (spec.md §4.8 "Job lifecycle (coordinator
/// side)"). Owns chunk minting, lookahead refill, and failure recovery;
/// publication into gossip is left to the caller via `publish` so this type
/// has no direct dependency on the gossip round-trip timing.
pub struct JobCoordinator {
    table: Arc<PeerTable>,
    jobs: RwLock<HashMap<String, HashJob>>,
    batches: RwLock<HashMap<String, HashBatch>>,
    solutions: RwLock<HashMap<String, HashSet<Solution>>>,
    hashes_computed: RwLock<HashMap<String, AtomicU64>>,
    lookahead_batches: usize,
    base_chunk_size: u64,
}

impl JobCoordinator {
    pub fn new(table: Arc<PeerTable>, lookahead_batches: usize, base_chunk_size: u64) -> Self {
        Self {
            table,
            jobs: RwLock::new(HashMap::new()),
            batches: RwLock::new(HashMap::new()),
            solutions: RwLock::new(HashMap::new()),
            hashes_computed: RwLock::new(HashMap::new()),
            lookahead_batches,
            base_chunk_size,
        }
    }

    fn alive_worker_ids(&self) -> Vec<String> {
        self.table
            .alive_peers()
            .into_iter()
            .filter(|p| p.role == NodeRole::Worker)
            .map(|p| p.node_id)
            .collect()
    }

    /// Seeds batch version 0 with `lookahead_batches * alive_workers` chunks
    /// round-robin assigned, and publishes the job + batch into gossip
    /// (spec.md §4.8 step 1).
    pub fn create_job(&self, job_id: String, spec: JobSpec) -> Result<HashJob, HashJobError> {
        spec.validate()?;
        let total_space = spec.total_space()?;
        let workers = self.alive_worker_ids();
        if workers.is_empty() {
            return Err(HashJobError::InvalidSpec("no alive workers to assign chunks to".into()));
        }

        let job = HashJob { id: job_id.clone(), spec, total_space, created_at: now_unix() };
        let chunk_count = self.lookahead_batches * workers.len();
        let chunks = mint_chunks(0, self.base_chunk_size, chunk_count, total_space, &workers);
        let batch = HashBatch { job_id: job_id.clone(), version: 0, chunks };

        self.jobs.write().insert(job_id.clone(), job.clone());
        self.batches.write().insert(job_id.clone(), batch.clone());
        self.solutions.write().insert(job_id.clone(), HashSet::new());
        self.hashes_computed.write().insert(job_id.clone(), AtomicU64::new(0));
        self.publish(&job_id);

        info!(job_id = %job_id, total_space, workers = workers.len(), "hash job created");
        Ok(job)
    }

    /// Maintains `lookahead_batches` unclaimed chunks per alive worker,
    /// minting a new batch version when any worker runs low (spec.md §4.8
    /// step 4).
    pub fn top_up_lookahead(&self, job_id: &str) -> Result<(), HashJobError> {
        let job = self.jobs.read().get(job_id).cloned().ok_or_else(|| HashJobError::UnknownJob(job_id.into()))?;
        let workers = self.alive_worker_ids();
        let mut batches = self.batches.write();
        let batch = batches.get_mut(job_id).ok_or_else(|| HashJobError::UnknownJob(job_id.into()))?;

        if batch.next_start() >= job.total_space {
            return Ok(());
        }

        let mut needed_per_worker: Vec<(String, usize)> = workers
            .iter()
            .map(|w| (w.clone(), self.lookahead_batches.saturating_sub(batch.unclaimed_count_for(w))))
            .filter(|(_, need)| *need > 0)
            .collect();
        if needed_per_worker.is_empty() {
            return Ok(());
        }

        let total_new: usize = needed_per_worker.iter().map(|(_, n)| n).sum();
        let assignees: Vec<String> = {
            let mut list = Vec::with_capacity(total_new);
            while list.len() < total_new {
                for (worker, need) in needed_per_worker.iter_mut() {
                    if *need > 0 && list.len() < total_new {
                        list.push(worker.clone());
                        *need -= 1;
                    }
                }
            }
            list
        };

        let start = batch.next_start();
        let new_chunks = mint_chunks(start, self.base_chunk_size, assignees.len(), job.total_space, &assignees);
        if new_chunks.is_empty() {
            return Ok(());
        }
        batch.chunks.extend(new_chunks);
        batch.version += 1;
        drop(batches);
        self.publish(job_id);
        Ok(())
    }

    /// Re-mints a dead worker's unfinished chunks as `recovery` on a
    /// survivor, round-robin (spec.md §4.8 step 4, "Failure semantics").
    pub fn handle_worker_death(&self, job_id: &str, dead_worker: &str) -> Result<(), HashJobError> {
        let survivors = self.alive_worker_ids();
        if survivors.is_empty() {
            warn!(job_id, dead_worker, "worker died with no survivors to recover its chunks");
            return Ok(());
        }
        let mut batches = self.batches.write();
        let batch = batches.get_mut(job_id).ok_or_else(|| HashJobError::UnknownJob(job_id.into()))?;

        let mut changed = false;
        let mut cursor = 0usize;
        for chunk in batch.chunks.iter_mut() {
            if chunk.assigned_worker == dead_worker
                && matches!(chunk.status, ChunkStatus::Assigned | ChunkStatus::Working)
            {
                chunk.assigned_worker = survivors[cursor % survivors.len()].clone();
                chunk.status = ChunkStatus::Recovery;
                cursor += 1;
                changed = true;
            }
        }
        if changed {
            batch.version += 1;
            drop(batches);
            self.publish(job_id);
            info!(job_id, dead_worker, "recovered chunks from dead worker");
        }
        Ok(())
    }

    /// Called from the `hash_coordinator/report_solution` RPC path so the
    /// coordinator learns a result within one round trip even under gossip
    /// latency (spec.md §4.8 step 3).
    pub fn report_solution(&self, job_id: &str, solution: Solution) -> Result<(), HashJobError> {
        let mut solutions = self.solutions.write();
        let set = solutions.entry(job_id.to_string()).or_default();
        set.insert(solution);
        Ok(())
    }

    pub fn record_progress(&self, job_id: &str, hashes: u64) {
        let counters = self.hashes_computed.read();
        if let Some(counter) = counters.get(job_id) {
            counter.fetch_add(hashes, Ordering::Relaxed);
        }
    }

    pub fn job_ids(&self) -> Vec<String> {
        self.jobs.read().keys().cloned().collect()
    }

    pub fn job_status(&self, job_id: &str) -> Result<JobStatus, HashJobError> {
        let job = self.jobs.read().get(job_id).cloned().ok_or_else(|| HashJobError::UnknownJob(job_id.into()))?;
        let solutions: Vec<Solution> =
            self.solutions.read().get(job_id).cloned().unwrap_or_default().into_iter().collect();
        let hashes_computed =
            self.hashes_computed.read().get(job_id).map(|c| c.load(Ordering::Relaxed)).unwrap_or(0);
        let batch = self.batches.read().get(job_id).cloned();
        let completed = batch.map(|b| b.chunks.iter().all(|c| c.status == ChunkStatus::Solved)).unwrap_or(false);
        Ok(JobStatus { job_id: job_id.to_string(), total_space: job.total_space, hashes_computed, solutions, completed })
    }

    fn publish(&self, job_id: &str) {
        let Some(job) = self.jobs.read().get(job_id).cloned() else { return };
        let Some(batch) = self.batches.read().get(job_id).cloned() else { return };
        if let Ok(job_json) = serde_json::to_string(&job) {
            self.table.set_self_metadata(format!("{JOB_METADATA_PREFIX}{job_id}"), job_json);
        }
        if let Ok(batch_json) = serde_json::to_string(&batch) {
            self.table.set_self_metadata(format!("{BATCH_METADATA_PREFIX}{job_id}"), batch_json);
        }
    }
}

fn mint_chunks(
    start: u64,
    chunk_size: u64,
    count: usize,
    total_space: u64,
    assignees: &[String],
) -> Vec<Chunk> {
    let mut chunks = Vec::with_capacity(count);
    let mut cursor = start;
    for i in 0..count {
        if cursor >= total_space {
            break;
        }
        let end = (cursor + chunk_size).min(total_space);
        chunks.push(Chunk {
            start: cursor,
            end,
            assigned_worker: assignees[i % assignees.len()].clone(),
            status: ChunkStatus::Assigned,
        });
        cursor = end;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{HashAlgo, JobMode};
    use mesh_primitives::{NodeInfo, NodeRole as Role};

    fn table_with_workers(names: &[&str]) -> Arc<PeerTable> {
        let table = Arc::new(PeerTable::new(NodeInfo::new("coordinator", "127.0.0.1", 9001, Role::Coordinator)));
        for name in names {
            table.merge_one(NodeInfo::new(*name, "127.0.0.1", 9002, Role::Worker));
        }
        table
    }

    fn brute_spec(target: &str) -> JobSpec {
        JobSpec {
            mode: JobMode::Brute,
            hash_algo: HashAlgo::Sha256,
            target_hash: Some(target.to_string()),
            target_hashes: vec![],
            charset: "abc".into(),
            length: 3,
            wordlist: vec![],
            mutations: vec![],
            ssid: None,
        }
    }

    #[test]
    fn create_job_seeds_round_robin_chunks() {
        let table = table_with_workers(&["w1", "w2"]);
        let coordinator = JobCoordinator::new(table, 2, 10);
        let job = coordinator.create_job("job-1".into(), brute_spec("deadbeef")).unwrap();
        assert_eq!(job.total_space, 27);

        let batch = coordinator.batches.read().get("job-1").unwrap().clone();
        assert_eq!(batch.chunks.len(), 4);
        assert_eq!(batch.chunks[0].assigned_worker, "w1");
        assert_eq!(batch.chunks[1].assigned_worker, "w2");
    }

    #[test]
    fn worker_death_reassigns_unfinished_chunks() {
        let table = table_with_workers(&["w1", "w2"]);
        let coordinator = JobCoordinator::new(table, 1, 10);
        coordinator.create_job("job-1".into(), brute_spec("deadbeef")).unwrap();

        coordinator.handle_worker_death("job-1", "w1").unwrap();
        let batch = coordinator.batches.read().get("job-1").unwrap().clone();
        assert!(batch.chunks.iter().all(|c| c.assigned_worker != "w1" || c.status == ChunkStatus::Recovery));
        assert!(batch.chunks.iter().any(|c| c.status == ChunkStatus::Recovery));
    }

    #[test]
    fn report_solution_dedupes_identical_reports() {
        let table = table_with_workers(&["w1"]);
        let coordinator = JobCoordinator::new(table, 1, 10);
        coordinator.create_job("job-1".into(), brute_spec("deadbeef")).unwrap();
        let solution = Solution { combination: "bac".into(), hash_hex: "deadbeef".into(), index: 10 };
        coordinator.report_solution("job-1", solution.clone()).unwrap();
        coordinator.report_solution("job-1", solution).unwrap();
        let status = coordinator.job_status("job-1").unwrap();
        assert_eq!(status.solutions.len(), 1);
    }
}
