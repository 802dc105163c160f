use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mesh_gossip::{GossipService, Transition};
use mesh_hashjob::{ChunkWorker, HashJob, JobCoordinator, JobSpec, Solution};
use mesh_primitives::{MeshError, MethodParams};
use mesh_rpc::MethodRegistry;
use parking_lot::Mutex;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::warn;

use mesh_lifecycle::{Service, ServiceInfo};

fn params_to_value(params: MethodParams) -> serde_json::Value {
    match params {
        MethodParams::Positional(values) => values.into_iter().next().unwrap_or(serde_json::Value::Null),
        MethodParams::Named(map) => serde_json::Value::Object(map),
    }
}

/// Coordinator-side wrapper: exposes `hash_coordinator/{create_job,
/// report_solution, job_status}` and drives the periodic lookahead top-up
/// and dead-worker recovery described in spec.md §4.8 step 4.
pub struct HashCoordinatorService {
    coordinator: Arc<JobCoordinator>,
    gossip: Arc<GossipService>,
    top_up_interval: Duration,
    tick_task: Mutex<Option<JoinHandle<()>>>,
}

impl HashCoordinatorService {
    pub fn new(coordinator: Arc<JobCoordinator>, gossip: Arc<GossipService>, top_up_interval: Duration) -> Self {
        Self { coordinator, gossip, top_up_interval, tick_task: Mutex::new(None) }
    }
}

#[async_trait]
impl Service for HashCoordinatorService {
    fn info(&self) -> ServiceInfo {
        ServiceInfo {
            name: "hash_coordinator".into(),
            version: "1.0.0".into(),
            description: "hash-cracking job coordinator".into(),
            dependencies: Vec::new(),
            domain: "hashjob".into(),
        }
    }

    async fn initialize(&self) -> Result<(), MeshError> {
        let coordinator = self.coordinator.clone();
        self.gossip.add_listener(Box::new(move |node, transition| {
            if transition == Transition::BecameDead {
                for job_id in coordinator.job_ids() {
                    if let Err(err) = coordinator.handle_worker_death(&job_id, &node.node_id) {
                        warn!(job_id = %job_id, worker = %node.node_id, error = %err, "failed to recover chunks from dead worker");
                    }
                }
            }
        }));

        let coordinator = self.coordinator.clone();
        let interval = self.top_up_interval;
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                for job_id in coordinator.job_ids() {
                    if let Err(err) = coordinator.top_up_lookahead(&job_id) {
                        warn!(job_id = %job_id, error = %err, "lookahead top-up failed");
                    }
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
        let coordinator = self.coordinator.clone();
        registry.register(
            "hash_coordinator",
            "create_job",
            true,
            "creates a hash-cracking job and seeds its first batch",
            Arc::new(move |params: MethodParams| {
                let coordinator = coordinator.clone();
                Box::pin(async move {
                    let value = params_to_value(params);
                    let job_id = value
                        .get("job_id")
                        .and_then(|v| v.as_str())
                        .ok_or_else(|| MeshError::Validation("create_job requires job_id".into()))?
                        .to_string();
                    let spec: JobSpec = serde_json::from_value(
                        value.get("spec").cloned().ok_or_else(|| MeshError::Validation("create_job requires spec".into()))?,
                    )
                    .map_err(|e| MeshError::Validation(e.to_string()))?;
                    let job: HashJob = coordinator.create_job(job_id, spec).map_err(MeshError::from)?;
                    Ok(json!(job))
                })
            }),
        );

        let coordinator = self.coordinator.clone();
        registry.register(
            "hash_coordinator",
            "report_solution",
            false,
            "reports a found solution for a job, bypassing gossip latency",
            Arc::new(move |params: MethodParams| {
                let coordinator = coordinator.clone();
                Box::pin(async move {
                    let value = params_to_value(params);
                    let job_id = value
                        .get("job_id")
                        .and_then(|v| v.as_str())
                        .ok_or_else(|| MeshError::Validation("report_solution requires job_id".into()))?
                        .to_string();
                    let solution: Solution = serde_json::from_value(
                        value
                            .get("solution")
                            .cloned()
                            .ok_or_else(|| MeshError::Validation("report_solution requires solution".into()))?,
                    )
                    .map_err(|e| MeshError::Validation(e.to_string()))?;
                    coordinator.report_solution(&job_id, solution).map_err(MeshError::from)?;
                    Ok(json!({ "ok": true }))
                })
            }),
        );

        let coordinator = self.coordinator.clone();
        registry.register(
            "hash_coordinator",
            "job_status",
            true,
            "returns progress and any solutions found so far for a job",
            Arc::new(move |params: MethodParams| {
                let coordinator = coordinator.clone();
                Box::pin(async move {
                    let value = params_to_value(params);
                    let job_id = value
                        .get("job_id")
                        .and_then(|v| v.as_str())
                        .ok_or_else(|| MeshError::Validation("job_status requires job_id".into()))?
                        .to_string();
                    let status = coordinator.job_status(&job_id).map_err(MeshError::from)?;
                    Ok(json!(status))
                })
            }),
        );
    }
}

/// Worker-side wrapper: no RPC surface of its own (the worker only ever
/// calls out), just a background loop claiming and processing chunks
/// (spec.md §4.8 step 2-3).
pub struct HashWorkerService {
    worker: Arc<ChunkWorker>,
    poll_interval: Duration,
    tick_task: Mutex<Option<JoinHandle<()>>>,
}

impl HashWorkerService {
    pub fn new(worker: Arc<ChunkWorker>, poll_interval: Duration) -> Self {
        Self { worker, poll_interval, tick_task: Mutex::new(None) }
    }
}

#[async_trait]
impl Service for HashWorkerService {
    fn info(&self) -> ServiceInfo {
        ServiceInfo {
            name: "hash_worker".into(),
            version: "1.0.0".into(),
            description: "hash-cracking chunk worker".into(),
            dependencies: Vec::new(),
            domain: "hashjob".into(),
        }
    }

    async fn initialize(&self) -> Result<(), MeshError> {
        let worker = self.worker.clone();
        let interval = self.poll_interval;
        let handle = tokio::spawn(async move {
            loop {
                match worker.process_one().await {
                    Ok(solutions) if !solutions.is_empty() => {}
                    Ok(_) => tokio::time::sleep(interval).await,
                    Err(err) => {
                        warn!(error = %err, "chunk processing failed");
                        tokio::time::sleep(interval).await;
                    }
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

    fn register_methods(&self, _registry: &MethodRegistry) {}
}
