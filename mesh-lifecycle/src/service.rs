use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use mesh_primitives::{MeshError, ServiceSummary};
use mesh_rpc::MethodRegistry;
use serde::{Deserialize, Serialize};

use crate::metrics::MetricsBag;

/// `notinit -> initializing -> running -> stopping -> stopped`, or
/// `error` if initialization fails (spec.md §3 `ServiceInstance`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    NotInit,
    Initializing,
    Running,
    Stopping,
    Stopped,
    Error,
}

/// Static description of a loadable service: name, declared dependencies,
/// and a domain tag for grouping in the dashboard (spec.md §3
/// `ServiceInstance.info`).
#[derive(Debug, Clone)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub dependencies: Vec<String>,
    pub domain: String,
}

/// A pluggable unit of cluster functionality. Implementations register
/// their exposed methods explicitly in `register_methods` — the source's
/// decorator-based reflection (spec.md §9 "Reflection-based service
/// loading") becomes an explicit call here, since nothing in the target
/// walks the filesystem for `.py` subtrees.
#[async_trait]
pub trait Service: Send + Sync {
    fn info(&self) -> ServiceInfo;

    async fn initialize(&self) -> Result<(), MeshError>;

    async fn shutdown(&self) -> Result<(), MeshError>;

    /// Registers this service's RPC-exposed methods at `service/method`.
    /// Called once after `initialize` succeeds, and again on hot reload.
    fn register_methods(&self, registry: &MethodRegistry);
}

/// Runtime state of one loaded service, separate from the `Service` trait
/// object itself so metrics and status can be read without locking the
/// service implementation.
pub struct ServiceInstance {
    pub info: ServiceInfo,
    pub service: Arc<dyn Service>,
    pub status: ServiceStatus,
    pub metrics: Arc<MetricsBag>,
    pub start_time: Option<Instant>,
    pub last_error: Option<String>,
}

impl ServiceInstance {
    pub fn new(service: Arc<dyn Service>) -> Self {
        Self {
            info: service.info(),
            service,
            status: ServiceStatus::NotInit,
            metrics: Arc::new(MetricsBag::new()),
            start_time: None,
            last_error: None,
        }
    }

    pub fn summary(&self) -> ServiceSummary {
        ServiceSummary {
            status: format!("{:?}", self.status).to_lowercase(),
            version: self.info.version.clone(),
            exposed_methods: Vec::new(),
        }
    }
}
