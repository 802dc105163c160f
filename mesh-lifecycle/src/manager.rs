use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use mesh_primitives::MeshError;
use mesh_rpc::MethodRegistry;
use parking_lot::RwLock;
use tracing::{error, info, warn};

use crate::dag::topological_order;
use crate::service::{Service, ServiceInstance, ServiceStatus};

/// Loads services in dependency order, tracks their running state, and
/// tears them down (in reverse order, or via rollback on startup failure)
/// (spec.md §4.5).
pub struct LifecycleManager {
    registry: Arc<MethodRegistry>,
    instances: RwLock<HashMap<String, ServiceInstance>>,
}

impl LifecycleManager {
    pub fn new(registry: Arc<MethodRegistry>) -> Self {
        Self { registry, instances: RwLock::new(HashMap::new()) }
    }

    pub fn load(&self, service: Arc<dyn Service>) {
        let instance = ServiceInstance::new(service);
        self.instances.write().insert(instance.info.name.clone(), instance);
    }

    fn dependency_graph(&self) -> HashMap<String, Vec<String>> {
        self.instances
            .read()
            .iter()
            .map(|(name, instance)| (name.clone(), instance.info.dependencies.clone()))
            .collect()
    }

    /// Initializes every loaded service in topological order. On any
    /// failure, shuts down everything that had already reached `running`,
    /// in reverse order, then returns the original error (spec.md §4.5
    /// "Startup" rollback).
    pub async fn start_all(&self) -> Result<(), MeshError> {
        let order = topological_order(&self.dependency_graph())?;
        let mut started: Vec<String> = Vec::new();

        for name in &order {
            match self.start_one(name).await {
                Ok(()) => started.push(name.clone()),
                Err(err) => {
                    error!(service = %name, error = %err, "service failed to initialize, rolling back");
                    for rollback_name in started.iter().rev() {
                        if let Err(shutdown_err) = self.stop_one(rollback_name).await {
                            warn!(service = %rollback_name, error = %shutdown_err, "rollback shutdown failed");
                        }
                    }
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    async fn start_one(&self, name: &str) -> Result<(), MeshError> {
        let service = {
            let mut instances = self.instances.write();
            let instance = instances.get_mut(name).ok_or_else(|| MeshError::NotFound(name.to_string()))?;
            instance.status = ServiceStatus::Initializing;
            instance.service.clone()
        };

        match service.initialize().await {
            Ok(()) => {
                service.register_methods(&self.registry);
                let mut instances = self.instances.write();
                if let Some(instance) = instances.get_mut(name) {
                    instance.status = ServiceStatus::Running;
                    instance.start_time = Some(Instant::now());
                }
                info!(service = %name, "service running");
                Ok(())
            }
            Err(err) => {
                let mut instances = self.instances.write();
                if let Some(instance) = instances.get_mut(name) {
                    instance.status = ServiceStatus::Error;
                    instance.last_error = Some(err.to_string());
                }
                Err(err)
            }
        }
    }

    /// Shuts every loaded service down in reverse topological order.
    /// Shutdown errors are logged, never propagated, so siblings still get
    /// their turn (spec.md §4.5 "Shutdown").
    pub async fn shutdown_all(&self) {
        let Ok(mut order) = topological_order(&self.dependency_graph()) else {
            warn!("dependency graph invalid at shutdown, stopping services in load order");
            let names: Vec<String> = self.instances.read().keys().cloned().collect();
            for name in names {
                let _ = self.stop_one(&name).await;
            }
            return;
        };
        order.reverse();
        for name in order {
            if let Err(err) = self.stop_one(&name).await {
                warn!(service = %name, error = %err, "error during shutdown, continuing");
            }
        }
    }

    async fn stop_one(&self, name: &str) -> Result<(), MeshError> {
        let service = {
            let mut instances = self.instances.write();
            let Some(instance) = instances.get_mut(name) else { return Ok(()) };
            if instance.status != ServiceStatus::Running {
                return Ok(());
            }
            instance.status = ServiceStatus::Stopping;
            instance.service.clone()
        };
        let result = service.shutdown().await;
        let mut instances = self.instances.write();
        if let Some(instance) = instances.get_mut(name) {
            instance.status = ServiceStatus::Stopped;
        }
        result
    }

    /// Stops `name`, re-registers its methods from the same in-memory
    /// implementation, and re-initializes it (spec.md §4.5 "Hot reload").
    /// Reloading from a freshly recompiled implementation is done by the
    /// caller swapping the `Arc<dyn Service>` before calling this.
    pub async fn hot_reload(&self, name: &str, replacement: Arc<dyn Service>) -> Result<(), MeshError> {
        self.stop_one(name).await?;
        self.registry.unregister_service(name);
        {
            let mut instances = self.instances.write();
            instances.insert(name.to_string(), ServiceInstance::new(replacement));
        }
        self.start_one(name).await
    }

    /// Stops `name` if it is currently running, without unregistering or
    /// replacing it. Used by the orchestrator before it overwrites a
    /// service's on-disk package files (spec.md §4.6 "Install").
    pub async fn stop_if_running(&self, name: &str) -> Result<(), MeshError> {
        self.stop_one(name).await
    }

    pub fn status_of(&self, name: &str) -> Option<ServiceStatus> {
        self.instances.read().get(name).map(|i| i.status)
    }

    /// Callback suitable for `GossipService::set_service_projection`.
    pub fn project_for_gossip(&self) -> std::collections::BTreeMap<String, mesh_primitives::ServiceSummary> {
        self.instances.read().iter().map(|(name, instance)| (name.clone(), instance.summary())).collect()
    }
}
