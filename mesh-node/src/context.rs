use std::sync::Arc;
use std::time::Duration;

use ed25519_dalek::VerifyingKey;
use mesh_config::Config;
use mesh_crypto::{Ca, TokenService};
use mesh_gossip::{GossipConfig, GossipService};
use mesh_hashjob::{ChunkWorker, JobCoordinator};
use mesh_lifecycle::LifecycleManager;
use mesh_orchestrator::Orchestrator;
use mesh_primitives::{NodeInfo, NodeRole};
use mesh_rpc::{MethodRegistry, Proxy, RpcState};
use mesh_services::{
    HashCoordinatorService, HashWorkerService, OrchestratorService, SystemInfoService, UpdateCatalogService,
    UpdateWorkerService,
};
use mesh_transport::{Transport, TransportSettings};
use mesh_update::{UpdateEngine, UpdateLayout};
use tracing::{info, warn};

use crate::bootstrap;

/// Everything the running process shares across its HTTP handlers and
/// background loops — the single non-global "singleton" spec.md §9 asks
/// for, threaded explicitly instead of hidden behind statics.
pub struct AppContext {
    pub node_id: String,
    pub role: NodeRole,
    pub config: Config,
    pub registry: Arc<MethodRegistry>,
    pub gossip: Arc<GossipService>,
    pub tokens: Arc<TokenService>,
    pub transport: Arc<Transport>,
    pub lifecycle: Arc<LifecycleManager>,
    pub ca: Option<Arc<Ca>>,
}

impl AppContext {
    pub async fn bootstrap(config: Config) -> anyhow::Result<Arc<Self>> {
        let role = if config.coordinator_mode { NodeRole::Coordinator } else { NodeRole::Worker };
        let hostname = hostname::get().ok().and_then(|h| h.into_string().ok()).unwrap_or_else(|| "localhost".into());
        let advertise_address = if config.bind_address == "0.0.0.0" { "127.0.0.1".to_string() } else { config.bind_address.clone() };
        let certs_dir = config.certs_dir();

        let (ca, ca_cert_pem) = if config.coordinator_mode {
            let identity = bootstrap::bootstrap_coordinator(&certs_dir, &hostname, &advertise_address)?;
            let ca_pem = identity.ca.to_bundle()?.cert_pem;
            (Some(identity.ca), Some(ca_pem))
        } else {
            let trusted_ca_pem = config
                .ssl_ca_cert_file
                .as_ref()
                .map(std::fs::read_to_string)
                .transpose()?;
            bootstrap::bootstrap_worker(
                &certs_dir,
                &config.node_id,
                &config.coordinator_addresses,
                trusted_ca_pem.as_deref(),
                &advertise_address,
                &hostname,
            )
            .await?;
            let cached = mesh_crypto::CertificateBundle::load_ca_cert_only(&certs_dir).ok();
            (None, trusted_ca_pem.or(cached))
        };

        let transport_settings = TransportSettings {
            max_connections: config.transport.max_connections,
            max_keepalive: config.transport.max_keepalive,
            keepalive_expiry: Duration::from_secs(config.transport.keepalive_expiry_secs),
            connect_timeout: Duration::from_secs(config.transport.connect_timeout_secs),
            read_timeout: Duration::from_secs(config.transport.read_timeout_secs),
            total_timeout: Duration::from_secs(config.transport.total_timeout_secs),
            ca_cert_pem,
            verify_disabled: !config.ssl_verify,
        };
        let transport = Arc::new(Transport::new(transport_settings));

        let tokens = Arc::new(TokenService::new(config.jwt_secret.clone(), config.jwt_expiration_hours));

        let self_info = NodeInfo::new(config.node_id.clone(), advertise_address.clone(), config.port, role);
        let gossip_config = GossipConfig {
            gossip_interval_min: config.gossip_interval_min,
            gossip_interval_max: config.gossip_interval_max,
            failure_timeout: config.failure_timeout,
            cleanup_interval: config.cleanup_interval,
            adjust_interval_period: config.adjust_interval_period,
            max_gossip_targets: config.max_gossip_targets,
            compression_threshold: config.compression_threshold,
        };
        let gossip = Arc::new(GossipService::new(self_info, transport.clone(), gossip_config));

        let registry = Arc::new(MethodRegistry::new());
        let lifecycle = Arc::new(LifecycleManager::new(registry.clone()));
        gossip.set_service_projection({
            let lifecycle = lifecycle.clone();
            Box::new(move || lifecycle.project_for_gossip())
        });

        let ctx = Arc::new(Self {
            node_id: config.node_id.clone(),
            role,
            config,
            registry,
            gossip,
            tokens,
            transport,
            lifecycle,
            ca,
        });

        ctx.load_services().await?;
        Ok(ctx)
    }

    fn proxy(&self) -> Proxy {
        Proxy::new(self.registry.clone(), self.gossip.table.clone(), self.transport.clone(), self.tokens.clone(), self.node_id.clone())
    }

    pub fn rpc_state(&self) -> Arc<RpcState> {
        Arc::new(RpcState::new(
            self.node_id.clone(),
            self.role,
            self.registry.clone(),
            self.gossip.clone(),
            self.tokens.clone(),
            self.transport.clone(),
            self.ca.clone(),
        ))
    }

    /// Loads every built-in service onto the lifecycle manager (not yet
    /// started — `LifecycleManager::start_all` does that in dependency
    /// order). Which services get loaded depends on node role, matching
    /// spec.md §4.8's coordinator/worker split for the hash job system and
    /// §4.7's for the update engine.
    async fn load_services(&self) -> anyhow::Result<()> {
        self.lifecycle.load(Arc::new(SystemInfoService::new(self.role)));

        match self.role {
            NodeRole::Coordinator => {
                let coordinator = Arc::new(JobCoordinator::new(
                    self.gossip.table.clone(),
                    self.config.hashjob.lookahead_batches,
                    self.config.hashjob.base_chunk_size,
                ));
                self.lifecycle.load(Arc::new(HashCoordinatorService::new(
                    coordinator,
                    self.gossip.clone(),
                    Duration::from_secs(self.config.hashjob.progress_interval_secs),
                )));

                let orchestrator = Arc::new(Orchestrator::new(
                    self.config.state_directory.join("services"),
                    self.lifecycle.clone(),
                    self.transport.clone(),
                ));
                self.lifecycle.load(Arc::new(OrchestratorService::new(
                    orchestrator,
                    self.lifecycle.clone(),
                    self.gossip.table.clone(),
                )));

                self.lifecycle.load(Arc::new(UpdateCatalogService::new(
                    self.gossip.table.clone(),
                    self.transport.clone(),
                    self.config.update.rolling_interval_secs,
                    self.config.update.max_failures,
                )));
            }
            NodeRole::Worker => {
                let worker = Arc::new(ChunkWorker::new(
                    self.gossip.table.clone(),
                    self.proxy(),
                    self.config.hashjob.pool_size_ceiling,
                    self.config.hashjob.progress_interval_secs,
                ));
                self.lifecycle.load(Arc::new(HashWorkerService::new(worker, Duration::from_secs(1))));

                let orchestrator = Arc::new(Orchestrator::new(
                    self.config.state_directory.join("services"),
                    self.lifecycle.clone(),
                    self.transport.clone(),
                ));
                self.lifecycle.load(Arc::new(OrchestratorService::new(
                    orchestrator,
                    self.lifecycle.clone(),
                    self.gossip.table.clone(),
                )));

                self.load_update_worker().await?;
            }
        }
        Ok(())
    }

    /// Self-update only activates once the cluster operator has
    /// provisioned a verifying key next to the worker's certs (see
    /// `certs_dir()/update_pubkey.hex`); without one, the worker simply
    /// never checks for updates, logged once at startup.
    async fn load_update_worker(&self) -> anyhow::Result<()> {
        let key_path = self.config.certs_dir().join("update_pubkey.hex");
        let Ok(hex_key) = std::fs::read_to_string(&key_path) else {
            warn!(path = %key_path.display(), "no update verifying key provisioned, self-update disabled");
            return Ok(());
        };
        let key_bytes: [u8; 32] = hex::decode(hex_key.trim())?
            .try_into()
            .map_err(|_| anyhow::anyhow!("update_pubkey.hex must decode to 32 bytes"))?;
        let public_key = VerifyingKey::from_bytes(&key_bytes)?;

        let coordinator_url = self
            .config
            .coordinator_addresses
            .first()
            .map(|addr| format!("https://{addr}"))
            .ok_or_else(|| anyhow::anyhow!("update engine requires at least one coordinator address"))?;

        let layout = UpdateLayout {
            live_dirs: vec![self.config.state_directory.join("services")],
            backup_root: self.config.state_directory.join("update_manager").join("backups"),
            backup_retention: self.config.update.backup_retention,
        };
        let engine = Arc::new(UpdateEngine::new(
            coordinator_url,
            self.transport.clone(),
            self.tokens.clone(),
            self.node_id.clone(),
            public_key,
            layout,
        ));
        let current_version = env!("CARGO_PKG_VERSION").to_string();
        self.lifecycle.load(Arc::new(UpdateWorkerService::new(
            engine,
            self.role.as_str().to_string(),
            current_version,
            Duration::from_secs(self.config.update.rolling_interval_secs.max(60)),
        )));
        info!("self-update worker enabled");
        Ok(())
    }
}
