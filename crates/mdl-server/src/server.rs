use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use mdl_gate::{
    AdmissionGate, BackpressureGuard, EvictionPolicySource, GateConfig, RedisPolicySource,
    StaticPolicySource,
};
use mdl_ledger::ReplicaSet;
use mdl_queue::{InMemoryJobStore, JobStore, JournalConfig, RedisJobStore, SubmissionQueue, WalJobStore};

use crate::auth::ApiKeyAuth;
use crate::config::{QueueBackend, ServerConfig};
use crate::dispatch::TenantRouter;
use crate::error::{ServerError, ServerResult};
use crate::router::build_router;
use crate::state::AppState;
use crate::tenant::TenantRegistry;
use crate::worker::JobApplier;

/// The MedLedger HTTP server and everything behind it.
pub struct MedLedgerServer {
    config: ServerConfig,
    network: Arc<ReplicaSet>,
    state: AppState,
}

impl MedLedgerServer {
    /// Assemble the server from its config, opening the configured job store.
    pub async fn build(config: ServerConfig) -> ServerResult<Self> {
        config.validate()?;
        let (store, source) = open_queue_backend(&config.queue, &config.gate).await?;
        Self::from_parts(config, store, source)
    }

    /// Assemble the server around an existing job store and policy source.
    pub fn from_parts(
        config: ServerConfig,
        store: Arc<dyn JobStore>,
        source: Arc<dyn EvictionPolicySource>,
    ) -> ServerResult<Self> {
        let network = Arc::new(ReplicaSet::in_memory(&config.replicas)?);
        let tenants = TenantRegistry::build(&network, &config.tenants)?;
        let auth = Arc::new(ApiKeyAuth::from_config(&config.tenants)?);

        let guard = Arc::new(BackpressureGuard::new(source, config.gate.clone()));
        let gate = Arc::new(AdmissionGate::with_default_stages(config.gate.clone(), guard));
        let queue = Arc::new(SubmissionQueue::new(gate, store));
        let router = Arc::new(TenantRouter::new(tenants, queue));

        tracing::info!(
            replicas = network.len(),
            tenants = router.tenants().len(),
            "medledger assembled"
        );
        Ok(Self {
            config,
            network,
            state: AppState::new(auth, router),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn network(&self) -> &Arc<ReplicaSet> {
        &self.network
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(self.state.clone())
    }

    pub fn applier(&self) -> JobApplier {
        JobApplier::new(Arc::clone(&self.state.router))
    }

    /// Start serving requests, with a periodic applier pass if configured.
    pub async fn serve(self) -> ServerResult<()> {
        if let Some(ms) = self.config.applier_interval_ms {
            tokio::spawn(self.applier().run_every(Duration::from_millis(ms)));
        }
        let app = self.router();
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!("MedLedger server listening on {}", self.config.bind_addr);
        axum::serve(listener, app)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))
    }
}

/// Job store for the backend, with the policy source its guard should ask.
///
/// Local stores never evict, so their guard answers with the required
/// policy. A Redis store is asked directly.
async fn open_queue_backend(
    backend: &QueueBackend,
    gate: &GateConfig,
) -> ServerResult<(Arc<dyn JobStore>, Arc<dyn EvictionPolicySource>)> {
    let never_evicts = || -> Arc<dyn EvictionPolicySource> {
        Arc::new(StaticPolicySource::reporting(
            &gate.policy_parameter,
            &gate.required_policy,
        ))
    };
    match backend {
        QueueBackend::Memory => {
            let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
            Ok((store, never_evicts()))
        }
        QueueBackend::Journal { path, sync_mode } => {
            let config = JournalConfig {
                sync_mode: *sync_mode,
            };
            let store: Arc<dyn JobStore> = Arc::new(WalJobStore::open(path, config)?);
            Ok((store, never_evicts()))
        }
        QueueBackend::Redis { url, prefix } => {
            let store: Arc<dyn JobStore> =
                Arc::new(RedisJobStore::connect(url, prefix.clone()).await?);
            let source: Arc<dyn EvictionPolicySource> = Arc::new(RedisPolicySource::open(url)?);
            Ok((store, source))
        }
    }
}
