use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use mdl_gate::GateConfig;
use mdl_queue::SyncMode;

use crate::error::{ServerError, ServerResult};

/// Server configuration, usually loaded from a TOML file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Names of the ledger replicas, one per organization peer.
    pub replicas: Vec<String>,
    pub tenants: Vec<TenantConfig>,
    pub queue: QueueBackend,
    pub gate: GateConfig,
    /// Run a job-applier pass this often. `None` leaves jobs to an
    /// external worker.
    pub applier_interval_ms: Option<u64>,
}

/// One organization allowed to call the API.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantConfig {
    /// Organization MSP id, e.g. `Org1MSP`.
    pub msp_id: String,
    pub api_keys: Vec<String>,
    /// Replica this organization reads from.
    pub replica: String,
}

/// Where admitted jobs are persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum QueueBackend {
    Memory,
    Journal {
        path: PathBuf,
        #[serde(default)]
        sync_mode: SyncMode,
    },
    Redis {
        url: String,
        #[serde(default = "default_redis_prefix")]
        prefix: String,
    },
}

fn default_redis_prefix() -> String {
    "medledger".into()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 3000)),
            replicas: vec!["peer0.org1".into(), "peer0.org2".into()],
            tenants: vec![
                TenantConfig {
                    msp_id: "Org1MSP".into(),
                    api_keys: Vec::new(),
                    replica: "peer0.org1".into(),
                },
                TenantConfig {
                    msp_id: "Org2MSP".into(),
                    api_keys: Vec::new(),
                    replica: "peer0.org2".into(),
                },
            ],
            queue: QueueBackend::Journal {
                path: PathBuf::from("medledger-jobs.journal"),
                sync_mode: SyncMode::EveryWrite,
            },
            gate: GateConfig::default(),
            applier_interval_ms: Some(1_000),
        }
    }
}

impl ServerConfig {
    /// Read and validate a TOML config file.
    pub fn load(path: &Path) -> ServerResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&raw)
            .map_err(|e| ServerError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> ServerResult<()> {
        if self.replicas.is_empty() {
            return Err(ServerError::Config("at least one replica is required".into()));
        }
        let mut tenants = HashSet::new();
        let mut keys = HashSet::new();
        for tenant in &self.tenants {
            if !tenants.insert(tenant.msp_id.as_str()) {
                return Err(ServerError::Config(format!("tenant {} is listed twice", tenant.msp_id)));
            }
            if !self.replicas.contains(&tenant.replica) {
                return Err(ServerError::Config(format!(
                    "tenant {} reads from unknown replica {}",
                    tenant.msp_id, tenant.replica
                )));
            }
            for key in &tenant.api_keys {
                if key.trim().is_empty() {
                    return Err(ServerError::Config(format!(
                        "tenant {} has an empty API key",
                        tenant.msp_id
                    )));
                }
                if !keys.insert(key.as_str()) {
                    return Err(ServerError::Config(
                        "an API key is assigned to more than one tenant".into(),
                    ));
                }
            }
        }
        Ok(())
    }
}
