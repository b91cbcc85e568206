use std::collections::BTreeMap;
use std::sync::Arc;

use mdl_ledger::{ContractHandle, ReplicaSet};
use mdl_types::TenantId;

use crate::config::TenantConfig;
use crate::error::{ServerError, ServerResult};

/// Everything a request needs to act on behalf of one tenant.
#[derive(Debug)]
pub struct TenantContext {
    tenant: TenantId,
    handle: ContractHandle,
}

impl TenantContext {
    pub fn new(tenant: TenantId, handle: ContractHandle) -> Self {
        Self { tenant, handle }
    }

    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    pub fn handle(&self) -> &ContractHandle {
        &self.handle
    }
}

/// Tenant contexts, built once at startup and read-only afterwards.
#[derive(Debug, Default)]
pub struct TenantRegistry {
    contexts: BTreeMap<TenantId, Arc<TenantContext>>,
}

impl TenantRegistry {
    /// One context per configured tenant, each pinned to its replica.
    pub fn build(network: &Arc<ReplicaSet>, tenants: &[TenantConfig]) -> ServerResult<Self> {
        let mut registry = Self::default();
        for config in tenants {
            let tenant = TenantId::new(config.msp_id.clone())?;
            let replica = network.position(&config.replica).ok_or_else(|| {
                ServerError::Config(format!(
                    "tenant {tenant} reads from unknown replica {}",
                    config.replica
                ))
            })?;
            let handle = ContractHandle::new(tenant.clone(), Arc::clone(network), replica)?;
            tracing::debug!(tenant = %tenant, replica = %config.replica, "tenant context ready");
            registry.insert(TenantContext::new(tenant, handle))?;
        }
        Ok(registry)
    }

    pub fn insert(&mut self, context: TenantContext) -> ServerResult<()> {
        if self.contexts.contains_key(context.tenant()) {
            return Err(ServerError::Config(format!(
                "tenant {} is registered twice",
                context.tenant()
            )));
        }
        self.contexts
            .insert(context.tenant().clone(), Arc::new(context));
        Ok(())
    }

    pub fn get(&self, tenant: &TenantId) -> Option<Arc<TenantContext>> {
        self.contexts.get(tenant).cloned()
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenants() -> Vec<TenantConfig> {
        vec![
            TenantConfig {
                msp_id: "Org1MSP".into(),
                api_keys: vec!["k1".into()],
                replica: "peer0.org1".into(),
            },
            TenantConfig {
                msp_id: "Org2MSP".into(),
                api_keys: vec!["k2".into()],
                replica: "peer0.org2".into(),
            },
        ]
    }

    #[test]
    fn each_tenant_gets_its_own_replica() {
        let network = Arc::new(ReplicaSet::in_memory(&["peer0.org1", "peer0.org2"]).unwrap());
        let registry = TenantRegistry::build(&network, &tenants()).unwrap();
        assert_eq!(registry.len(), 2);

        let org2 = registry.get(&TenantId::new("Org2MSP").unwrap()).unwrap();
        assert_eq!(org2.tenant().as_str(), "Org2MSP");
        assert_eq!(org2.handle().replica_name().unwrap(), "peer0.org2");
        assert!(registry.get(&TenantId::new("Org3MSP").unwrap()).is_none());
    }

    #[test]
    fn unknown_replica_is_a_config_error() {
        let network = Arc::new(ReplicaSet::in_memory(&["peer0.org1"]).unwrap());
        assert!(matches!(
            TenantRegistry::build(&network, &tenants()),
            Err(ServerError::Config(_))
        ));
    }
}
