use std::sync::Arc;

use mdl_types::{ArgumentList, OperationName, TenantId};
use serde_json::json;

use crate::contract::ScanEntry;
use crate::error::{ContractError, ContractResult};
use crate::network::{ReplicaSet, TxReceipt};
use crate::registry::TxPayload;

/// A tenant's connection to the ledger.
///
/// The handle is bound to one tenant and one replica at construction and
/// never changes afterwards; cloning it does not rebind it.
#[derive(Clone)]
pub struct ContractHandle {
    tenant: TenantId,
    replica: usize,
    network: Arc<ReplicaSet>,
}

impl ContractHandle {
    pub fn new(tenant: TenantId, network: Arc<ReplicaSet>, replica: usize) -> ContractResult<Self> {
        network.replica(replica)?;
        Ok(Self {
            tenant,
            replica,
            network,
        })
    }

    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    /// Name of the replica this handle evaluates against.
    pub fn replica_name(&self) -> ContractResult<&str> {
        Ok(self.network.replica(self.replica)?.name())
    }

    pub fn evaluate(&self, operation: OperationName, args: &ArgumentList) -> ContractResult<TxPayload> {
        self.network.evaluate(self.replica, operation, args)
    }

    pub fn submit(&self, operation: OperationName, args: &ArgumentList) -> ContractResult<TxReceipt> {
        self.network.submit(&self.tenant, operation, args)
    }

    pub fn read_asset(&self, id: &str) -> ContractResult<Vec<u8>> {
        match self.evaluate(OperationName::ReadAsset, &id_arg(id))? {
            TxPayload::Record(bytes) => Ok(bytes),
            other => Err(unexpected(OperationName::ReadAsset, &other)),
        }
    }

    pub fn asset_exists(&self, id: &str) -> ContractResult<bool> {
        match self.evaluate(OperationName::AssetExists, &id_arg(id))? {
            TxPayload::Exists(flag) => Ok(flag),
            other => Err(unexpected(OperationName::AssetExists, &other)),
        }
    }

    pub fn get_all_assets(&self) -> ContractResult<Vec<ScanEntry>> {
        match self.evaluate(OperationName::GetAllAssets, &ArgumentList::empty())? {
            TxPayload::Assets(entries) => Ok(entries),
            other => Err(unexpected(OperationName::GetAllAssets, &other)),
        }
    }
}

impl std::fmt::Debug for ContractHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractHandle")
            .field("tenant", &self.tenant)
            .field("replica", &self.replica)
            .finish()
    }
}

fn id_arg(id: &str) -> ArgumentList {
    ArgumentList::from_values(vec![json!(id)])
}

fn unexpected(operation: OperationName, payload: &TxPayload) -> ContractError {
    ContractError::Encoding(format!("{operation} returned unexpected payload {payload:?}"))
}
