use std::collections::BTreeMap;

use mdl_types::{
    ArgumentList, ArgumentReader, Asset, Diagnosis, Insurance, OperationName, ParamSpec,
    Transaction,
};

use crate::context::TxContext;
use crate::contract::{AssetContract, ScanEntry};
use crate::error::{ContractError, ContractResult};

/// What a transition hands back to its caller.
#[derive(Clone, Debug, PartialEq)]
pub enum TxPayload {
    Empty,
    Record(Vec<u8>),
    Exists(bool),
    Assets(Vec<ScanEntry>),
}

impl TxPayload {
    /// Byte form returned across the ledger boundary.
    pub fn to_bytes(&self) -> ContractResult<Vec<u8>> {
        match self {
            Self::Empty => Ok(Vec::new()),
            Self::Record(bytes) => Ok(bytes.clone()),
            Self::Exists(flag) => Ok(flag.to_string().into_bytes()),
            Self::Assets(entries) => {
                serde_json::to_vec(entries).map_err(|e| ContractError::Encoding(e.to_string()))
            }
        }
    }
}

/// Signature shared by every registered transition.
pub type Handler =
    fn(&AssetContract, &mut TxContext<'_>, &ArgumentReader<'_>) -> ContractResult<TxPayload>;

/// A transition together with the parameter schema it is invoked with.
#[derive(Clone, Copy)]
pub struct Registration {
    pub operation: OperationName,
    pub params: &'static [ParamSpec],
    pub handler: Handler,
}

/// Dispatch table from operation name to transition.
pub struct OperationRegistry {
    entries: BTreeMap<OperationName, Registration>,
}

impl OperationRegistry {
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Registry with every asset contract transition.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(OperationName::CreateDiagnosisAsset, create_diagnosis);
        registry.register(OperationName::CreateTransactionAsset, create_transaction);
        registry.register(OperationName::CreateInsuranceAsset, create_insurance);
        registry.register(OperationName::UpdateAsset, update);
        registry.register(OperationName::TransferAsset, transfer);
        registry.register(OperationName::DeleteAsset, delete);
        registry.register(OperationName::ReadAsset, read);
        registry.register(OperationName::AssetExists, exists);
        registry.register(OperationName::GetAllAssets, get_all);
        registry
    }

    pub fn register(&mut self, operation: OperationName, handler: Handler) {
        self.entries.insert(
            operation,
            Registration {
                operation,
                params: operation.params(),
                handler,
            },
        );
    }

    pub fn get(&self, operation: OperationName) -> Option<&Registration> {
        self.entries.get(&operation)
    }

    pub fn operations(&self) -> impl Iterator<Item = OperationName> + '_ {
        self.entries.keys().copied()
    }

    /// Check `args` against the operation's schema and run the transition.
    pub fn invoke(
        &self,
        contract: &AssetContract,
        ctx: &mut TxContext<'_>,
        operation: OperationName,
        args: &ArgumentList,
    ) -> ContractResult<TxPayload> {
        let registration = self.get(operation).ok_or_else(|| {
            ContractError::InvalidArgument(format!("{operation} is not registered"))
        })?;
        let reader = args.reader(operation)?;
        (registration.handler)(contract, ctx, &reader)
    }
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

fn owned(value: Option<&str>) -> Option<String> {
    value.map(str::to_string)
}

fn create_diagnosis(
    contract: &AssetContract,
    ctx: &mut TxContext<'_>,
    args: &ArgumentReader<'_>,
) -> ContractResult<TxPayload> {
    let asset = Asset::Diagnosis(Diagnosis {
        id: args.text("id")?.to_string(),
        doctor_id: args.text("doctorId")?.to_string(),
        patient_id: args.text("patientId")?.to_string(),
        appointment_id: args.text("appointmentId")?.to_string(),
        diagnosis: args.text("diagnosis")?.to_string(),
        test_recommendations: args.text("testRecommendations")?.to_string(),
        prescription: args.text("prescription")?.to_string(),
        owner: None,
    });
    contract.create_asset(ctx, &asset)?;
    Ok(TxPayload::Empty)
}

fn create_transaction(
    contract: &AssetContract,
    ctx: &mut TxContext<'_>,
    args: &ArgumentReader<'_>,
) -> ContractResult<TxPayload> {
    let asset = Asset::Transaction(Transaction {
        id: args.text("id")?.to_string(),
        method: args.text("method")?.to_string(),
        payment_type: args.text("paymentType")?.to_string(),
        mode: args.text("mode")?.to_string(),
        amount: args.number("amount")?,
        status: args.text("status")?.to_string(),
        patient_id: args.text("patientId")?.to_string(),
        test_id: owned(args.optional_text("testId")?),
        appointment_id: owned(args.optional_text("appointmentId")?),
        created_on: args.timestamp("createdOn")?,
        owner: None,
    });
    contract.create_asset(ctx, &asset)?;
    Ok(TxPayload::Empty)
}

fn create_insurance(
    contract: &AssetContract,
    ctx: &mut TxContext<'_>,
    args: &ArgumentReader<'_>,
) -> ContractResult<TxPayload> {
    let asset = Asset::Insurance(Insurance {
        id: args.text("id")?.to_string(),
        payment_id: args.text("paymentId")?.to_string(),
        patient_id: args.text("patientId")?.to_string(),
        status: args.text("status")?.to_string(),
        owner: None,
    });
    contract.create_asset(ctx, &asset)?;
    Ok(TxPayload::Empty)
}

fn update(
    contract: &AssetContract,
    ctx: &mut TxContext<'_>,
    args: &ArgumentReader<'_>,
) -> ContractResult<TxPayload> {
    contract.update_asset(ctx, args.text("id")?, &args.asset("asset")?)?;
    Ok(TxPayload::Empty)
}

fn transfer(
    contract: &AssetContract,
    ctx: &mut TxContext<'_>,
    args: &ArgumentReader<'_>,
) -> ContractResult<TxPayload> {
    contract.transfer_asset(ctx, args.text("id")?, args.text("newOwner")?)?;
    Ok(TxPayload::Empty)
}

fn delete(
    contract: &AssetContract,
    ctx: &mut TxContext<'_>,
    args: &ArgumentReader<'_>,
) -> ContractResult<TxPayload> {
    contract.delete_asset(ctx, args.text("id")?)?;
    Ok(TxPayload::Empty)
}

fn read(
    contract: &AssetContract,
    ctx: &mut TxContext<'_>,
    args: &ArgumentReader<'_>,
) -> ContractResult<TxPayload> {
    contract.read_asset(ctx, args.text("id")?).map(TxPayload::Record)
}

fn exists(
    contract: &AssetContract,
    ctx: &mut TxContext<'_>,
    args: &ArgumentReader<'_>,
) -> ContractResult<TxPayload> {
    contract.asset_exists(ctx, args.text("id")?).map(TxPayload::Exists)
}

fn get_all(
    contract: &AssetContract,
    ctx: &mut TxContext<'_>,
    _args: &ArgumentReader<'_>,
) -> ContractResult<TxPayload> {
    contract.get_all_assets(ctx).map(TxPayload::Assets)
}
