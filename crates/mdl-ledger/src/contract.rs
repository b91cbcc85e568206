use serde::Serialize;
use serde_json::Value;

use mdl_types::Asset;

use crate::context::TxContext;
use crate::error::{ContractError, ContractResult};

/// One entry of a full-ledger scan.
///
/// Values that parse as JSON are returned structured; anything else comes
/// back as its raw text so one bad record never hides the rest.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ScanEntry {
    Record(Value),
    Raw(String),
}

impl ScanEntry {
    fn from_bytes(key: &str, bytes: &[u8]) -> Self {
        match serde_json::from_slice(bytes) {
            Ok(value) => Self::Record(value),
            Err(err) => {
                tracing::debug!(key, error = %err, "returning undecodable record as raw text");
                Self::Raw(String::from_utf8_lossy(bytes).into_owned())
            }
        }
    }
}

/// The asset ledger contract.
///
/// Every transition is a pure function of its arguments and the state it
/// reads. Nothing here consults the clock, randomness, or the environment,
/// so independent replicas derive identical write sets.
#[derive(Clone, Copy, Debug, Default)]
pub struct AssetContract;

impl AssetContract {
    /// Store a new asset. Fails with `AlreadyExists` if the id is taken.
    pub fn create_asset(&self, ctx: &mut TxContext<'_>, asset: &Asset) -> ContractResult<()> {
        asset.validate()?;
        let id = asset.id();
        if self.asset_exists(ctx, id)? {
            return Err(ContractError::AlreadyExists(id.to_string()));
        }
        ctx.put_state(id, mdl_crypto::encode(asset)?)
    }

    /// The stored encoding, verbatim.
    pub fn read_asset(&self, ctx: &TxContext<'_>, id: &str) -> ContractResult<Vec<u8>> {
        ctx.get_state(id)?
            .ok_or_else(|| ContractError::NotFound(id.to_string()))
    }

    pub fn asset_exists(&self, ctx: &TxContext<'_>, id: &str) -> ContractResult<bool> {
        Ok(ctx.get_state(id)?.is_some())
    }

    /// Replace an existing asset.
    ///
    /// The replacement must carry the same id and kind. Ownership only moves
    /// through [`Self::transfer_asset`], so a replacement without an owner
    /// keeps the current one.
    pub fn update_asset(&self, ctx: &mut TxContext<'_>, id: &str, asset: &Asset) -> ContractResult<()> {
        asset.validate()?;
        if asset.id() != id {
            return Err(ContractError::InvalidArgument(format!(
                "asset ID {} does not match {id}",
                asset.id()
            )));
        }
        let current = self.load(ctx, id)?;
        if current.kind() != asset.kind() {
            return Err(ContractError::InvalidArgument(format!(
                "cannot change {id} from {} to {}",
                current.kind(),
                asset.kind()
            )));
        }

        let mut replacement = asset.clone();
        if replacement.owner().is_none() {
            if let Some(owner) = current.owner() {
                replacement.set_owner(owner);
            }
        }
        ctx.put_state(id, mdl_crypto::encode(&replacement)?)
    }

    /// Set the owner of an existing asset.
    pub fn transfer_asset(&self, ctx: &mut TxContext<'_>, id: &str, new_owner: &str) -> ContractResult<()> {
        if new_owner.trim().is_empty() {
            return Err(ContractError::InvalidArgument("newOwner must not be empty".into()));
        }
        let mut asset = self.load(ctx, id)?;
        asset.set_owner(new_owner);
        ctx.put_state(id, mdl_crypto::encode(&asset)?)
    }

    pub fn delete_asset(&self, ctx: &mut TxContext<'_>, id: &str) -> ContractResult<()> {
        if !self.asset_exists(ctx, id)? {
            return Err(ContractError::NotFound(id.to_string()));
        }
        ctx.delete_state(id)
    }

    /// Every stored asset in key order.
    pub fn get_all_assets(&self, ctx: &TxContext<'_>) -> ContractResult<Vec<ScanEntry>> {
        Ok(ctx
            .get_state_by_range("", "")?
            .iter()
            .map(|(key, bytes)| ScanEntry::from_bytes(key, bytes))
            .collect())
    }

    fn load(&self, ctx: &TxContext<'_>, id: &str) -> ContractResult<Asset> {
        let bytes = self.read_asset(ctx, id)?;
        let corrupt = |reason: String| ContractError::CorruptRecord {
            id: id.to_string(),
            reason,
        };
        let value: Value = serde_json::from_slice(&bytes).map_err(|e| corrupt(e.to_string()))?;
        Asset::from_value(value).map_err(|e| corrupt(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use mdl_store::{InMemoryWorldState, WorldState};
    use mdl_types::{Diagnosis, Insurance};
    use serde_json::json;

    use super::*;

    fn diagnosis(id: &str) -> Asset {
        Asset::Diagnosis(Diagnosis {
            id: id.into(),
            doctor_id: "d1".into(),
            patient_id: "p1".into(),
            appointment_id: "ap1".into(),
            diagnosis: "flu".into(),
            test_recommendations: "rest".into(),
            prescription: "fluids".into(),
            owner: None,
        })
    }

    fn insurance(id: &str) -> Asset {
        Asset::Insurance(Insurance {
            id: id.into(),
            payment_id: "pay1".into(),
            patient_id: "p1".into(),
            status: "pending".into(),
            owner: None,
        })
    }

    /// Run one transition against `state` and commit its writes.
    fn run<T>(
        state: &InMemoryWorldState,
        f: impl FnOnce(&mut TxContext<'_>) -> ContractResult<T>,
    ) -> ContractResult<T> {
        let mut ctx = TxContext::new(state);
        let out = f(&mut ctx)?;
        state.apply_batch(&ctx.into_write_set().to_batch())?;
        Ok(out)
    }

    #[test]
    fn create_then_read_returns_canonical_bytes() {
        let state = InMemoryWorldState::new();
        let contract = AssetContract;
        run(&state, |ctx| contract.create_asset(ctx, &diagnosis("a1"))).unwrap();

        let bytes = run(&state, |ctx| contract.read_asset(ctx, "a1")).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"AppointmentID":"ap1","Diagnosis":"flu","DoctorID":"d1","ID":"a1","PatientID":"p1","Prescription":"fluids","TestRecommendations":"rest","Type":"diagnosis"}"#
        );
    }

    #[test]
    fn duplicate_create_is_rejected_without_writes() {
        let state = InMemoryWorldState::new();
        let contract = AssetContract;
        run(&state, |ctx| contract.create_asset(ctx, &diagnosis("a1"))).unwrap();

        let mut ctx = TxContext::new(&state);
        assert_eq!(
            contract.create_asset(&mut ctx, &insurance("a1")),
            Err(ContractError::AlreadyExists("a1".into()))
        );
        assert!(ctx.into_write_set().is_empty());
    }

    #[test]
    fn missing_asset_is_not_found() {
        let state = InMemoryWorldState::new();
        let contract = AssetContract;
        let mut ctx = TxContext::new(&state);
        fn missing<T>() -> ContractResult<T> {
            Err(ContractError::NotFound("zz".into()))
        }

        assert_eq!(contract.read_asset(&ctx, "zz"), missing());
        assert_eq!(contract.asset_exists(&ctx, "zz"), Ok(false));
        assert_eq!(contract.update_asset(&mut ctx, "zz", &diagnosis("zz")), missing());
        assert_eq!(contract.transfer_asset(&mut ctx, "zz", "org2"), missing());
        assert_eq!(contract.delete_asset(&mut ctx, "zz"), missing());
        assert!(ctx.into_write_set().is_empty());
    }

    #[test]
    fn update_requires_matching_id_and_kind() {
        let state = InMemoryWorldState::new();
        let contract = AssetContract;
        run(&state, |ctx| contract.create_asset(ctx, &diagnosis("a1"))).unwrap();

        let mut ctx = TxContext::new(&state);
        assert!(matches!(
            contract.update_asset(&mut ctx, "a1", &diagnosis("a2")),
            Err(ContractError::InvalidArgument(_))
        ));
        assert!(matches!(
            contract.update_asset(&mut ctx, "a1", &insurance("a1")),
            Err(ContractError::InvalidArgument(_))
        ));
    }

    #[test]
    fn update_with_blank_required_field_is_invalid() {
        let state = InMemoryWorldState::new();
        let contract = AssetContract;
        run(&state, |ctx| contract.create_asset(ctx, &diagnosis("a1"))).unwrap();

        let mut blank = diagnosis("a1");
        if let Asset::Diagnosis(d) = &mut blank {
            d.doctor_id = "  ".into();
        }
        let mut ctx = TxContext::new(&state);
        assert!(matches!(
            contract.update_asset(&mut ctx, "a1", &blank),
            Err(ContractError::InvalidArgument(reason)) if reason.contains("DoctorID")
        ));
        assert!(ctx.into_write_set().is_empty());
    }

    #[test]
    fn transfer_sets_owner_and_update_keeps_it() {
        let state = InMemoryWorldState::new();
        let contract = AssetContract;
        run(&state, |ctx| contract.create_asset(ctx, &diagnosis("a1"))).unwrap();
        run(&state, |ctx| contract.transfer_asset(ctx, "a1", "org2")).unwrap();

        let mut changed = diagnosis("a1");
        if let Asset::Diagnosis(d) = &mut changed {
            d.prescription = "antivirals".into();
        }
        run(&state, |ctx| contract.update_asset(ctx, "a1", &changed)).unwrap();

        let bytes = state.get_state("a1").unwrap().unwrap();
        let stored: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(stored["Owner"], json!("org2"));
        assert_eq!(stored["Prescription"], json!("antivirals"));
    }

    #[test]
    fn delete_removes_the_key() {
        let state = InMemoryWorldState::new();
        let contract = AssetContract;
        run(&state, |ctx| contract.create_asset(ctx, &diagnosis("a1"))).unwrap();
        run(&state, |ctx| contract.delete_asset(ctx, "a1")).unwrap();
        assert!(state.is_empty().unwrap());
    }

    #[test]
    fn scan_returns_malformed_values_as_raw_text() {
        let state = InMemoryWorldState::new();
        let contract = AssetContract;
        for id in ["b", "a", "c"] {
            run(&state, |ctx| contract.create_asset(ctx, &insurance(id))).unwrap();
        }
        state.put_state("bad", b"not json{").unwrap();

        let entries = run(&state, |ctx| contract.get_all_assets(ctx)).unwrap();
        assert_eq!(entries.len(), 4);
        let ids: Vec<_> = entries
            .iter()
            .map(|e| match e {
                ScanEntry::Record(v) => v["ID"].as_str().unwrap_or_default().to_string(),
                ScanEntry::Raw(s) => s.clone(),
            })
            .collect();
        assert_eq!(ids, vec!["a", "b", "not json{", "c"]);
        assert_eq!(
            serde_json::to_value(&entries[2]).unwrap(),
            json!("not json{")
        );
    }

    #[test]
    fn transfer_of_corrupt_record_fails() {
        let state = InMemoryWorldState::new();
        state.put_state("bad", b"[1,2]").unwrap();
        let mut ctx = TxContext::new(&state);
        assert!(matches!(
            AssetContract.transfer_asset(&mut ctx, "bad", "org2"),
            Err(ContractError::CorruptRecord { .. })
        ));
    }
}
