use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TypeError;
use crate::operation::OperationName;

/// Discriminant of the asset union, as carried in the `Type` field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Diagnosis,
    Insurance,
    Transaction,
}

impl AssetKind {
    pub const ALL: [AssetKind; 3] = [Self::Diagnosis, Self::Insurance, Self::Transaction];

    /// Wire value of the `Type` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Diagnosis => "diagnosis",
            Self::Insurance => "insurance",
            Self::Transaction => "transaction",
        }
    }

    /// The creation transition for this kind.
    pub fn create_operation(&self) -> OperationName {
        match self {
            Self::Diagnosis => OperationName::CreateDiagnosisAsset,
            Self::Insurance => OperationName::CreateInsuranceAsset,
            Self::Transaction => OperationName::CreateTransactionAsset,
        }
    }
}

impl FromStr for AssetKind {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| TypeError::UnknownAssetKind(s.to_string()))
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A clinical diagnosis recorded by a doctor for an appointment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct Diagnosis {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "DoctorID")]
    pub doctor_id: String,
    #[serde(rename = "PatientID")]
    pub patient_id: String,
    #[serde(rename = "AppointmentID")]
    pub appointment_id: String,
    pub diagnosis: String,
    pub test_recommendations: String,
    pub prescription: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

/// An insurance claim against a payment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct Insurance {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "PaymentID")]
    pub payment_id: String,
    #[serde(rename = "PatientID")]
    pub patient_id: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

/// A payment transaction for a test or an appointment.
///
/// `created_on` is always supplied by the caller; transitions never read the
/// clock.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct Transaction {
    #[serde(rename = "ID")]
    pub id: String,
    pub method: String,
    pub payment_type: String,
    pub mode: String,
    pub amount: f64,
    pub status: String,
    #[serde(rename = "PatientID")]
    pub patient_id: String,
    #[serde(rename = "TestID", default, skip_serializing_if = "Option::is_none")]
    pub test_id: Option<String>,
    #[serde(rename = "AppointmentID", default, skip_serializing_if = "Option::is_none")]
    pub appointment_id: Option<String>,
    pub created_on: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

/// A ledger asset, tagged by its `Type` field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "Type", rename_all = "lowercase")]
pub enum Asset {
    Diagnosis(Diagnosis),
    Insurance(Insurance),
    Transaction(Transaction),
}

impl Asset {
    pub fn id(&self) -> &str {
        match self {
            Self::Diagnosis(d) => &d.id,
            Self::Insurance(i) => &i.id,
            Self::Transaction(t) => &t.id,
        }
    }

    pub fn kind(&self) -> AssetKind {
        match self {
            Self::Diagnosis(_) => AssetKind::Diagnosis,
            Self::Insurance(_) => AssetKind::Insurance,
            Self::Transaction(_) => AssetKind::Transaction,
        }
    }

    pub fn owner(&self) -> Option<&str> {
        match self {
            Self::Diagnosis(d) => d.owner.as_deref(),
            Self::Insurance(i) => i.owner.as_deref(),
            Self::Transaction(t) => t.owner.as_deref(),
        }
    }

    pub fn set_owner(&mut self, owner: impl Into<String>) {
        let owner = Some(owner.into());
        match self {
            Self::Diagnosis(d) => d.owner = owner,
            Self::Insurance(i) => i.owner = owner,
            Self::Transaction(t) => t.owner = owner,
        }
    }

    /// Structural checks shared by admission and the contract boundary.
    ///
    /// Every text field a creation requires must be non-blank here too, and
    /// optional text fields must be non-blank when present.
    pub fn validate(&self) -> Result<(), TypeError> {
        match self {
            Self::Diagnosis(d) => {
                require("ID", &d.id)?;
                require("DoctorID", &d.doctor_id)?;
                require("PatientID", &d.patient_id)?;
                require("AppointmentID", &d.appointment_id)?;
                require("Diagnosis", &d.diagnosis)?;
                require("TestRecommendations", &d.test_recommendations)?;
                require("Prescription", &d.prescription)?;
                optional("Owner", d.owner.as_deref())
            }
            Self::Insurance(i) => {
                require("ID", &i.id)?;
                require("PaymentID", &i.payment_id)?;
                require("PatientID", &i.patient_id)?;
                require("Status", &i.status)?;
                optional("Owner", i.owner.as_deref())
            }
            Self::Transaction(t) => {
                require("ID", &t.id)?;
                require("Method", &t.method)?;
                require("PaymentType", &t.payment_type)?;
                require("Mode", &t.mode)?;
                require("Status", &t.status)?;
                require("PatientID", &t.patient_id)?;
                optional("TestID", t.test_id.as_deref())?;
                optional("AppointmentID", t.appointment_id.as_deref())?;
                optional("Owner", t.owner.as_deref())?;
                if !t.amount.is_finite() {
                    return Err(TypeError::InvalidAsset("Amount must be a finite number".into()));
                }
                Ok(())
            }
        }
    }

    /// Decode and validate an asset from its JSON form.
    pub fn from_value(value: Value) -> Result<Self, TypeError> {
        let asset: Self =
            serde_json::from_value(value).map_err(|e| TypeError::InvalidAsset(e.to_string()))?;
        asset.validate()?;
        Ok(asset)
    }

    /// JSON form of the asset (not yet canonical; see the canonical encoder).
    pub fn to_value(&self) -> Result<Value, TypeError> {
        serde_json::to_value(self).map_err(|e| TypeError::InvalidAsset(e.to_string()))
    }
}

fn require(field: &str, value: &str) -> Result<(), TypeError> {
    if value.trim().is_empty() {
        return Err(TypeError::InvalidAsset(format!("{field} must not be empty")));
    }
    Ok(())
}

fn optional(field: &str, value: Option<&str>) -> Result<(), TypeError> {
    value.map_or(Ok(()), |value| require(field, value))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn diagnosis() -> Asset {
        Asset::Diagnosis(Diagnosis {
            id: "a1".into(),
            doctor_id: "d1".into(),
            patient_id: "p1".into(),
            appointment_id: "ap1".into(),
            diagnosis: "flu".into(),
            test_recommendations: "none".into(),
            prescription: "rest".into(),
            owner: None,
        })
    }

    #[test]
    fn diagnosis_uses_ledger_field_names() {
        let value = diagnosis().to_value().unwrap();
        assert_eq!(
            value,
            json!({
                "Type": "diagnosis",
                "ID": "a1",
                "DoctorID": "d1",
                "PatientID": "p1",
                "AppointmentID": "ap1",
                "Diagnosis": "flu",
                "TestRecommendations": "none",
                "Prescription": "rest",
            })
        );
    }

    #[test]
    fn transaction_omits_absent_optionals() {
        let value = json!({
            "Type": "transaction",
            "ID": "t1",
            "Method": "card",
            "PaymentType": "appointment",
            "Mode": "online",
            "Amount": 250,
            "Status": "paid",
            "PatientID": "p1",
            "CreatedOn": "2024-03-01T10:00:00Z",
        });
        let asset = Asset::from_value(value).unwrap();
        assert_eq!(asset.kind(), AssetKind::Transaction);
        let encoded = asset.to_value().unwrap();
        assert!(encoded.get("TestID").is_none());
        assert!(encoded.get("AppointmentID").is_none());
    }

    #[test]
    fn unknown_type_is_rejected() {
        let err = Asset::from_value(json!({"Type": "invoice", "ID": "x"})).unwrap_err();
        assert!(matches!(err, TypeError::InvalidAsset(_)));
    }

    #[test]
    fn empty_id_is_rejected() {
        let mut value = diagnosis().to_value().unwrap();
        value["ID"] = json!("");
        assert!(Asset::from_value(value).is_err());
    }

    #[test]
    fn extra_fields_are_rejected() {
        let value = json!({
            "Type": "insurance",
            "ID": "i1",
            "PatientID": "p1",
            "PaymentID": "pay1",
            "Status": "ok",
            "Foo": 1,
        });
        let err = Asset::from_value(value).unwrap_err();
        assert!(matches!(err, TypeError::InvalidAsset(reason) if reason.contains("Foo")));
    }

    #[test]
    fn blank_required_text_is_rejected() {
        for field in ["DoctorID", "PatientID", "AppointmentID", "Diagnosis", "Prescription"] {
            let mut value = diagnosis().to_value().unwrap();
            value[field] = json!("");
            assert!(Asset::from_value(value).is_err(), "{field}");
        }

        let mut value = json!({
            "Type": "transaction",
            "ID": "t1",
            "Method": "card",
            "PaymentType": "test",
            "Mode": "online",
            "Amount": 10,
            "Status": "paid",
            "PatientID": "p1",
            "TestID": " ",
            "CreatedOn": "2024-03-01T10:00:00Z",
        });
        assert!(Asset::from_value(value.clone()).is_err());
        value["TestID"] = json!("lab1");
        assert!(Asset::from_value(value).is_ok());
    }

    #[test]
    fn owner_is_set_in_place() {
        let mut asset = diagnosis();
        assert_eq!(asset.owner(), None);
        asset.set_owner("Org2MSP");
        assert_eq!(asset.owner(), Some("Org2MSP"));
        assert_eq!(asset.to_value().unwrap()["Owner"], json!("Org2MSP"));
    }

    #[test]
    fn kind_parses_wire_values_only() {
        assert_eq!("insurance".parse::<AssetKind>().unwrap(), AssetKind::Insurance);
        assert!("Insurance".parse::<AssetKind>().is_err());
        assert_eq!(
            AssetKind::Transaction.create_operation(),
            OperationName::CreateTransactionAsset
        );
    }
}
