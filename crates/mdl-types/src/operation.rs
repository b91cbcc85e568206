use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::asset::Asset;
use crate::error::TypeError;

// ---------------------------------------------------------------------------
// Operation names
// ---------------------------------------------------------------------------

/// Every transition the asset contract exposes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OperationName {
    CreateDiagnosisAsset,
    CreateTransactionAsset,
    CreateInsuranceAsset,
    UpdateAsset,
    TransferAsset,
    DeleteAsset,
    ReadAsset,
    AssetExists,
    GetAllAssets,
}

impl OperationName {
    pub const ALL: [OperationName; 9] = [
        Self::CreateDiagnosisAsset,
        Self::CreateTransactionAsset,
        Self::CreateInsuranceAsset,
        Self::UpdateAsset,
        Self::TransferAsset,
        Self::DeleteAsset,
        Self::ReadAsset,
        Self::AssetExists,
        Self::GetAllAssets,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateDiagnosisAsset => "CreateDiagnosisAsset",
            Self::CreateTransactionAsset => "CreateTransactionAsset",
            Self::CreateInsuranceAsset => "CreateInsuranceAsset",
            Self::UpdateAsset => "UpdateAsset",
            Self::TransferAsset => "TransferAsset",
            Self::DeleteAsset => "DeleteAsset",
            Self::ReadAsset => "ReadAsset",
            Self::AssetExists => "AssetExists",
            Self::GetAllAssets => "GetAllAssets",
        }
    }

    /// Mutating operations are admitted through the submission queue; the
    /// rest are evaluated synchronously.
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Self::ReadAsset | Self::AssetExists | Self::GetAllAssets)
    }

    /// Declared parameters, in positional order.
    pub fn params(&self) -> &'static [ParamSpec] {
        match self {
            Self::CreateDiagnosisAsset => CREATE_DIAGNOSIS,
            Self::CreateTransactionAsset => CREATE_TRANSACTION,
            Self::CreateInsuranceAsset => CREATE_INSURANCE,
            Self::UpdateAsset => UPDATE,
            Self::TransferAsset => TRANSFER,
            Self::DeleteAsset | Self::ReadAsset | Self::AssetExists => ID_ONLY,
            Self::GetAllAssets => &[],
        }
    }

    /// Validate a named payload against the parameter schema and lay it out
    /// positionally. Every violation is reported, not only the first.
    pub fn bind(&self, args: &NamedArguments) -> Result<ArgumentList, Vec<SchemaViolation>> {
        let params = self.params();
        let mut violations = Vec::new();

        for name in args.names() {
            if !params.iter().any(|p| p.name == name) {
                violations.push(SchemaViolation::new(name, "is not a parameter of this operation"));
            }
        }

        let mut values = Vec::with_capacity(params.len());
        for spec in params {
            match args.get(spec.name) {
                None | Some(Value::Null) if !spec.required => values.push(Value::Null),
                None | Some(Value::Null) => {
                    violations.push(SchemaViolation::new(spec.name, "is required"));
                }
                Some(value) => match spec.kind.check(value) {
                    Ok(()) => values.push(value.clone()),
                    Err(reason) => violations.push(SchemaViolation::new(spec.name, reason)),
                },
            }
        }

        if violations.is_empty() {
            Ok(ArgumentList(values))
        } else {
            Err(violations)
        }
    }
}

impl FromStr for OperationName {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| TypeError::UnknownOperation(s.to_string()))
    }
}

impl fmt::Display for OperationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Parameter schemas
// ---------------------------------------------------------------------------

/// Type of a single declared parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamKind {
    /// Non-blank string.
    Text,
    /// JSON number.
    Number,
    /// RFC 3339 timestamp string.
    Timestamp,
    /// A complete tagged asset object.
    Asset,
}

impl ParamKind {
    fn check(&self, value: &Value) -> Result<(), String> {
        match self {
            Self::Text => match value.as_str() {
                Some(s) if !s.trim().is_empty() => Ok(()),
                _ => Err("must be a non-empty string".into()),
            },
            Self::Number => match value.as_f64() {
                Some(n) if n.is_finite() => Ok(()),
                _ => Err("must be a number".into()),
            },
            Self::Timestamp => match value.as_str() {
                Some(s) if DateTime::parse_from_rfc3339(s).is_ok() => Ok(()),
                _ => Err("must be an RFC 3339 timestamp".into()),
            },
            Self::Asset => Asset::from_value(value.clone())
                .map(|_| ())
                .map_err(|e| e.to_string()),
        }
    }
}

/// One declared parameter of an operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
}

const fn required(name: &'static str, kind: ParamKind) -> ParamSpec {
    ParamSpec { name, kind, required: true }
}

const fn optional(name: &'static str, kind: ParamKind) -> ParamSpec {
    ParamSpec { name, kind, required: false }
}

const CREATE_DIAGNOSIS: &[ParamSpec] = &[
    required("id", ParamKind::Text),
    required("doctorId", ParamKind::Text),
    required("patientId", ParamKind::Text),
    required("appointmentId", ParamKind::Text),
    required("diagnosis", ParamKind::Text),
    required("testRecommendations", ParamKind::Text),
    required("prescription", ParamKind::Text),
];

const CREATE_TRANSACTION: &[ParamSpec] = &[
    required("id", ParamKind::Text),
    required("patientId", ParamKind::Text),
    required("method", ParamKind::Text),
    required("paymentType", ParamKind::Text),
    required("mode", ParamKind::Text),
    required("amount", ParamKind::Number),
    required("status", ParamKind::Text),
    required("createdOn", ParamKind::Timestamp),
    optional("testId", ParamKind::Text),
    optional("appointmentId", ParamKind::Text),
];

const CREATE_INSURANCE: &[ParamSpec] = &[
    required("id", ParamKind::Text),
    required("patientId", ParamKind::Text),
    required("paymentId", ParamKind::Text),
    required("status", ParamKind::Text),
];

const UPDATE: &[ParamSpec] = &[
    required("id", ParamKind::Text),
    required("asset", ParamKind::Asset),
];

const TRANSFER: &[ParamSpec] = &[
    required("id", ParamKind::Text),
    required("newOwner", ParamKind::Text),
];

const ID_ONLY: &[ParamSpec] = &[required("id", ParamKind::Text)];

/// A single schema failure, reported back to the caller verbatim.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaViolation {
    pub field: String,
    pub message: String,
}

impl SchemaViolation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field, self.message)
    }
}

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

/// Named argument payload as submitted by a caller.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NamedArguments(BTreeMap<String, Value>);

impl NamedArguments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.0.remove(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Take the fields of a JSON object body.
    pub fn from_object(value: Value) -> Result<Self, TypeError> {
        match value {
            Value::Object(map) => Ok(Self(map.into_iter().collect())),
            _ => Err(TypeError::Argument {
                name: "body".into(),
                reason: "must be a JSON object".into(),
            }),
        }
    }
}

/// Positional argument list, ordered by the operation's declared schema.
/// This is what a job record persists and what a transition consumes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArgumentList(Vec<Value>);

impl ArgumentList {
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn from_values(values: Vec<Value>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[Value] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Re-check arity and types against `operation` and return a reader that
    /// resolves parameters by name.
    pub fn reader(&self, operation: OperationName) -> Result<ArgumentReader<'_>, TypeError> {
        let params = operation.params();
        if params.len() != self.0.len() {
            return Err(TypeError::Arity {
                expected: params.len(),
                actual: self.0.len(),
            });
        }
        for (spec, value) in params.iter().zip(&self.0) {
            if value.is_null() && !spec.required {
                continue;
            }
            spec.kind.check(value).map_err(|reason| TypeError::Argument {
                name: spec.name.to_string(),
                reason,
            })?;
        }
        Ok(ArgumentReader {
            params,
            values: &self.0,
        })
    }
}

/// Typed, by-name view over a validated [`ArgumentList`].
pub struct ArgumentReader<'a> {
    params: &'static [ParamSpec],
    values: &'a [Value],
}

impl<'a> ArgumentReader<'a> {
    fn value(&self, name: &str) -> Result<&'a Value, TypeError> {
        self.params
            .iter()
            .position(|p| p.name == name)
            .map(|index| &self.values[index])
            .ok_or_else(|| TypeError::Argument {
                name: name.to_string(),
                reason: "is not declared by the operation".into(),
            })
    }

    pub fn text(&self, name: &str) -> Result<&'a str, TypeError> {
        self.optional_text(name)?.ok_or_else(|| TypeError::Argument {
            name: name.to_string(),
            reason: "is required".into(),
        })
    }

    pub fn optional_text(&self, name: &str) -> Result<Option<&'a str>, TypeError> {
        match self.value(name)? {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(s.as_str())),
            _ => Err(TypeError::Argument {
                name: name.to_string(),
                reason: "must be a string".into(),
            }),
        }
    }

    pub fn number(&self, name: &str) -> Result<f64, TypeError> {
        self.value(name)?.as_f64().ok_or_else(|| TypeError::Argument {
            name: name.to_string(),
            reason: "must be a number".into(),
        })
    }

    pub fn timestamp(&self, name: &str) -> Result<DateTime<Utc>, TypeError> {
        let raw = self.text(name)?;
        DateTime::parse_from_rfc3339(raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| TypeError::Argument {
                name: name.to_string(),
                reason: e.to_string(),
            })
    }

    pub fn asset(&self, name: &str) -> Result<Asset, TypeError> {
        Asset::from_value(self.value(name)?.clone())
    }
}
