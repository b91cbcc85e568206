//! Foundation types for MedLedger.
//!
//! Every other MedLedger crate depends on `mdl-types`.
//!
//! # Key Types
//!
//! - [`TenantId`]: verified organizational identity of a caller
//! - [`JobId`]: UUID v7 identifier of an admitted job
//! - [`Asset`]: tagged union of diagnosis, insurance and transaction records
//! - [`OperationName`]: the contract's transitions and their parameter schemas
//! - [`NamedArguments`] / [`ArgumentList`]: caller payloads and their
//!   schema-ordered positional form

pub mod asset;
pub mod error;
pub mod identity;
pub mod operation;

pub use asset::{Asset, AssetKind, Diagnosis, Insurance, Transaction};
pub use error::TypeError;
pub use identity::{JobId, TenantId};
pub use operation::{
    ArgumentList, ArgumentReader, NamedArguments, OperationName, ParamKind, ParamSpec,
    SchemaViolation,
};
