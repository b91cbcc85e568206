//! Admission gate for MedLedger.
//!
//! Every mutating request passes through the gate before it is persisted as
//! a job. The gate runs a fail-fast pipeline:
//!
//! 1. [`SchemaStage`] checks the named payload against the operation's
//!    parameter schema and binds it to positional form.
//! 2. [`EvictionPolicyStage`] asks the [`BackpressureGuard`] whether the
//!    admission store is configured never to evict. If it is not, or the
//!    answer is unknown, admission is deferred.

pub mod config;
pub mod error;
pub mod gate;
pub mod policy;
pub mod stage;
pub mod stages;

pub use config::GateConfig;
pub use error::{GateError, GateResult};
pub use gate::{AdmissionGate, AdmissionResult, Decision};
pub use policy::{
    reply_permits, BackpressureGuard, EvictionPolicySource, RedisPolicySource, StaticPolicySource,
};
pub use stage::{AdmissionRequest, GateContext, GateStage, StageDecision, StageResult};
pub use stages::{EvictionPolicyStage, SchemaStage};
