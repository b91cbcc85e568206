//! HTTP edge for MedLedger.
//!
//! Authenticates callers by API key, resolves each caller to its tenant
//! context, and routes by operation kind: reads are answered synchronously
//! from the tenant's replica, mutations are admitted as jobs and answered
//! with `202 Accepted`. A [`JobApplier`] later applies the jobs.

pub mod auth;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod request;
pub mod response;
pub mod router;
pub mod server;
pub mod state;
pub mod tenant;
pub mod worker;

pub use auth::{ApiKeyAuth, AuthProvider, CallerTenant, Credentials, API_KEY_HEADER};
pub use config::{QueueBackend, ServerConfig, TenantConfig};
pub use dispatch::{DispatchError, Dispatched, TenantRouter};
pub use error::{ApiError, ServerError, ServerResult};
pub use server::MedLedgerServer;
pub use state::AppState;
pub use tenant::{TenantContext, TenantRegistry};
pub use worker::{ApplierSummary, JobApplier};
