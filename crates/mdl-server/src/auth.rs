use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use mdl_types::TenantId;

use crate::config::TenantConfig;
use crate::error::{ApiError, ServerError, ServerResult};
use crate::state::AppState;
use crate::tenant::TenantContext;

/// Header carrying the caller's API key.
pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Credentials {
    ApiKey(String),
    Anonymous,
}

impl Credentials {
    pub fn from_parts(parts: &Parts) -> Self {
        parts
            .headers
            .get(API_KEY_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|key| !key.is_empty())
            .map(|key| Self::ApiKey(key.to_string()))
            .unwrap_or(Self::Anonymous)
    }
}

/// Maps credentials to a verified tenant identity.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// `None` means the caller is not authenticated.
    async fn authenticate(&self, credentials: &Credentials) -> Option<TenantId>;
}

/// Static API-key table.
#[derive(Clone, Debug, Default)]
pub struct ApiKeyAuth {
    keys: HashMap<String, TenantId>,
}

impl ApiKeyAuth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(tenants: &[TenantConfig]) -> ServerResult<Self> {
        let mut auth = Self::new();
        for tenant in tenants {
            let id = TenantId::new(tenant.msp_id.clone())?;
            for key in &tenant.api_keys {
                if auth.keys.insert(key.clone(), id.clone()).is_some() {
                    return Err(ServerError::Config(
                        "an API key is assigned to more than one tenant".into(),
                    ));
                }
            }
        }
        Ok(auth)
    }

    pub fn with_key(mut self, key: impl Into<String>, tenant: TenantId) -> Self {
        self.keys.insert(key.into(), tenant);
        self
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[async_trait]
impl AuthProvider for ApiKeyAuth {
    async fn authenticate(&self, credentials: &Credentials) -> Option<TenantId> {
        match credentials {
            Credentials::ApiKey(key) => self.keys.get(key).cloned(),
            Credentials::Anonymous => None,
        }
    }
}

/// The authenticated caller's tenant context.
///
/// Rejects with 401 when the key is missing, unknown, or maps to a tenant
/// that has no context.
pub struct CallerTenant(pub Arc<TenantContext>);

#[async_trait]
impl FromRequestParts<AppState> for CallerTenant {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let credentials = Credentials::from_parts(parts);
        let Some(tenant) = state.auth.authenticate(&credentials).await else {
            tracing::debug!(uri = %parts.uri, "unauthenticated request");
            return Err(ApiError::Unauthorized);
        };
        state
            .router
            .tenant(&tenant)
            .map(CallerTenant)
            .ok_or_else(|| {
                tracing::warn!(tenant = %tenant, "authenticated tenant has no context");
                ApiError::Unauthorized
            })
    }
}
