use std::sync::Arc;

use crate::auth::AuthProvider;
use crate::dispatch::TenantRouter;

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<dyn AuthProvider>,
    pub router: Arc<TenantRouter>,
}

impl AppState {
    pub fn new(auth: Arc<dyn AuthProvider>, router: Arc<TenantRouter>) -> Self {
        Self { auth, router }
    }
}
