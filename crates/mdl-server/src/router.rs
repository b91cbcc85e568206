use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handler;
use crate::state::AppState;

/// Build the axum router with every MedLedger endpoint.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handler::health))
        .route(
            "/api/assets",
            get(handler::list_assets).post(handler::create_asset),
        )
        .route(
            "/api/assets/:asset_id",
            get(handler::read_asset)
                .options(handler::asset_options)
                .put(handler::update_asset)
                .patch(handler::transfer_asset)
                .delete(handler::delete_asset),
        )
        .route("/api/jobs/:job_id", get(handler::job_status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
