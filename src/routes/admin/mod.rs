pub mod api_keys;
pub mod catalog;
mod error;
pub mod numbers;
pub mod orphans;
pub mod stats;
pub mod tester;

use axum::{
    Router,
    routing::{get, post},
};
pub use error::{AdminError, ErrorResponse};

use crate::{AppState, services::Services};

fn get_services(state: &AppState) -> Result<&Services, AdminError> {
    state.services.as_ref().ok_or(AdminError::DatabaseRequired)
}

/// Routes nested under `/admin`. Authentication is layered on in `build_app`.
pub fn get_admin_routes() -> Router<AppState> {
    Router::new()
        // Number pool
        .route("/numbers/import", post(numbers::import))
        .route("/numbers/generate", post(numbers::generate))
        .route("/numbers/delete", post(numbers::delete))
        .route("/numbers/shuffle", post(numbers::shuffle))
        // Orphans
        .route("/orphans/enrich", post(orphans::enrich))
        .route("/orphans/report", get(orphans::report))
        .route("/orphans/numbers", get(orphans::numbers))
        // Tester
        .route("/tester/custom-number", post(tester::custom_number))
        .route("/tester/number-by-mask", post(tester::number_by_mask))
        .route("/sessions/{id}/sms", get(tester::session_messages))
        // Statistics
        .route("/stats/api-keys", get(stats::api_keys))
        // API keys
        .route("/api-keys", get(api_keys::list).post(api_keys::create))
        // Catalog
        .route(
            "/services",
            get(catalog::list_services).post(catalog::create_service),
        )
        .route(
            "/allowed-senders",
            get(catalog::list_allowed_senders).post(catalog::create_allowed_sender),
        )
        .route(
            "/countries",
            get(catalog::list_countries).post(catalog::create_country),
        )
        .route(
            "/operators",
            get(catalog::list_operators).post(catalog::create_operator),
        )
        .route(
            "/providers",
            get(catalog::list_providers).post(catalog::create_provider),
        )
}
