use axum::{Json, extract::State, http::StatusCode};
use axum_valid::Valid;

use super::{AdminError, get_services};
use crate::{
    AppState,
    models::{ApiKey, CreateApiKey, CreatedApiKey},
};

/// Create a reseller API key. The raw key is only returned here.
#[tracing::instrument(name = "admin.api_keys.create", skip(state, input))]
pub async fn create(
    State(state): State<AppState>,
    Valid(Json(input)): Valid<Json<CreateApiKey>>,
) -> Result<(StatusCode, Json<CreatedApiKey>), AdminError> {
    let services = get_services(&state)?;
    let created = services.api_keys.create(input).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[tracing::instrument(name = "admin.api_keys.list", skip(state))]
pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<ApiKey>>, AdminError> {
    let services = get_services(&state)?;
    Ok(Json(services.api_keys.list().await?))
}
