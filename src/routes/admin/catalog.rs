//! Services, allowed senders, countries, operators and providers.

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use axum_valid::Valid;
use serde::Deserialize;

use super::{AdminError, get_services};
use crate::{
    AppState,
    models::{
        AllowedSender, Country, CreateAllowedSender, CreateCountry, CreateOperator,
        CreateProvider, CreateService, Operator, Provider, Service,
    },
};

#[derive(Debug, Deserialize)]
pub struct OperatorQuery {
    pub country_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SenderQuery {
    pub service_id: Option<i64>,
}

pub async fn list_services(State(state): State<AppState>) -> Result<Json<Vec<Service>>, AdminError> {
    Ok(Json(get_services(&state)?.catalog.list_services().await?))
}

#[tracing::instrument(name = "admin.services.create", skip(state, input), fields(code = %input.code))]
pub async fn create_service(
    State(state): State<AppState>,
    Valid(Json(input)): Valid<Json<CreateService>>,
) -> Result<(StatusCode, Json<Service>), AdminError> {
    let service = get_services(&state)?.catalog.create_service(input).await?;
    Ok((StatusCode::CREATED, Json(service)))
}

pub async fn list_allowed_senders(
    State(state): State<AppState>,
    Query(query): Query<SenderQuery>,
) -> Result<Json<Vec<AllowedSender>>, AdminError> {
    let senders = get_services(&state)?
        .catalog
        .list_allowed_senders(query.service_id)
        .await?;
    Ok(Json(senders))
}

#[tracing::instrument(name = "admin.allowed_senders.create", skip(state, input))]
pub async fn create_allowed_sender(
    State(state): State<AppState>,
    Valid(Json(input)): Valid<Json<CreateAllowedSender>>,
) -> Result<(StatusCode, Json<AllowedSender>), AdminError> {
    let sender = get_services(&state)?
        .catalog
        .create_allowed_sender(input)
        .await?;
    Ok((StatusCode::CREATED, Json(sender)))
}

pub async fn list_countries(State(state): State<AppState>) -> Result<Json<Vec<Country>>, AdminError> {
    Ok(Json(get_services(&state)?.catalog.list_countries().await?))
}

#[tracing::instrument(name = "admin.countries.create", skip(state, input), fields(id = input.id))]
pub async fn create_country(
    State(state): State<AppState>,
    Valid(Json(input)): Valid<Json<CreateCountry>>,
) -> Result<(StatusCode, Json<Country>), AdminError> {
    let country = get_services(&state)?.catalog.create_country(input).await?;
    Ok((StatusCode::CREATED, Json(country)))
}

pub async fn list_operators(
    State(state): State<AppState>,
    Query(query): Query<OperatorQuery>,
) -> Result<Json<Vec<Operator>>, AdminError> {
    let operators = get_services(&state)?
        .catalog
        .list_operators(query.country_id)
        .await?;
    Ok(Json(operators))
}

#[tracing::instrument(name = "admin.operators.create", skip(state, input))]
pub async fn create_operator(
    State(state): State<AppState>,
    Valid(Json(input)): Valid<Json<CreateOperator>>,
) -> Result<(StatusCode, Json<Operator>), AdminError> {
    let operator = get_services(&state)?.catalog.create_operator(input).await?;
    Ok((StatusCode::CREATED, Json(operator)))
}

pub async fn list_providers(State(state): State<AppState>) -> Result<Json<Vec<Provider>>, AdminError> {
    Ok(Json(get_services(&state)?.catalog.list_providers().await?))
}

/// Client workers pick new providers up on the next restart.
#[tracing::instrument(name = "admin.providers.create", skip(state, input), fields(name = %input.name))]
pub async fn create_provider(
    State(state): State<AppState>,
    Valid(Json(input)): Valid<Json<CreateProvider>>,
) -> Result<(StatusCode, Json<Provider>), AdminError> {
    let provider = get_services(&state)?.catalog.create_provider(input).await?;
    Ok((StatusCode::CREATED, Json(provider)))
}
