use axum::{
    Json,
    extract::{Multipart, State},
};
use axum_valid::Valid;
use serde::Serialize;

use super::{AdminError, get_services};
use crate::{
    AppState,
    models::{GenerateNumbers, GenerateSummary, ImportSummary, PhoneNumberFilter},
    services::NumberOrigin,
};

#[derive(Debug, Serialize)]
pub struct Deleted {
    pub deleted: u64,
}

#[derive(Debug, Serialize)]
pub struct Updated {
    pub updated: u64,
}

fn parse_id(field: &str, value: &str) -> Result<i64, AdminError> {
    value
        .trim()
        .parse()
        .map_err(|_| AdminError::BadRequest(format!("{field} must be an integer")))
}

/// Import numbers from an uploaded text file, one per line.
///
/// Multipart fields: `file`, `provider_id`, `country_id`, optional `operator_id`.
#[tracing::instrument(name = "admin.numbers.import", skip(state, multipart))]
pub async fn import(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ImportSummary>, AdminError> {
    let services = get_services(&state)?;

    let mut content = None;
    let mut provider_id = None;
    let mut country_id = None;
    let mut operator_id = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AdminError::BadRequest(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AdminError::BadRequest(e.to_string()))?;
                content = Some(String::from_utf8_lossy(&bytes).into_owned());
            }
            "provider_id" | "country_id" | "operator_id" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AdminError::BadRequest(e.to_string()))?;
                match name.as_str() {
                    "provider_id" => provider_id = Some(parse_id(&name, &text)?),
                    "country_id" => country_id = Some(parse_id(&name, &text)?),
                    // Blank or non-numeric operator means none.
                    _ => operator_id = text.trim().parse().ok(),
                }
            }
            _ => {}
        }
    }

    let content = content.ok_or_else(|| AdminError::BadRequest("file is required".into()))?;
    let origin = NumberOrigin {
        provider_id: provider_id
            .ok_or_else(|| AdminError::BadRequest("provider_id is required".into()))?,
        country_id: country_id
            .ok_or_else(|| AdminError::BadRequest("country_id is required".into()))?,
        operator_id,
    };

    let summary = services.numbers.import(&content, origin).await?;
    Ok(Json(summary))
}

#[tracing::instrument(name = "admin.numbers.generate", skip(state, input), fields(mask = %input.mask))]
pub async fn generate(
    State(state): State<AppState>,
    Valid(Json(input)): Valid<Json<GenerateNumbers>>,
) -> Result<Json<GenerateSummary>, AdminError> {
    let services = get_services(&state)?;
    Ok(Json(services.numbers.generate(&input).await?))
}

#[tracing::instrument(name = "admin.numbers.delete", skip(state))]
pub async fn delete(
    State(state): State<AppState>,
    Json(filter): Json<PhoneNumberFilter>,
) -> Result<Json<Deleted>, AdminError> {
    let services = get_services(&state)?;
    let deleted = services.numbers.delete(&filter).await?;
    Ok(Json(Deleted { deleted }))
}

#[tracing::instrument(name = "admin.numbers.shuffle", skip(state))]
pub async fn shuffle(State(state): State<AppState>) -> Result<Json<Updated>, AdminError> {
    let services = get_services(&state)?;
    let updated = services.numbers.shuffle().await?;
    Ok(Json(Updated { updated }))
}
