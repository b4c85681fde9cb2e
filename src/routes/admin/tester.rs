//! Manual activation testing: open sessions on chosen or generated numbers
//! and read back what they received.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use axum_valid::Valid;

use super::{AdminError, get_services};
use crate::{
    AppState,
    db::DbError,
    models::{CustomNumberSession, MaskNumberSession, SessionMessages, TesterSession},
};

#[tracing::instrument(name = "admin.tester.custom_number", skip(state, input), fields(service = %input.service))]
pub async fn custom_number(
    State(state): State<AppState>,
    Valid(Json(input)): Valid<Json<CustomNumberSession>>,
) -> Result<(StatusCode, Json<TesterSession>), AdminError> {
    let opened = get_services(&state)?.activation.custom_number(&input).await?;
    Ok((StatusCode::CREATED, Json(opened)))
}

#[tracing::instrument(name = "admin.tester.number_by_mask", skip(state, input), fields(mask = %input.mask))]
pub async fn number_by_mask(
    State(state): State<AppState>,
    Valid(Json(input)): Valid<Json<MaskNumberSession>>,
) -> Result<(StatusCode, Json<TesterSession>), AdminError> {
    let opened = get_services(&state)?.activation.number_by_mask(&input).await?;
    Ok((StatusCode::CREATED, Json(opened)))
}

pub async fn session_messages(
    State(state): State<AppState>,
    Path(session_id): Path<i64>,
) -> Result<Json<SessionMessages>, AdminError> {
    let messages = get_services(&state)?
        .activation
        .session_messages(session_id)
        .await
        .map_err(|e| match e {
            DbError::NotFound => {
                AdminError::NotFound(format!("Session {session_id} not found"))
            }
            other => other.into(),
        })?;
    Ok(Json(messages))
}
