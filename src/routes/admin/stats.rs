use axum::{
    Json,
    extract::{Query, State},
};
use chrono::Utc;
use serde::Deserialize;

use super::{AdminError, get_services};
use crate::{
    AppState,
    models::{ApiKeyStats, StatsPeriod},
};

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    #[serde(default)]
    pub period: StatsPeriod,
    pub api_key_id: Option<i64>,
}

/// Received messages per API key and service.
#[tracing::instrument(name = "admin.stats.api_keys", skip(state))]
pub async fn api_keys(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<Vec<ApiKeyStats>>, AdminError> {
    let services = get_services(&state)?;
    let stats = services
        .stats
        .api_key_stats(query.period, query.api_key_id, Utc::now())
        .await?;
    Ok(Json(stats))
}
