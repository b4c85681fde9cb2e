use axum::{
    Json,
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use super::{AdminError, get_services, numbers::Updated};
use crate::{
    AppState,
    models::{OrphanNumbersFilter, OrphanReportRow},
};

#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    100
}

/// Fill missing provider, country and operator on stored orphans.
#[tracing::instrument(name = "admin.orphans.enrich", skip(state))]
pub async fn enrich(State(state): State<AppState>) -> Result<Json<Updated>, AdminError> {
    let services = get_services(&state)?;
    let updated = services.orphans.enrich().await?;
    Ok(Json(Updated { updated }))
}

#[tracing::instrument(name = "admin.orphans.report", skip(state))]
pub async fn report(
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> Result<Json<Vec<OrphanReportRow>>, AdminError> {
    let services = get_services(&state)?;
    Ok(Json(services.orphans.report(query.limit).await?))
}

/// Ids arrive as text because blank form values mean "any".
#[derive(Debug, Deserialize)]
pub struct NumbersQuery {
    pub source_addr: String,
    pub provider_id: Option<String>,
    pub country_id: Option<String>,
    pub operator_id: Option<String>,
    /// `csv` for a download, JSON otherwise.
    pub format: Option<String>,
}

fn optional_id(value: Option<&str>) -> Option<i64> {
    value.and_then(|v| v.trim().parse().ok())
}

/// Numbers behind one sender's orphans, as JSON or CSV.
#[tracing::instrument(name = "admin.orphans.numbers", skip(state))]
pub async fn numbers(
    State(state): State<AppState>,
    Query(query): Query<NumbersQuery>,
) -> Result<Response, AdminError> {
    let services = get_services(&state)?;
    let filter = OrphanNumbersFilter {
        source_addr: query.source_addr,
        provider_id: optional_id(query.provider_id.as_deref()),
        country_id: optional_id(query.country_id.as_deref()),
        operator_id: optional_id(query.operator_id.as_deref()),
    };
    let detail = services.orphans.numbers(&filter).await?;

    if query.format.as_deref() == Some("csv") {
        let disposition = format!(
            "attachment; filename=\"numbers_{}.csv\"",
            sanitize_filename(&detail.source_addr)
        );
        return Ok((
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                (header::CONTENT_DISPOSITION, disposition),
            ],
            detail.to_csv(),
        )
            .into_response());
    }
    Ok(Json(detail).into_response())
}

fn sanitize_filename(source: &str) -> String {
    source
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
