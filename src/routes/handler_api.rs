//! `GET /stubs/handler_api.php`, the SMS-Activate compatible reseller API.

use axum::{
    extract::{Query, State, rejection::QueryRejection},
    http::{StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};

use crate::{
    AppState,
    services::{ActivationReply, ActivationRequest},
};

/// Always answers 200: errors are reply codes in the body, including a
/// query string that does not parse (e.g. a repeated key).
pub async fn handler_api(
    State(state): State<AppState>,
    query: Result<Query<ActivationRequest>, QueryRejection>,
) -> Response {
    let Some(services) = state.services.as_ref() else {
        return text("ERROR_SQL".to_string());
    };
    let req = match query {
        Ok(Query(req)) => req,
        Err(rejection) => {
            tracing::debug!(error = %rejection.body_text(), "Unparseable handler API query");
            return text("BAD_ACTION".to_string());
        }
    };
    match services.activation.handle(&req).await {
        reply @ ActivationReply::NumbersStatus(_) => (
            StatusCode::OK,
            [(CONTENT_TYPE, "application/json")],
            reply.to_string(),
        )
            .into_response(),
        ActivationReply::Text(body) => text(body),
    }
}

fn text(body: String) -> Response {
    (
        StatusCode::OK,
        [(CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response()
}
