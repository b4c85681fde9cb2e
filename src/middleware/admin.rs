use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};

use crate::{AppState, routes::admin::AdminError};

/// Require `Authorization: Bearer <auth.admin_token>` when a token is configured.
pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AdminError> {
    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);

    if !state.config.auth.admin_token_matches(token) {
        tracing::warn!(path = %req.uri().path(), "Rejected admin request");
        return Err(AdminError::Unauthorized);
    }
    Ok(next.run(req).await)
}
