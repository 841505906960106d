use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;

use crate::error::ApiError;
use crate::handlers::ACCESS_COOKIE;
use crate::state::AppState;
use crate::token;

/// Extract and validate the access token from the accessToken cookie or
/// an Authorization bearer header, and expose the decoded claims to the
/// protected handler as a request extension.
pub async fn require_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = jar
        .get(ACCESS_COOKIE)
        .map(|c| c.value().to_string())
        .or_else(|| {
            req.headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(|v| v.to_string())
        })
        .ok_or_else(|| ApiError::auth("unauthorized request"))?;

    let claims = token::verify_access_token(&state.tokens, &token)
        .map_err(|e| ApiError::auth(format!("invalid access token: {}", e)))?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
