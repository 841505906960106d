use anyhow::anyhow;
use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use tokio::task;

use fintrack_types::api::{
    AccessClaims, ApiResponse, LoginData, LoginRequest, RefreshData, RefreshRequest,
    RegisterRequest,
};

use crate::error::ApiError;
use crate::session;
use crate::state::AppState;

/// Cookie names match the wire contract the frontend already speaks.
pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = run_blocking(move || session::register(&state.db, req)).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(201, user, "user registered successfully")),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (user, pair) = run_blocking(move || session::login(&state.db, &state.tokens, req)).await?;

    let jar = jar
        .add(token_cookie(ACCESS_COOKIE, pair.access_token.clone()))
        .add(token_cookie(REFRESH_COOKIE, pair.refresh_token.clone()));

    let data = LoginData {
        user,
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
    };

    Ok((jar, Json(ApiResponse::new(200, data, "user logged in successfully"))))
}

/// Refresh token comes from the cookie when present, with a JSON body
/// fallback for cookieless clients.
pub async fn refresh_token(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Option<Json<RefreshRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let presented = jar
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .or_else(|| body.and_then(|Json(req)| req.refresh_token));

    let pair = run_blocking(move || session::refresh(&state.db, &state.tokens, presented)).await?;

    let jar = jar
        .add(token_cookie(ACCESS_COOKIE, pair.access_token.clone()))
        .add(token_cookie(REFRESH_COOKIE, pair.refresh_token.clone()));

    let data = RefreshData {
        access_token: pair.access_token,
        new_refresh_token: pair.refresh_token,
    };

    Ok((jar, Json(ApiResponse::new(200, data, "access token refreshed successfully"))))
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(claims): Extension<AccessClaims>,
    jar: CookieJar,
) -> Result<impl IntoResponse, ApiError> {
    run_blocking(move || session::logout(&state.db, claims.sub)).await?;

    let jar = jar
        .remove(expired_cookie(ACCESS_COOKIE))
        .remove(expired_cookie(REFRESH_COOKIE));

    Ok((jar, Json(ApiResponse::new(200, serde_json::json!({}), "user logged out"))))
}

/// Run a blocking session operation off the async runtime.
async fn run_blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(anyhow!("blocking task join error: {}", e)))?
}

fn token_cookie(name: &'static str, value: String) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(true)
        .path("/")
        .build()
}

fn expired_cookie(name: &'static str) -> Cookie<'static> {
    // Path must match the set cookie for the removal to take effect.
    Cookie::build((name, "")).path("/").build()
}
