use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::post,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use fintrack_api::handlers;
use fintrack_api::middleware::require_auth;
use fintrack_api::state::{AppState, AppStateInner};
use fintrack_api::token::TokenConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fintrack=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let db_path = env_or("FINTRACK_DB_PATH", "fintrack.db");
    let host = env_or("FINTRACK_HOST", "0.0.0.0");
    let port: u16 = env_or("FINTRACK_PORT", "3000").parse()?;
    let cors_origin = env_or("FINTRACK_CORS_ORIGIN", "*");

    let tokens = TokenConfig {
        access_secret: env_or("FINTRACK_ACCESS_TOKEN_SECRET", "dev-access-secret-change-me"),
        access_ttl_minutes: env_or("FINTRACK_ACCESS_TOKEN_TTL_MINUTES", "15").parse()?,
        refresh_secret: env_or("FINTRACK_REFRESH_TOKEN_SECRET", "dev-refresh-secret-change-me"),
        refresh_ttl_days: env_or("FINTRACK_REFRESH_TOKEN_TTL_DAYS", "10").parse()?,
    };

    // Init database
    let db = fintrack_db::Database::open(&PathBuf::from(&db_path))?;

    // Shared state
    let state: AppState = Arc::new(AppStateInner { db, tokens });

    // Routes
    let public_routes = Router::new()
        .route("/api/v1/users/register", post(handlers::register))
        .route("/api/v1/users/login", post(handlers::login))
        .route("/api/v1/users/refresh-token", post(handlers::refresh_token))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/api/v1/users/logout", post(handlers::logout))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    // Cookies need credentialed CORS when a concrete origin is configured.
    let cors = match cors_origin.as_str() {
        "*" => CorsLayer::permissive(),
        origin => CorsLayer::new()
            .allow_origin(origin.parse::<HeaderValue>()?)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            .allow_credentials(true),
    };

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("FinTrack server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
