use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use uuid::Uuid;

use fintrack_db::models::UserRow;
use fintrack_types::api::{AccessClaims, RefreshClaims};

/// Signing configuration for the two token kinds. The secrets are
/// independent so that compromise of one does not compromise the other,
/// and each kind carries its own expiry policy.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub access_secret: String,
    pub access_ttl_minutes: i64,
    pub refresh_secret: String,
    pub refresh_ttl_days: i64,
}

/// Short-lived token over the full identity claims.
pub fn issue_access_token(cfg: &TokenConfig, user: &UserRow) -> Result<String> {
    let claims = AccessClaims {
        sub: user.id.parse().context("corrupt user id in users table")?,
        username: user.username.clone(),
        email: user.email.clone(),
        fullname: user.fullname.clone(),
        exp: expiry(Duration::minutes(cfg.access_ttl_minutes)),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(cfg.access_secret.as_bytes()),
    )?;

    Ok(token)
}

/// Long-lived token over just the user id.
pub fn issue_refresh_token(cfg: &TokenConfig, user_id: Uuid) -> Result<String> {
    let claims = RefreshClaims {
        sub: user_id,
        exp: expiry(Duration::days(cfg.refresh_ttl_days)),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(cfg.refresh_secret.as_bytes()),
    )?;

    Ok(token)
}

pub fn verify_access_token(
    cfg: &TokenConfig,
    token: &str,
) -> std::result::Result<AccessClaims, jsonwebtoken::errors::Error> {
    let data = decode::<AccessClaims>(
        token,
        &DecodingKey::from_secret(cfg.access_secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

pub fn verify_refresh_token(
    cfg: &TokenConfig,
    token: &str,
) -> std::result::Result<RefreshClaims, jsonwebtoken::errors::Error> {
    let data = decode::<RefreshClaims>(
        token,
        &DecodingKey::from_secret(cfg.refresh_secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

fn expiry(ttl: Duration) -> usize {
    (Utc::now() + ttl).timestamp() as usize
}
