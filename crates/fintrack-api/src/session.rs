//! Session lifecycle: registration, login, refresh-token rotation, logout.
//!
//! These are synchronous domain operations over the injected database
//! handle; HTTP handlers bridge them onto the async runtime with
//! `spawn_blocking`. Per user the lifecycle is
//! `Registered -> LoggedIn(T1) -> LoggedIn(T2) -> ... -> LoggedOut`,
//! and a refresh presenting anything but the current token is rejected
//! without a state change.

use anyhow::{Context, anyhow};
use chrono::{DateTime, NaiveDateTime, Utc};
use uuid::Uuid;

use fintrack_db::Database;
use fintrack_db::models::UserRow;
use fintrack_types::api::{LoginRequest, RegisterRequest, UserResponse};

use crate::error::ApiError;
use crate::password;
use crate::token::{self, TokenConfig};

#[derive(Debug)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

pub fn register(db: &Database, req: RegisterRequest) -> Result<UserResponse, ApiError> {
    let RegisterRequest {
        fullname,
        email,
        username,
        password,
    } = req;

    if [&fullname, &email, &username, &password]
        .iter()
        .any(|field| field.trim().is_empty())
    {
        return Err(ApiError::validation("all fields are required"));
    }

    // Usernames are stored and looked up lowercase.
    let username = username.to_lowercase();

    let username_taken = db.get_user_by_username(&username)?.is_some();
    let email_taken = db.get_user_by_email(&email)?.is_some();
    if username_taken || email_taken {
        return Err(ApiError::conflict("user with email or username already exists"));
    }

    let password_hash = password::hash(&password)?;
    let id = Uuid::new_v4();

    db.create_user(&id.to_string(), &username, &email, &fullname, &password_hash)?;

    let created = db
        .get_user_by_id(&id.to_string())?
        .ok_or_else(|| ApiError::Internal(anyhow!("user row missing right after insert")))?;

    sanitize(created)
}

pub fn login(
    db: &Database,
    tokens: &TokenConfig,
    req: LoginRequest,
) -> Result<(UserResponse, TokenPair), ApiError> {
    let user = match (req.username.as_deref(), req.email.as_deref()) {
        (None, None) => return Err(ApiError::validation("username or email is required")),
        (Some(username), _) => db.get_user_by_username(&username.to_lowercase())?,
        (None, Some(email)) => db.get_user_by_email(email)?,
    };

    let user = user.ok_or_else(|| ApiError::not_found("user does not exist"))?;

    if !password::verify(&req.password, &user.password)? {
        return Err(ApiError::auth("invalid password"));
    }

    let pair = issue_token_pair(db, tokens, &user)?;

    Ok((sanitize(user)?, pair))
}

/// Rotation step: verify the presented token, check it against the single
/// stored value, then issue and persist a fresh pair. Two concurrent
/// refreshes for the same user race on the store; the last write wins and
/// the loser's token fails its next presentation. Accepted behavior.
pub fn refresh(
    db: &Database,
    tokens: &TokenConfig,
    presented: Option<String>,
) -> Result<TokenPair, ApiError> {
    let presented = presented
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::auth("unauthorized request"))?;

    let claims = token::verify_refresh_token(tokens, &presented)
        .map_err(|e| ApiError::auth(format!("invalid refresh token: {e}")))?;

    let user = db
        .get_user_by_id(&claims.sub.to_string())?
        .ok_or_else(|| ApiError::auth("invalid refresh token"))?;

    // Anti-replay: only the currently stored token is acceptable. An older
    // rotated-out token fails here even while its own expiry holds.
    if user.refresh_token.as_deref() != Some(presented.as_str()) {
        return Err(ApiError::auth("refresh token is expired or already used"));
    }

    issue_token_pair(db, tokens, &user)
}

pub fn logout(db: &Database, user_id: Uuid) -> Result<(), ApiError> {
    db.clear_refresh_token(&user_id.to_string())?;
    Ok(())
}

/// Issues both tokens and persists the refresh token as the user's single
/// active value. The write touches only the refresh_token column.
fn issue_token_pair(
    db: &Database,
    tokens: &TokenConfig,
    user: &UserRow,
) -> Result<TokenPair, ApiError> {
    let user_id: Uuid = user.id.parse().context("corrupt user id in users table")?;

    let access_token = token::issue_access_token(tokens, user)
        .context("something went wrong while generating access and refresh tokens")?;
    let refresh_token = token::issue_refresh_token(tokens, user_id)
        .context("something went wrong while generating access and refresh tokens")?;

    db.set_refresh_token(&user.id, &refresh_token)?;

    Ok(TokenPair {
        access_token,
        refresh_token,
    })
}

fn sanitize(row: UserRow) -> Result<UserResponse, ApiError> {
    let id = row.id.parse().context("corrupt user id in users table")?;
    let created_at =
        parse_sqlite_datetime(&row.created_at).context("corrupt created_at in users table")?;

    Ok(UserResponse {
        id,
        username: row.username,
        email: row.email,
        fullname: row.fullname,
        created_at,
    })
}

fn parse_sqlite_datetime(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    // SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS" without timezone.
    // Parse as naive UTC when the RFC 3339 form does not match.
    raw.parse::<DateTime<Utc>>().or_else(|_| {
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn test_tokens() -> TokenConfig {
        TokenConfig {
            access_secret: "access-test-secret".into(),
            access_ttl_minutes: 15,
            refresh_secret: "refresh-test-secret".into(),
            refresh_ttl_days: 10,
        }
    }

    fn alice() -> RegisterRequest {
        RegisterRequest {
            fullname: "Alice A".into(),
            email: "a@x.com".into(),
            username: "alice".into(),
            password: "secret1".into(),
        }
    }

    #[test]
    fn register_rejects_blank_fields() {
        let db = test_db();

        let req = RegisterRequest {
            fullname: "   ".into(),
            ..alice()
        };
        let err = register(&db, req).unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn register_normalizes_username_and_detects_conflicts() {
        let db = test_db();

        let req = RegisterRequest {
            username: "AliCe".into(),
            ..alice()
        };
        let user = register(&db, req).unwrap();
        assert_eq!(user.username, "alice");

        // Same username, different case.
        let req = RegisterRequest {
            email: "other@x.com".into(),
            username: "ALICE".into(),
            ..alice()
        };
        assert!(matches!(register(&db, req).unwrap_err(), ApiError::Conflict(_)));

        // Same email, different username.
        let req = RegisterRequest {
            username: "bob".into(),
            ..alice()
        };
        assert!(matches!(register(&db, req).unwrap_err(), ApiError::Conflict(_)));
    }

    #[test]
    fn login_requires_an_identifier() {
        let db = test_db();

        let err = login(
            &db,
            &test_tokens(),
            LoginRequest {
                username: None,
                email: None,
                password: "secret1".into(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn login_error_paths() {
        let db = test_db();
        let tokens = test_tokens();
        register(&db, alice()).unwrap();

        let err = login(
            &db,
            &tokens,
            LoginRequest {
                username: Some("nobody".into()),
                email: None,
                password: "secret1".into(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));

        let err = login(
            &db,
            &tokens,
            LoginRequest {
                username: Some("alice".into()),
                email: None,
                password: "wrong".into(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, ApiError::Auth(_)));
    }

    #[test]
    fn login_accepts_email_and_mixed_case_username() {
        let db = test_db();
        let tokens = test_tokens();
        register(&db, alice()).unwrap();

        let (user, _) = login(
            &db,
            &tokens,
            LoginRequest {
                username: None,
                email: Some("a@x.com".into()),
                password: "secret1".into(),
            },
        )
        .unwrap();
        assert_eq!(user.username, "alice");

        login(
            &db,
            &tokens,
            LoginRequest {
                username: Some("Alice".into()),
                email: None,
                password: "secret1".into(),
            },
        )
        .unwrap();
    }

    #[test]
    fn refresh_rejects_missing_and_garbage_tokens() {
        let db = test_db();
        let tokens = test_tokens();

        assert!(matches!(
            refresh(&db, &tokens, None).unwrap_err(),
            ApiError::Auth(_)
        ));
        assert!(matches!(
            refresh(&db, &tokens, Some(String::new())).unwrap_err(),
            ApiError::Auth(_)
        ));
        assert!(matches!(
            refresh(&db, &tokens, Some("not-a-jwt".into())).unwrap_err(),
            ApiError::Auth(_)
        ));
    }

    #[test]
    fn refresh_rejects_token_for_deleted_user() {
        let db = test_db();
        let tokens = test_tokens();

        // Valid signature, but the subject was never registered.
        let ghost = token::issue_refresh_token(&tokens, Uuid::new_v4()).unwrap();
        let err = refresh(&db, &tokens, Some(ghost)).unwrap_err();
        assert!(matches!(err, ApiError::Auth(_)));
    }
}
