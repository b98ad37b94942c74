use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use shared::protocol::AdminSession;
use thiserror::Error;

const ADMIN_SUBJECT: &str = "admin";
const TOKEN_ISSUER: &str = "leaderboard";

#[derive(Debug, Clone)]
pub struct AdminAuthConfig {
    pub password: String,
    pub token_secret: String,
    pub ttl_seconds: i64,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token lifetime of {0} seconds is out of range")]
    TtlOutOfRange(i64),
    #[error(transparent)]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    iss: String,
    sub: String,
    iat: i64,
    exp: i64,
}

/// Compares the submitted password against the configured shared secret.
pub fn password_matches(cfg: &AdminAuthConfig, submitted: &str) -> bool {
    !cfg.password.is_empty() && cfg.password == submitted
}

pub fn mint_admin_token(
    cfg: &AdminAuthConfig,
    now: DateTime<Utc>,
) -> Result<AdminSession, AuthError> {
    let expires_at = Duration::try_seconds(cfg.ttl_seconds)
        .filter(|ttl| *ttl > Duration::zero())
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or(AuthError::TtlOutOfRange(cfg.ttl_seconds))?;
    let claims = Claims {
        iss: TOKEN_ISSUER.to_string(),
        sub: ADMIN_SUBJECT.to_string(),
        iat: now.timestamp(),
        exp: expires_at.timestamp(),
    };

    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(cfg.token_secret.as_bytes()),
    )?;
    Ok(AdminSession { token, expires_at })
}

/// Checks signature, issuer, subject and expiry of an admin token.
pub fn verify_admin_token(
    cfg: &AdminAuthConfig,
    token: &str,
) -> Result<(), jsonwebtoken::errors::Error> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation.set_issuer(&[TOKEN_ISSUER]);
    validation.sub = Some(ADMIN_SUBJECT.to_string());

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(cfg.token_secret.as_bytes()),
        &validation,
    )?;
    Ok(())
}

#[cfg(test)]
#[path = "tests/auth_tests.rs"]
mod tests;
