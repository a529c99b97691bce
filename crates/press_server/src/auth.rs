use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use shared::domain::UserId;

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub ttl_seconds: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Claims {
    pub(crate) sub: String,
    pub(crate) email: String,
    pub(crate) sid: String,
    pub(crate) iat: i64,
    pub(crate) exp: i64,
}

impl Claims {
    pub(crate) fn user_id(&self) -> Option<UserId> {
        self.sub.parse().ok().map(UserId)
    }
}

pub(crate) struct MintedSession {
    pub(crate) token: String,
    pub(crate) session_id: String,
    pub(crate) expires_at: DateTime<Utc>,
}

pub(crate) fn mint_session_token(
    cfg: &AuthConfig,
    user_id: UserId,
    email: &str,
) -> Result<MintedSession, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let expires_at = now + Duration::seconds(cfg.ttl_seconds);
    let session_id = uuid::Uuid::new_v4().to_string();
    let claims = Claims {
        sub: user_id.0.to_string(),
        email: email.to_string(),
        sid: session_id.clone(),
        iat: now.timestamp(),
        exp: expires_at.timestamp(),
    };

    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(cfg.jwt_secret.as_bytes()),
    )?;
    Ok(MintedSession {
        token,
        session_id,
        // Round to whole seconds so it matches the token's `exp`.
        expires_at: Utc
            .timestamp_opt(expires_at.timestamp(), 0)
            .single()
            .unwrap_or(expires_at),
    })
}

pub(crate) fn verify_session_token(
    cfg: &AuthConfig,
    token: &str,
) -> Result<Claims, jsonwebtoken::errors::Error> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(cfg.jwt_secret.as_bytes()),
        &validation,
    )?;
    Ok(data.claims)
}

/// Argon2id hash of `password` as a PHC string (algorithm, parameters and
/// salt included).
pub(crate) fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::encode_b64(uuid::Uuid::new_v4().as_bytes())?;
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// False for a wrong password and for a hash that cannot be parsed.
pub(crate) fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

#[cfg(test)]
#[path = "tests/auth_tests.rs"]
mod tests;
