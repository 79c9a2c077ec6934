//! Staff authentication: password hashes, access tokens and the signed
//! payloads carried by messenger deep links.

use base64::Engine;
use chrono::Utc;
use jsonwebtoken::{errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use pbkdf2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use pbkdf2::{Params, Pbkdf2};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;

const SALT_LENGTH: usize = 16;
const HASH_LENGTH: usize = 32;
const LINK_TAG_LENGTH: usize = 12;
const LINK_DOMAIN: &[u8] = b"clinic-reviews/messenger-link/v1";

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Access token expired")]
    TokenExpired,

    #[error("Access token invalid: {0}")]
    TokenInvalid(String),

    #[error("Password hashing failed: {0}")]
    Hashing(String),
}

// ── Passwords ───────────────────────────────────────────

/// Hash a password into a PBKDF2-SHA256 PHC string.
pub fn hash_password(password: &str, rounds: u32) -> Result<String, AuthError> {
    let salt_bytes: [u8; SALT_LENGTH] = rand::random();
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| AuthError::Hashing(e.to_string()))?;
    let params = Params {
        rounds,
        output_length: HASH_LENGTH,
    };
    let hash = Pbkdf2
        .hash_password_customized(password.as_bytes(), None, None, params, &salt)
        .map_err(|e| AuthError::Hashing(e.to_string()))?;
    Ok(hash.to_string())
}

/// Check a password against a stored PHC string. Malformed hashes never match.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Pbkdf2.verify_password(password.as_bytes(), &parsed).is_ok(),
        Err(_) => false,
    }
}

// ── Access tokens ───────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i64,
    pub iat: i64,
    pub exp: i64,
}

/// Issue an HS256 access token valid for `ttl_hours`.
pub fn issue_token(user_id: i64, secret: &str, ttl_hours: u64) -> Result<String, AuthError> {
    let now = Utc::now().timestamp();
    let ttl = i64::try_from(ttl_hours.saturating_mul(3600)).unwrap_or(i64::MAX);
    encode_claims(
        &Claims {
            user_id,
            iat: now,
            exp: now.saturating_add(ttl),
        },
        secret,
    )
}

fn encode_claims(claims: &Claims, secret: &str) -> Result<String, AuthError> {
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AuthError::TokenInvalid(e.to_string()))
}

/// Validate signature and expiry, returning the claims.
pub fn decode_token(token: &str, secret: &str) -> Result<Claims, AuthError> {
    let validation = Validation::new(Algorithm::HS256);
    jsonwebtoken::decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::TokenInvalid(e.to_string()),
        })
}

// ── Messenger link payloads ─────────────────────────────

fn link_tag(user_id: i64, secret: &str) -> [u8; LINK_TAG_LENGTH] {
    let mut hasher = Sha256::new();
    hasher.update(LINK_DOMAIN);
    hasher.update(secret.as_bytes());
    hasher.update(user_id.to_be_bytes());
    let digest = hasher.finalize();
    let mut tag = [0u8; LINK_TAG_LENGTH];
    tag.copy_from_slice(&digest[..LINK_TAG_LENGTH]);
    tag
}

/// Opaque deep-link payload identifying a user. URL-safe, 27 characters, so
/// it fits Telegram's `start` parameter.
pub fn encode_link_payload(user_id: i64, secret: &str) -> String {
    let mut bytes = Vec::with_capacity(8 + LINK_TAG_LENGTH);
    bytes.extend_from_slice(&user_id.to_be_bytes());
    bytes.extend_from_slice(&link_tag(user_id, secret));
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Recover the user id from a payload. Tampered or foreign payloads yield
/// `None`.
pub fn decode_link_payload(payload: &str, secret: &str) -> Option<i64> {
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload.trim())
        .ok()?;
    if bytes.len() != 8 + LINK_TAG_LENGTH {
        return None;
    }
    let (id_bytes, tag) = bytes.split_at(8);
    let user_id = i64::from_be_bytes(id_bytes.try_into().ok()?);
    let expected = link_tag(user_id, secret);
    if expected[..].ct_eq(tag).unwrap_u8() == 1 {
        Some(user_id)
    } else {
        None
    }
}
