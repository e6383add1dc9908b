//! Registration, login, and bearer-token authentication.
//!
//! Tokens are opaque: 32 random bytes, base64url-encoded for the client,
//! stored server-side only as a sha256 digest with an expiry. Passwords
//! are salted and stretched with iterated sha256.

use std::sync::{Arc, LazyLock};

use axum::Json;
use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::{StatusCode, header};
use rand::RngCore;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::ids::UserId;
use crate::core::models::User;
use crate::storage::SessionLookup;

use super::error::{ApiError, ApiResult};
use super::state::AppState;

/// Stretching rounds for password digests.
const PASSWORD_ROUNDS: u32 = 100_000;

static NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z ]{1,49}$").expect("static pattern"));
static EMAIL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("static pattern"));

/// Mint a fresh opaque bearer token.
#[must_use]
pub fn generate_token() -> String {
    use base64::Engine as _;
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Digest a token for storage and lookup.
#[must_use]
pub fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Produce a `salt$digest` password hash.
#[must_use]
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt);
    format!(
        "{}${}",
        hex::encode(salt),
        hex::encode(stretch(&salt, password))
    )
}

/// Check a password against a stored `salt$digest` hash.
#[must_use]
pub fn verify_password(password: &str, stored: &str) -> bool {
    let Some((salt_hex, digest_hex)) = stored.split_once('$') else {
        return false;
    };
    let Ok(salt) = hex::decode(salt_hex) else {
        return false;
    };
    hex::encode(stretch(&salt, password)) == digest_hex
}

fn stretch(salt: &[u8], password: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    let mut digest: [u8; 32] = hasher.finalize().into();
    for _ in 1..PASSWORD_ROUNDS {
        digest = Sha256::digest(digest).into();
    }
    digest
}

fn password_is_strong(password: &str, min_chars: usize) -> bool {
    password.chars().count() >= min_chars
        && password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| c.is_ascii_lowercase())
        && password.chars().any(|c| c.is_ascii_digit())
}

/// The authenticated caller, resolved from the `Authorization` header.
#[derive(Clone, Copy, Debug)]
pub struct AuthUser {
    /// The caller's user id.
    pub id: UserId,
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(|| {
                ApiError::Unauthorized("Not authorized, no token provided".to_string())
            })?;

        match state.storage.sessions().lookup(&token_digest(token)).await? {
            SessionLookup::Valid(id) => Ok(Self { id }),
            SessionLookup::Expired => Err(ApiError::Unauthorized(
                "Not authorized, session expired".to_string(),
            )),
            SessionLookup::NotFound => Err(ApiError::Unauthorized(
                "Not authorized, invalid token".to_string(),
            )),
        }
    }
}

/// Registration request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    /// Display name, letters and spaces, 2-50 characters.
    pub name: String,
    /// Login email.
    pub email: String,
    /// Plaintext password, checked for strength.
    pub password: String,
}

/// Login request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    /// Login email.
    pub email: String,
    /// Plaintext password.
    pub password: String,
}

/// Successful auth response: profile plus a fresh bearer token.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    /// User id.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Login email.
    pub email: String,
    /// Opaque bearer token for subsequent requests.
    pub token: String,
}

/// `POST /api/auth/register`
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    let name = request.name.trim();
    if !NAME_PATTERN.is_match(name) {
        return Err(ApiError::Validation(
            "Name must be 2-50 letters and spaces".to_string(),
        ));
    }
    let email = request.email.trim().to_lowercase();
    if !EMAIL_PATTERN.is_match(&email) {
        return Err(ApiError::Validation(
            "Please provide a valid email address".to_string(),
        ));
    }
    if !password_is_strong(&request.password, state.config.auth.password_min_chars) {
        return Err(ApiError::Validation(format!(
            "Password must be at least {} characters and contain an uppercase letter, \
             a lowercase letter, and a digit",
            state.config.auth.password_min_chars
        )));
    }

    if state.storage.users().find_by_email(&email).await?.is_some() {
        return Err(ApiError::Validation("User already exists".to_string()));
    }

    let user = User {
        id: UserId::new(),
        name: name.to_string(),
        email,
        password_hash: hash_password(&request.password),
        created_at: chrono::Utc::now(),
    };
    // A concurrent registration can still hit the unique index.
    if state.storage.users().insert(&user).await.is_err() {
        return Err(ApiError::Validation("User already exists".to_string()));
    }

    tracing::info!(user = %user.id, "registered new user");
    let token = issue_token(&state, user.id).await?;
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            id: user.id,
            name: user.name,
            email: user.email,
            token,
        }),
    ))
}

/// `POST /api/auth/login`
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let email = request.email.trim().to_lowercase();
    let user = state.storage.users().find_by_email(&email).await?;

    // Same response for unknown email and wrong password.
    let invalid = || ApiError::Unauthorized("Invalid email or password".to_string());
    let user = user.ok_or_else(invalid)?;
    if !verify_password(&request.password, &user.password_hash) {
        tracing::warn!(user = %user.id, "failed login attempt");
        return Err(invalid());
    }

    let token = issue_token(&state, user.id).await?;
    Ok(Json(AuthResponse {
        id: user.id,
        name: user.name,
        email: user.email,
        token,
    }))
}

/// `POST /api/auth/logout`
pub async fn logout(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    headers: axum::http::HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    // AuthUser already proved the header is present and valid.
    if let Some(token) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        state.storage.sessions().revoke(&token_digest(token)).await?;
        tracing::info!(user = %user.id, "session revoked");
    }
    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Logged out",
    })))
}

async fn issue_token(state: &Arc<AppState>, user_id: UserId) -> ApiResult<String> {
    let token = generate_token();
    state
        .storage
        .sessions()
        .issue(&token_digest(&token), user_id, state.config.auth.token_ttl)
        .await?;
    Ok(token)
}
