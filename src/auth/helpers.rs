use std::sync::OnceLock;

use chrono::Utc;

use super::{TokenGenerator, parse_token};
use crate::server::AppState;
use crate::types::{Token, User};

#[derive(Debug)]
pub enum TokenValidationError {
    InvalidScheme,
    InvalidToken,
    TokenExpired,
    AdminTokenNotAllowed,
    InternalError,
}

pub struct ValidatedToken {
    pub token: Token,
    pub user: Option<User>,
}

/// The generator carries no state beyond argon2 parameters; share one.
fn generator() -> &'static TokenGenerator {
    static GENERATOR: OnceLock<TokenGenerator> = OnceLock::new();
    GENERATOR.get_or_init(TokenGenerator::new)
}

/// Pulls the raw token out of an Authorization header. Bearer is the native
/// scheme; Basic with user `x-token` is accepted for tooling that can only
/// speak basic auth.
///
/// Returns Ok(None) when no header is present, Err on an unsupported scheme
/// or a malformed Basic payload.
pub fn extract_token_from_header(
    auth_header: Option<&str>,
) -> Result<Option<String>, TokenValidationError> {
    let Some(header) = auth_header else {
        return Ok(None);
    };

    if let Some(bearer) = header.strip_prefix("Bearer ") {
        return Ok(Some(bearer.to_string()));
    }

    if let Some(encoded) = header.strip_prefix("Basic ") {
        return decode_basic_credentials(encoded)
            .ok_or(TokenValidationError::InvalidToken)
            .map(Some);
    }

    Err(TokenValidationError::InvalidScheme)
}

fn decode_basic_credentials(encoded: &str) -> Option<String> {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;

    let decoded = STANDARD.decode(encoded).ok()?;
    let credentials = String::from_utf8(decoded).ok()?;
    let (username, password) = credentials.split_once(':')?;

    (username == "x-token").then(|| password.to_string())
}

/// Validates a raw token string against the store, returning the token row
/// and its bound user. Set `allow_admin` to false to reject admin tokens.
pub fn validate_token(
    state: &AppState,
    raw_token: &str,
    allow_admin: bool,
) -> Result<ValidatedToken, TokenValidationError> {
    let (lookup, _secret) =
        parse_token(raw_token).map_err(|_| TokenValidationError::InvalidToken)?;

    let token = state
        .store
        .get_token_by_lookup(&lookup)
        .map_err(|_| TokenValidationError::InternalError)?
        .ok_or(TokenValidationError::InvalidToken)?;

    let verified = generator()
        .verify(raw_token, &token.token_hash)
        .map_err(|_| TokenValidationError::InternalError)?;
    if !verified {
        return Err(TokenValidationError::InvalidToken);
    }

    if token.expires_at.is_some_and(|expires_at| expires_at < Utc::now()) {
        return Err(TokenValidationError::TokenExpired);
    }

    if !allow_admin && token.is_admin {
        return Err(TokenValidationError::AdminTokenNotAllowed);
    }

    let user = match &token.user_id {
        Some(user_id) => state
            .store
            .get_user(user_id)
            .map_err(|_| TokenValidationError::InternalError)?,
        None => None,
    };

    if let Err(e) = state.store.update_token_last_used(&token.id) {
        tracing::warn!("Failed to update token last_used_at: {e}");
    }

    Ok(ValidatedToken { token, user })
}
