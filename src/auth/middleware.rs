use std::sync::Arc;

use axum::{
    Json,
    extract::FromRequestParts,
    http::{StatusCode, header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
};
use serde_json::json;

use super::helpers::{TokenValidationError, extract_token_from_header, validate_token};
use crate::server::AppState;
use crate::types::{Token, User};

/// Extractor that requires any valid authentication
pub struct RequireAuth {
    pub token: Token,
    pub user: Option<User>,
}

/// Extractor that requires admin authentication
pub struct RequireAdmin(pub Token);

/// Extractor that requires user authentication (non-admin token with user_id)
pub struct RequireUser {
    pub token: Token,
    pub user: User,
}

/// Extractor for endpoints that also serve anonymous callers. A missing
/// Authorization header yields an anonymous value; an invalid one is still
/// rejected.
#[derive(Default)]
pub struct MaybeUser {
    pub token: Option<Token>,
    pub user: Option<User>,
}

impl MaybeUser {
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.token.as_ref().is_some_and(|t| t.is_admin)
    }
}

#[derive(Debug)]
pub enum AuthError {
    MissingAuth,
    InvalidScheme,
    InvalidToken,
    TokenExpired,
    NotAdmin,
    NotUser,
    InternalError,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingAuth => (StatusCode::UNAUTHORIZED, "Authentication required"),
            AuthError::InvalidScheme => (StatusCode::UNAUTHORIZED, "Invalid authorization scheme"),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid token"),
            AuthError::TokenExpired => (StatusCode::UNAUTHORIZED, "Token expired"),
            AuthError::NotAdmin => (StatusCode::FORBIDDEN, "Admin access required"),
            AuthError::NotUser => (
                StatusCode::FORBIDDEN,
                "User token required for this operation",
            ),
            AuthError::InternalError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        let body = json!({ "data": null, "error": message });

        let mut response = (status, Json(body)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                "WWW-Authenticate",
                "Bearer realm=\"commons\"".parse().unwrap(),
            );
        }

        response
    }
}

impl FromRequestParts<Arc<AppState>> for RequireAuth {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let validated = extract_and_validate(parts, state)?.ok_or(AuthError::MissingAuth)?;
        Ok(RequireAuth {
            token: validated.token,
            user: validated.user,
        })
    }
}

impl FromRequestParts<Arc<AppState>> for RequireAdmin {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let validated = extract_and_validate(parts, state)?.ok_or(AuthError::MissingAuth)?;

        if !validated.token.is_admin {
            return Err(AuthError::NotAdmin);
        }

        Ok(RequireAdmin(validated.token))
    }
}

impl FromRequestParts<Arc<AppState>> for RequireUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let validated = extract_and_validate(parts, state)?.ok_or(AuthError::MissingAuth)?;

        if validated.token.is_admin {
            return Err(AuthError::NotUser);
        }

        let user = validated.user.ok_or(AuthError::NotUser)?;

        Ok(RequireUser {
            token: validated.token,
            user,
        })
    }
}

impl FromRequestParts<Arc<AppState>> for MaybeUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        match extract_and_validate(parts, state)? {
            Some(validated) => Ok(MaybeUser {
                token: Some(validated.token),
                user: validated.user,
            }),
            None => Ok(MaybeUser::default()),
        }
    }
}

fn extract_and_validate(
    parts: &mut Parts,
    state: &Arc<AppState>,
) -> Result<Option<super::helpers::ValidatedToken>, AuthError> {
    let auth_header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let raw_token = match extract_token_from_header(auth_header).map_err(|e| match e {
        TokenValidationError::InvalidScheme => AuthError::InvalidScheme,
        TokenValidationError::InvalidToken => AuthError::InvalidToken,
        _ => AuthError::InternalError,
    })? {
        Some(token) => token,
        None => return Ok(None),
    };

    let validated = validate_token(state, &raw_token, true).map_err(|e| match e {
        TokenValidationError::InvalidScheme => AuthError::InvalidScheme,
        TokenValidationError::InvalidToken => AuthError::InvalidToken,
        TokenValidationError::TokenExpired => AuthError::TokenExpired,
        TokenValidationError::AdminTokenNotAllowed => AuthError::NotAdmin, // unreachable since allow_admin=true
        TokenValidationError::InternalError => AuthError::InternalError,
    })?;

    Ok(Some(validated))
}
