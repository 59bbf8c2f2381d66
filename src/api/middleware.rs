//! Bearer-token authentication.

use crate::{
    api::{
        AppState,
        token::{self, Role},
    },
    entities::{Mentor, User},
    errors::{Error, Result},
};
use axum::{
    Extension,
    extract::Request,
    http::header,
    middleware::Next,
    response::Response,
};
use sea_orm::EntityTrait;
use std::sync::Arc;

/// The authenticated caller, inserted as a request extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    /// Student or mentor id
    pub id: i64,
    /// Which table `id` refers to
    pub role: Role,
}

impl AuthUser {
    /// Fails with `Forbidden` unless the caller is the given student.
    pub fn ensure_student(&self, user_id: i64) -> Result<()> {
        if self.role == Role::Student && self.id == user_id {
            Ok(())
        } else {
            Err(Error::Forbidden)
        }
    }

    /// Fails with `Forbidden` unless the caller is the given mentor.
    pub fn ensure_mentor(&self, mentor_id: i64) -> Result<()> {
        if self.role == Role::Mentor && self.id == mentor_id {
            Ok(())
        } else {
            Err(Error::Forbidden)
        }
    }
}

/// Resolves the `Authorization: Bearer` token to an [`AuthUser`].
///
/// The identity must still exist; tokens of deleted accounts are refused.
pub async fn require_auth(
    Extension(state): Extension<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response> {
    let bearer = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| Error::Unauthorized {
            message: "Access token required".to_string(),
        })?;

    let claims = token::decode_token(bearer, state.settings.auth.jwt_secret.as_bytes())?;

    let exists = match claims.role {
        Role::Student => User::find_by_id(claims.sub).one(&state.db).await?.is_some(),
        Role::Mentor => Mentor::find_by_id(claims.sub).one(&state.db).await?.is_some(),
    };
    if !exists {
        return Err(Error::Unauthorized {
            message: "Account no longer exists".to_string(),
        });
    }

    req.extensions_mut().insert(AuthUser {
        id: claims.sub,
        role: claims.role,
    });
    Ok(next.run(req).await)
}
