use crate::{
    api::{
        AppState,
        dtos::{CreateBookingRequest, UpdateBookingRequest},
        extract::ApiJson,
        middleware::{AuthUser, require_auth},
        token::Role,
    },
    core::booking::{self, BookingDetails},
    entities::BookingModel,
    errors::{Error, Result},
};
use axum::{
    Extension, Json, Router,
    extract::Path,
    http::StatusCode,
    middleware,
    routing::{get, patch, post},
};
use std::sync::Arc;
use validator::Validate;

/// Booking endpoints; every route needs a token.
pub fn booking_routes() -> Router {
    Router::new()
        .route("/", post(create))
        .route("/user/:user_id", get(list_for_user))
        .route("/mentor/:mentor_id", get(list_for_mentor))
        .route("/:id", patch(update))
        .layer(middleware::from_fn(require_auth))
}

async fn create(
    Extension(state): Extension<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    ApiJson(body): ApiJson<CreateBookingRequest>,
) -> Result<(StatusCode, Json<BookingModel>)> {
    body.validate()?;
    auth.ensure_student(body.user_id)?;
    let created = booking::create_booking(&state.db, body.into()).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn list_for_user(
    Extension(state): Extension<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(user_id): Path<i64>,
) -> Result<Json<Vec<BookingDetails>>> {
    auth.ensure_student(user_id)?;
    Ok(Json(booking::list_for_user(&state.db, user_id).await?))
}

async fn list_for_mentor(
    Extension(state): Extension<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(mentor_id): Path<i64>,
) -> Result<Json<Vec<BookingDetails>>> {
    auth.ensure_mentor(mentor_id)?;
    Ok(Json(booking::list_for_mentor(&state.db, mentor_id).await?))
}

async fn update(
    Extension(state): Extension<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
    ApiJson(body): ApiJson<UpdateBookingRequest>,
) -> Result<Json<BookingModel>> {
    body.validate()?;

    let current = booking::get_booking(&state.db, id).await?;
    let allowed = match auth.role {
        Role::Student => current.user_id == auth.id,
        Role::Mentor => current.mentor_id == auth.id,
    };
    if !allowed {
        return Err(Error::Forbidden);
    }

    Ok(Json(booking::update_booking(&state.db, id, body.into()).await?))
}
