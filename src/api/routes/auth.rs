use crate::{
    api::{
        AppState,
        dtos::{LoginRequest, MentorSignupRequest, SignupRequest},
        extract::ApiJson,
        token::Role,
    },
    core::identity,
    errors::Result,
};
use axum::{Extension, Json, Router, http::StatusCode, routing::post};
use serde_json::{Value, json};
use std::sync::Arc;
use validator::Validate;

/// Signup and login for students and mentors.
pub fn auth_routes() -> Router {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/mentor/signup", post(mentor_signup))
        .route("/mentor/login", post(mentor_login))
}

async fn signup(
    Extension(state): Extension<Arc<AppState>>,
    ApiJson(body): ApiJson<SignupRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    body.validate()?;
    let user = identity::signup_student(&state.db, body.into()).await?;
    let token = state.issue_token(user.id, &user.email, Role::Student)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "token": token, "user": user })),
    ))
}

async fn login(
    Extension(state): Extension<Arc<AppState>>,
    ApiJson(body): ApiJson<LoginRequest>,
) -> Result<Json<Value>> {
    body.validate()?;
    let user = identity::login_student(&state.db, &body.email, &body.password).await?;
    let token = state.issue_token(user.id, &user.email, Role::Student)?;
    Ok(Json(json!({ "token": token, "user": user })))
}

async fn mentor_signup(
    Extension(state): Extension<Arc<AppState>>,
    ApiJson(body): ApiJson<MentorSignupRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    body.validate()?;
    let mentor = identity::signup_mentor(&state.db, body.into()).await?;
    let token = state.issue_token(mentor.id, &mentor.email, Role::Mentor)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "token": token, "mentor": mentor })),
    ))
}

async fn mentor_login(
    Extension(state): Extension<Arc<AppState>>,
    ApiJson(body): ApiJson<LoginRequest>,
) -> Result<Json<Value>> {
    body.validate()?;
    let mentor = identity::login_mentor(&state.db, &body.email, &body.password).await?;
    let token = state.issue_token(mentor.id, &mentor.email, Role::Mentor)?;
    Ok(Json(json!({ "token": token, "mentor": mentor })))
}
