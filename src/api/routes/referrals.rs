use crate::{
    api::{
        AppState,
        dtos::{ApplyReferralRequest, CompleteReferralRequest, RedeemRequest},
        extract::ApiJson,
        middleware::{AuthUser, require_auth},
    },
    core::{
        booking, points,
        points::{PointsHistoryView, Redemption},
        referral::{self, REFERRAL_REWARD_POINTS, ReferralStats},
    },
    errors::{Error, Result},
};
use axum::{
    Extension, Json, Router,
    http::{HeaderMap, StatusCode},
    middleware,
    routing::{get, post},
};
use serde_json::{Value, json};
use std::sync::Arc;
use validator::Validate;

/// Header carrying a client retry key for `/redeem`.
pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

/// Referral and points endpoints. `apply` and `complete` are public; the rest
/// need a student token.
pub fn referral_routes() -> Router {
    let protected = Router::new()
        .route("/stats", get(stats))
        .route("/points-history", get(points_history))
        .route("/redeem", post(redeem))
        .layer(middleware::from_fn(require_auth));

    let public = Router::new()
        .route("/apply", post(apply))
        .route("/complete", post(complete));

    Router::new().merge(protected).merge(public)
}

async fn stats(
    Extension(state): Extension<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<ReferralStats>> {
    auth.ensure_student(auth.id)?;
    Ok(Json(referral::get_stats(&state.db, auth.id).await?))
}

async fn points_history(
    Extension(state): Extension<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<PointsHistoryView>> {
    auth.ensure_student(auth.id)?;
    Ok(Json(points::get_history(&state.db, auth.id).await?))
}

async fn redeem(
    Extension(state): Extension<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<RedeemRequest>,
) -> Result<Json<Redemption>> {
    auth.ensure_student(auth.id)?;
    body.validate()?;

    if let Some(booking_id) = body.booking_id {
        let booked = booking::get_booking(&state.db, booking_id).await?;
        if booked.user_id != auth.id {
            return Err(Error::Forbidden);
        }
    }

    let header_key = headers
        .get(IDEMPOTENCY_HEADER)
        .map(|value| {
            value
                .to_str()
                .map(|key| key.trim().to_string())
                .map_err(|_| Error::Validation {
                    message: "Idempotency-Key must be visible ASCII".to_string(),
                })
        })
        .transpose()?
        .filter(|key| !key.is_empty());
    let idempotency_key = header_key.or(body.idempotency_key);

    let redemption = points::redeem(
        &state.db,
        auth.id,
        body.points,
        body.booking_id,
        idempotency_key,
    )
    .await?;
    Ok(Json(redemption))
}

async fn apply(
    Extension(state): Extension<Arc<AppState>>,
    ApiJson(body): ApiJson<ApplyReferralRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    body.validate()?;
    let created = referral::apply_code(&state.db, &body.referral_code, body.new_user_id).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Referral code applied successfully",
            "referral": created,
        })),
    ))
}

async fn complete(
    Extension(state): Extension<Arc<AppState>>,
    ApiJson(body): ApiJson<CompleteReferralRequest>,
) -> Result<Json<Value>> {
    let completion = referral::complete_referral(&state.db, body.referred_user_id).await?;
    Ok(Json(json!({
        "message": format!("Referral completed! {REFERRAL_REWARD_POINTS} points awarded"),
        "referral": completion.referral,
        "referrerPoints": completion.posting.balance,
    })))
}
