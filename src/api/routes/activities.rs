use crate::{
    api::{
        AppState,
        middleware::{AuthUser, require_auth},
    },
    core::activity,
    entities::ActivityModel,
    errors::Result,
};
use axum::{Extension, Json, Router, extract::Path, middleware, routing::get};
use std::sync::Arc;

/// A student's own activity feed.
pub fn activity_routes() -> Router {
    Router::new()
        .route("/:user_id", get(list_for_user))
        .layer(middleware::from_fn(require_auth))
}

async fn list_for_user(
    Extension(state): Extension<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(user_id): Path<i64>,
) -> Result<Json<Vec<ActivityModel>>> {
    auth.ensure_student(user_id)?;
    Ok(Json(activity::list_for_user(&state.db, user_id).await?))
}
