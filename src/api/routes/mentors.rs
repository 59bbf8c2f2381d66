use crate::{
    api::{
        AppState,
        middleware::{AuthUser, require_auth},
    },
    core::{
        booking::{self, MentorDashboard},
        identity,
    },
    entities::MentorModel,
    errors::Result,
};
use axum::{Extension, Json, Router, extract::Path, middleware, routing::get};
use std::sync::Arc;

/// Public mentor listing plus the token-protected dashboard.
pub fn mentor_routes() -> Router {
    let protected = Router::new()
        .route("/dashboard/:mentor_id", get(dashboard))
        .layer(middleware::from_fn(require_auth));

    Router::new()
        .route("/", get(list))
        .route("/:id", get(show))
        .merge(protected)
}

async fn list(Extension(state): Extension<Arc<AppState>>) -> Result<Json<Vec<MentorModel>>> {
    Ok(Json(identity::list_mentors(&state.db).await?))
}

async fn show(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<MentorModel>> {
    Ok(Json(identity::find_mentor(&state.db, id).await?))
}

async fn dashboard(
    Extension(state): Extension<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(mentor_id): Path<i64>,
) -> Result<Json<MentorDashboard>> {
    auth.ensure_mentor(mentor_id)?;
    Ok(Json(booking::mentor_dashboard(&state.db, mentor_id).await?))
}
