//! HTTP surface - axum router, shared state and request plumbing.

pub mod dtos;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod routes;
pub mod token;

use crate::{config::Settings, errors::Result};
use axum::{
    Extension, Json, Router,
    http::{HeaderValue, StatusCode},
    response::IntoResponse,
    routing::get,
};
use sea_orm::{ConnectionTrait, DatabaseConnection, Statement};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

/// State shared by every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Connection pool
    pub db: DatabaseConnection,
    /// Loaded settings
    pub settings: Arc<Settings>,
}

impl AppState {
    /// Creates the state from a pool and settings.
    #[must_use]
    pub fn new(db: DatabaseConnection, settings: Settings) -> Self {
        Self {
            db,
            settings: Arc::new(settings),
        }
    }

    /// Signs a token for `id` with the configured secret and lifetime.
    pub fn issue_token(&self, id: i64, email: &str, role: token::Role) -> Result<String> {
        token::issue_token(
            id,
            email,
            role,
            self.settings.auth.jwt_secret.as_bytes(),
            self.settings.auth.token_ttl_hours,
        )
    }
}

/// Builds the application router.
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.settings.server.cors_origins);

    let api = Router::new()
        .route("/health", get(health))
        .nest("/auth", routes::auth_routes())
        .nest("/referrals", routes::referral_routes())
        .nest("/bookings", routes::booking_routes())
        .nest("/mentors", routes::mentor_routes())
        .nest("/activities", routes::activity_routes());

    Router::new()
        .route("/", get(root))
        .nest("/api", api)
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(Extension(state))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            HeaderValue::from_str(origin)
                .inspect_err(|e| warn!("Ignoring CORS origin {:?}: {}", origin, e))
                .ok()
        })
        .collect();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn root() -> Json<Value> {
    Json(json!({
        "name": "PathFinder API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "auth": "/api/auth",
            "referrals": "/api/referrals",
            "bookings": "/api/bookings",
            "mentors": "/api/mentors",
            "activities": "/api/activities",
            "health": "/api/health",
        },
    }))
}

async fn health(Extension(state): Extension<Arc<AppState>>) -> Result<Json<Value>> {
    let backend = state.db.get_database_backend();
    state
        .db
        .execute(Statement::from_string(backend, "SELECT 1"))
        .await?;
    Ok(Json(json!({ "status": "ok", "database": "connected" })))
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "Route not found" })),
    )
}
