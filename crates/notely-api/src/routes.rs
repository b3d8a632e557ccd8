use std::hash::{Hash, Hasher};
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chrono::Utc;
use notely_core::sync::{SyncRequest, SyncResponse};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::{extract_bearer_token, AuthenticatedUser, JwtVerifier};
use crate::config::AppConfig;
use crate::error::AppError;
use crate::merge::MergeEngine;
use crate::rate_limit::{EndpointRateLimiter, ProtectedEndpoint, RateLimitMetricsSnapshot};

const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    jwt_verifier: Arc<JwtVerifier>,
    merge: MergeEngine,
    endpoint_rate_limiter: Arc<EndpointRateLimiter>,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, merge: MergeEngine) -> Self {
        Self {
            jwt_verifier: Arc::new(JwtVerifier::new(
                &config.jwt_secret,
                config.auth_clock_skew,
            )),
            merge,
            endpoint_rate_limiter: Arc::new(EndpointRateLimiter::from_config(config.as_ref())),
            config,
        }
    }
}

pub fn app_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/notes/sync", post(sync_notes))
        .route("/notes", get(list_notes))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/api", protected_routes)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
    rate_limit: RateLimitMetricsSnapshot,
}

async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
        rate_limit: state.endpoint_rate_limiter.metrics_snapshot(),
    })
}

async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_bearer_token(request.headers())?;
    let user = state.jwt_verifier.verify_access_token(token)?;
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

async fn sync_notes(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    payload: Result<Json<SyncRequest>, JsonRejection>,
) -> Result<Json<SyncResponse>, AppError> {
    state
        .endpoint_rate_limiter
        .check(ProtectedEndpoint::NotesSync, &user.user_id)
        .await?;

    let Json(request) = payload?;
    request.validate(state.config.sync_max_batch_notes)?;

    let user_hash = user_fingerprint(&user.user_id);
    let notes = match state.merge.merge_batch(&user.user_id, &request.notes).await {
        Ok(notes) => notes,
        Err(error) => {
            tracing::warn!(
                endpoint = "notes_sync",
                user = user_hash,
                received = request.notes.len(),
                "Note batch failed: {error}"
            );
            return Err(error.into());
        }
    };

    tracing::info!(
        endpoint = "notes_sync",
        user = user_hash,
        session = user.session_id.as_deref().unwrap_or("none"),
        received = request.notes.len(),
        returned = notes.len(),
        "Merged note batch"
    );
    Ok(Json(SyncResponse { notes }))
}

async fn list_notes(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<SyncResponse>, AppError> {
    state
        .endpoint_rate_limiter
        .check(ProtectedEndpoint::NotesList, &user.user_id)
        .await?;

    let notes = state.merge.list(&user.user_id).await?;
    tracing::info!(
        endpoint = "notes_list",
        user = user_fingerprint(&user.user_id),
        returned = notes.len(),
        "Listed notes"
    );
    Ok(Json(SyncResponse { notes }))
}

pub(crate) fn user_fingerprint(user_id: &str) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    user_id.hash(&mut hasher);
    hasher.finish()
}
