//! Router assembly and request authentication.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, State},
    http::{header::AUTHORIZATION, Request},
    middleware::{self, Next},
    response::Response,
    routing::{delete, get, post},
    Router,
};
use subtle::ConstantTimeEq;

use super::error::ApiError;
use super::handlers;
use super::state::AppState;

/// Request bodies on protected routes are capped at 1 MiB.
const MAX_BODY_BYTES: usize = 1 << 20;

pub fn build_router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/v1/materialize/env", post(handlers::materialize::materialize_env))
        .route("/v1/provision", post(handlers::provision::provision_item))
        .route("/v1/audit", get(handlers::audit::query_audit))
        .route("/v1/inventory", get(handlers::inventory::inventory))
        .route("/v1/rotate/{item_id}", post(handlers::rotate::rotate_item))
        .route("/v1/cache/{stack}", delete(handlers::cache::delete_stack_cache))
        .layer(middleware::from_fn_with_state(state.clone(), bearer_auth))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES));

    Router::new()
        .route("/ping", get(handlers::health::ping))
        .route("/v1/health", get(handlers::health::health))
        .merge(protected)
        .with_state(state)
}

/// Bearer-token middleware. A missing `HERALD_API_TOKEN` disables
/// authentication; otherwise the token is compared in constant time.
async fn bearer_auth(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let expected = &state.config.api_token;
    if expected.is_empty() {
        return Ok(next.run(request).await);
    }

    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let token = header.strip_prefix("Bearer ").unwrap_or_default();

    if bool::from(token.as_bytes().ct_eq(expected.as_bytes())) {
        Ok(next.run(request).await)
    } else {
        Err(ApiError::unauthorized("invalid or missing bearer token"))
    }
}
