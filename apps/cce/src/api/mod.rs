//! # HTTP API
//!
//! On-demand trigger surface.
//!
//! | Method | Path | Auth |
//! |--------|------|------|
//! | GET | `/health` | none |
//! | GET | `/policies` | none |
//! | POST | `/runs` | bearer |
//! | GET | `/runs/{check_id}` | bearer |
//!
//! Bearer auth is enforced only when an API key is configured.

mod error;
mod handlers;

pub use error::ApiError;
pub use handlers::{RunRequest, RunResponse, TrailResponse};

use crate::coordinator::RunCoordinator;
use axum::Router;
use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<RunCoordinator>,
    api_key: Option<Arc<str>>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("coordinator", &self.coordinator)
            .field("auth", &self.api_key.is_some())
            .finish()
    }
}

impl AppState {
    pub fn new(coordinator: Arc<RunCoordinator>, api_key: Option<String>) -> Self {
        Self {
            coordinator,
            api_key: api_key.filter(|k| !k.is_empty()).map(Arc::from),
        }
    }

    /// Constant-time check of an `Authorization` header value.
    pub fn authorizes(&self, header: Option<&str>) -> bool {
        let Some(expected) = &self.api_key else {
            return true;
        };
        let Some(token) = header.and_then(|h| h.strip_prefix("Bearer ")) else {
            return false;
        };
        token.as_bytes().ct_eq(expected.as_bytes()).into()
    }
}

pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/runs", post(handlers::create_run))
        .route("/runs/{check_id}", get(handlers::get_run))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/policies", get(handlers::list_policies))
        .merge(protected)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

async fn require_api_key(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    if state.authorizes(header) {
        next.run(request).await
    } else {
        ApiError::unauthorized("missing or invalid bearer token").into_response()
    }
}
