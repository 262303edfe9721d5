//! API route configuration

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, State},
    http::{Method, Request},
    middleware::{self as axum_middleware, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

use super::handlers::{self, AppState};
use crate::error::ApiError;
use crate::middleware::{upload::MAX_UPLOAD_BYTES, GuardRequest, ProtectOptions};

/// Room for multipart framing on top of the largest accepted file
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Build the complete API router.
///
/// `max_body_bytes` caps JSON bodies on collection routes (0 = unlimited).
/// The upload route has its own cap just above [`MAX_UPLOAD_BYTES`] so the
/// validator, not the transport, reports oversized files. The guard layers
/// sit outside the body limits and run before any body byte is read.
pub fn build_router(state: AppState, max_body_bytes: usize) -> Router {
    // Public routes
    let public_routes = Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/api/csrf", get(handlers::csrf_token));

    // Guarded upload route
    let upload_routes = Router::new().route(
        "/api/uploads",
        post(handlers::upload_file).layer(
            ServiceBuilder::new()
                .layer(axum_middleware::from_fn_with_state(
                    state.clone(),
                    guard_uploads,
                ))
                .layer(DefaultBodyLimit::disable())
                .layer(RequestBodyLimitLayer::new(MAX_UPLOAD_BYTES + MULTIPART_OVERHEAD)),
        ),
    );

    // Collection routes; reads are public, mutations go through the guard
    let mut collection_routes = Router::new()
        .route(
            "/api/:collection",
            get(handlers::list_records).post(handlers::create_record),
        )
        .route(
            "/api/:collection/:id",
            get(handlers::get_record)
                .put(handlers::update_record)
                .delete(handlers::delete_record),
        );
    if max_body_bytes > 0 {
        collection_routes = collection_routes.layer(RequestBodyLimitLayer::new(max_body_bytes));
    }
    let collection_routes =
        collection_routes.layer(axum_middleware::from_fn_with_state(state.clone(), guard_mutations));

    public_routes
        .merge(upload_routes)
        .merge(collection_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Guard for collection writes; reads pass straight through
async fn guard_mutations(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    if matches!(*req.method(), Method::GET | Method::HEAD | Method::OPTIONS) {
        return Ok(next.run(req).await);
    }
    let options = state.settings.mutations;
    authorize(&state, &options, req, next).await
}

/// Guard for the upload route
async fn guard_uploads(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let options = state.settings.uploads;
    authorize(&state, &options, req, next).await
}

/// Run the route protector and hand the identity to the handler
async fn authorize(
    state: &AppState,
    options: &ProtectOptions,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let identity = state
        .protector
        .check(&GuardRequest::from_request(&req), options)?;
    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

/// Root handler
async fn root_handler() -> impl IntoResponse {
    Json(json!({
        "service": "Site Guard",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

/// Liveness probe handler - always returns 200
async fn health_handler() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// Metrics handler (Prometheus text format)
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics.export_prometheus(
        &state.cache.stats(),
        state.protector.rate_limiter().len(),
    )
}
