//! # Gradebook HTTP API Module
//!
//! This module implements the HTTP REST API server using axum.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /classes/{class}/components/{component}/grid` - Grade entry grid
//! - `PATCH /grades/{enrollment}/{component}` - Record or clear one grade
//! - `POST /grades/bulk` - Record many grades
//! - `GET /final-grades/{discipline}/{class}` - Final grades of a class
//! - `POST /disciplines/{discipline}/adjusted-mode` - Toggle adjusted grades
//! - `PUT /disciplines/{discipline}/policy` - Replace the averaging policy
//! - `PATCH /enrollments/{enrollment}/adjusted-grade` - Manual adjusted grade
//! - `GET /pendencies/{discipline}/{class}` - Missing grades
//! - `GET /export/{discipline}/{class}` - Final report, gated on completeness
//! - `GET /classes/{class}/audit` - Grade history of a class
//!
//! Every endpoint except `/health` requires the `X-Professor-Id` header.

mod auth;
mod handlers;
mod middleware;
mod types;

pub use auth::{Actor, ApiKey, PROFESSOR_HEADER};
pub use middleware::{GlobalRateLimiter, create_rate_limiter};
pub use types::{
    AdjustedModeRequest, ApiError, ApiResponse, BulkUpsertRequest, ErrorResponse, GridQuery,
    HealthResponse, ManualAdjustedRequest, ManualAdjustedResponse, PolicyRequest, PolicyResponse,
    UpsertGradeRequest, status_for,
};

use crate::config::SecurityConfig;
use axum::{
    Router,
    http::{HeaderName, HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{get, patch, post, put},
};
use gradebook_core::{Gradebook, GradebookError};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state containing the gradebook.
#[derive(Clone)]
pub struct AppState {
    pub gradebook: Arc<RwLock<Gradebook>>,
}

impl AppState {
    #[must_use]
    pub fn new(gradebook: Gradebook) -> Self {
        Self {
            gradebook: Arc::new(RwLock::new(gradebook)),
        }
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

const CORS_METHODS: [Method; 5] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::PATCH,
    Method::OPTIONS,
];

fn cors_headers() -> [HeaderName; 3] {
    [
        header::CONTENT_TYPE,
        header::AUTHORIZATION,
        HeaderName::from_static(PROFESSOR_HEADER),
    ]
}

/// Build the CORS layer from the configured origins.
///
/// - `["*"]` allows every origin
/// - no configuration allows localhost only
/// - otherwise only the listed, parseable origins are allowed
fn build_cors_layer(origins: Option<&[String]>) -> CorsLayer {
    match origins {
        Some([wildcard]) if wildcard == "*" => {
            tracing::warn!("CORS: Allowing ALL origins. This is insecure for production!");
            CorsLayer::permissive()
        }
        Some(origins) => {
            let allowed_origins: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|origin| match origin.parse::<HeaderValue>() {
                    Ok(hv) => {
                        tracing::info!("CORS: Allowing origin: {}", origin);
                        Some(hv)
                    }
                    Err(e) => {
                        tracing::warn!("CORS: Invalid origin '{}': {}", origin, e);
                        None
                    }
                })
                .collect();

            if allowed_origins.is_empty() {
                tracing::warn!("CORS: No valid origins configured, defaulting to localhost only");
                build_localhost_cors()
            } else {
                CorsLayer::new()
                    .allow_origin(allowed_origins)
                    .allow_methods(CORS_METHODS)
                    .allow_headers(cors_headers())
            }
        }
        None => {
            tracing::info!("CORS: No origins configured, defaulting to localhost only");
            build_localhost_cors()
        }
    }
}

/// Build a restrictive CORS layer that only allows localhost origins.
fn build_localhost_cors() -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        "http://localhost:3000",
        "http://localhost:8080",
        "http://127.0.0.1:3000",
        "http://127.0.0.1:8080",
    ]
    .into_iter()
    .filter_map(|origin| origin.parse::<HeaderValue>().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(CORS_METHODS)
        .allow_headers(cors_headers())
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
///
/// Middleware stack (outer to inner):
/// 1. Tracing - logs all requests
/// 2. CORS - handles preflight requests
/// 3. Rate Limiting - global quota (if enabled)
/// 4. Authentication - validates the API key (if configured)
pub fn create_router(state: AppState, security: &SecurityConfig) -> Router {
    let cors = build_cors_layer(security.cors_origins.as_deref());

    let rate_limiter = create_rate_limiter(security.rate_limit);
    if rate_limiter.is_some() {
        tracing::info!(
            "Rate limiting enabled: {} requests/second",
            security.rate_limit
        );
    } else {
        tracing::info!("Rate limiting disabled");
    }

    let api_key = security
        .api_key
        .as_deref()
        .filter(|key| !key.is_empty())
        .map(|key| ApiKey(Arc::from(key)));
    if api_key.is_some() {
        tracing::info!("API key authentication enabled");
    } else {
        tracing::warn!(
            "API key authentication DISABLED; only the X-Professor-Id header identifies callers. \
             Set security.api_key or GRADEBOOK_API_KEY to enable it."
        );
    }

    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route(
            "/classes/{class_id}/components/{component_id}/grid",
            get(handlers::grid_handler),
        )
        .route(
            "/grades/{enrollment_id}/{component_id}",
            patch(handlers::upsert_grade_handler),
        )
        .route("/grades/bulk", post(handlers::bulk_upsert_handler))
        .route(
            "/final-grades/{discipline_id}/{class_id}",
            get(handlers::final_grades_handler),
        )
        .route(
            "/disciplines/{discipline_id}/adjusted-mode",
            post(handlers::adjusted_mode_handler),
        )
        .route(
            "/disciplines/{discipline_id}/policy",
            put(handlers::policy_handler),
        )
        .route(
            "/enrollments/{enrollment_id}/adjusted-grade",
            patch(handlers::manual_adjusted_handler),
        )
        .route(
            "/pendencies/{discipline_id}/{class_id}",
            get(handlers::pendencies_handler),
        )
        .route(
            "/export/{discipline_id}/{class_id}",
            get(handlers::export_handler),
        )
        .route("/classes/{class_id}/audit", get(handlers::audit_handler));

    if let Some(key) = api_key {
        router = router.layer(axum_middleware::from_fn_with_state(
            key,
            auth::api_key_auth_middleware,
        ));
    }

    if let Some(limiter) = rate_limiter {
        router = router.layer(axum_middleware::from_fn_with_state(
            limiter,
            middleware::rate_limit_middleware,
        ));
    }

    router
        .layer(axum::extract::DefaultBodyLimit::max(2 * 1024 * 1024))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Start the HTTP server.
pub async fn run_server(
    addr: &str,
    gradebook: Gradebook,
    security: &SecurityConfig,
) -> Result<(), GradebookError> {
    let router = create_router(AppState::new(gradebook), security);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| GradebookError::Storage(format!("Bind failed: {}", e)))?;

    tracing::info!("Gradebook HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .await
        .map_err(|e| GradebookError::Storage(format!("Server error: {}", e)))
}
