// src/routes.rs

use axum::{
    Json, Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post},
};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    handlers::{intervention, quiz, risk},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Quiz routes require any authenticated portal user.
/// * Admin routes (risk, interventions) additionally require staff or admin.
/// * Applies global middleware (Trace, CORS).
pub fn create_router(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = state
        .config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let quiz_routes = Router::new()
        .route("/modules/{module_id}/session", post(quiz::start_session))
        .route(
            "/modules/{module_id}/attempts",
            get(quiz::list_attempts).post(quiz::submit_attempt),
        )
        .route("/attempts/{attempt_id}/replay", get(quiz::replay_attempt))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let admin_routes = Router::new()
        .route("/risk", get(risk::list_risk_signals))
        .route("/risk/candidates", get(risk::list_candidates))
        .route(
            "/interventions",
            get(intervention::list_interventions).post(intervention::save_intervention),
        )
        .route("/interventions/{id}", get(intervention::get_intervention))
        // Auth first, then the staff check
        .layer(middleware::from_fn(admin_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/api/health", get(|| async { Json(json!({ "status": "ok" })) }))
        .nest("/api/quiz", quiz_routes)
        .nest("/api/admin", admin_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
