#![allow(dead_code)]

use axum::{
    http::{header, Method},
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod stores;
pub mod utils;

pub use config::Config;
pub use services::AppState;

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(tower_http::cors::Any); // TODO: restrict to specific origins in production

    Router::new()
        // Public endpoints (no auth required)
        .route("/health", get(handlers::health_check))
        // Metrics endpoint with Basic Auth protection
        .route(
            "/metrics",
            get(handlers::metrics_handler)
                .layer(middleware::from_fn(handlers::metrics_auth_middleware)),
        )
        // OTP login flow (public, rate limited)
        .nest("/auth", auth_routes(app_state.clone()))
        // Game endpoints: authenticated users and cookie guests share them
        .nest(
            "/game",
            game_routes().layer(middleware::from_fn_with_state(
                app_state.clone(),
                middlewares::auth::optional_auth_middleware,
            )),
        )
        // Statistics endpoints (require JWT)
        .nest(
            "/stats",
            stats_routes().layer(middleware::from_fn_with_state(
                app_state.clone(),
                middlewares::auth::auth_middleware,
            )),
        )
        // Scheduling and uploads (require JWT + admin role)
        .nest(
            "/admin",
            admin_routes().layer(middleware::from_fn_with_state(
                app_state.clone(),
                middlewares::auth::auth_middleware,
            )),
        )
        .with_state(app_state)
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(middleware::from_fn(
            middlewares::metrics::metrics_middleware,
        ))
        .layer(TraceLayer::new_for_http())
}

fn game_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/daily-puzzle", get(handlers::game::daily_puzzle))
        .route("/session", get(handlers::game::get_session))
        .route("/session/select", post(handlers::game::select))
        .route("/session/submit", post(handlers::game::submit))
}

fn stats_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/selections",
            get(handlers::stats::get_selections).put(handlers::stats::put_selections),
        )
        .route("/tries/decrement", put(handlers::stats::decrement_tries))
        .route("/tries/reset", put(handlers::stats::reset_tries))
        .route(
            "/{user_id}",
            get(handlers::stats::get_stats)
                .put(handlers::stats::record_completion)
                .delete(handlers::stats::delete_stats),
        )
        .route("/{user_id}/reset", put(handlers::stats::reset_stats))
}

fn admin_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/puzzles", get(handlers::admin::list_puzzles))
        .route(
            "/puzzles/{date}",
            get(handlers::admin::get_puzzle).delete(handlers::admin::delete_puzzle),
        )
        .route(
            "/puzzles/{date}/pairs/{index}",
            put(handlers::admin::schedule_pair),
        )
        .route("/uploads", post(handlers::admin::create_upload))
        .route_layer(middleware::from_fn(
            middlewares::auth::admin_guard_middleware,
        ))
}

fn auth_routes(app_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/request-otp", post(handlers::auth::request_otp))
        .route("/verify-otp", post(handlers::auth::verify_otp))
        .route_layer(middleware::from_fn_with_state(
            app_state,
            middlewares::rate_limit::otp_rate_limit_middleware,
        ))
}
