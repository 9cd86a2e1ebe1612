//! API module - Axum HTTP server and routes

mod error;
mod handlers;

use crate::AppState;
use axum::{
    extract::Request,
    http::{header, HeaderValue},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the main application router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Portfolio
        .route("/", get(handlers::index))
        // Trading
        .route("/buy", post(handlers::buy))
        .route("/sell", post(handlers::sell))
        .route("/quote", post(handlers::quote))
        // Accounts & sessions
        .route("/register", post(handlers::register))
        .route("/login", post(handlers::login))
        .route("/logout", get(handlers::logout))
        // Transaction history (stub)
        .route("/history", get(handlers::history))
        // Health
        .route("/api/health", get(handlers::health_check))
        // Apply middleware
        .layer(middleware::from_fn(no_store))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Balances change on every trade; nothing we serve may be cached.
async fn no_store(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
    response
}
