//! API handlers for the circulation REST endpoints

pub mod health;
pub mod loans;
pub mod openapi;
pub mod stats;
pub mod titles;

use std::time::Duration;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
    routing::{get, post, put},
    Router,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::{
    error::AppError,
    models::{Claims, Principal},
    AppState,
};

/// Extractor for the principal behind a bearer token
pub struct AuthenticatedUser(pub Principal);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::Authentication("Missing or malformed bearer token".to_string()))?;

        let claims = Claims::from_token(bearer.token(), &state.config.auth.jwt_secret)
            .map_err(|e| AppError::Authentication(e.to_string()))?;

        Ok(AuthenticatedUser(claims.into()))
    }
}

/// Build the application router with all routes
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let request_timeout = Duration::from_secs(state.config.server.request_timeout_secs);

    let api_v1 = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        // Loans
        .route("/loans", get(loans::list_loans).post(loans::issue_loan))
        .route("/loans/refresh-overdue", post(loans::refresh_overdue))
        .route("/loans/:id", get(loans::get_loan))
        .route("/loans/:id/return", post(loans::return_loan))
        .route("/members/:external_id/open-loans", get(loans::get_open_loans))
        // Catalog maintenance
        .route("/titles/:id", get(titles::get_title))
        .route("/titles/:id/copies", put(titles::resize_title))
        // Statistics
        .route("/stats", get(stats::get_stats))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi::create_openapi_router())
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(cors)
}
