//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{health, loans, stats, titles};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Circulation API",
        version = "1.0.0",
        description = "Campus library circulation REST API"
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Loans
        loans::issue_loan,
        loans::return_loan,
        loans::list_loans,
        loans::get_loan,
        loans::refresh_overdue,
        loans::get_open_loans,
        // Titles
        titles::get_title,
        titles::resize_title,
        // Stats
        stats::get_stats,
    ),
    components(
        schemas(
            // Loans
            loans::IssueLoanRequest,
            loans::RefreshResponse,
            crate::models::Loan,
            crate::models::LoanStatus,
            crate::models::Fine,
            crate::models::LoanPage,
            crate::models::OpenLoans,
            // Titles
            crate::models::Title,
            crate::models::ResizeTitle,
            // Stats
            crate::models::CirculationStats,
            crate::models::BorrowedTitle,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "loans", description = "Loan circulation"),
        (name = "titles", description = "Title copy counts"),
        (name = "stats", description = "Statistics")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
