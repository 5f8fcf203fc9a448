//! Circulation statistics endpoint

use axum::{extract::State, Json};
use chrono::Utc;

use crate::{error::AppResult, models::CirculationStats};

use super::AuthenticatedUser;

/// Circulation snapshot: status counts and most borrowed titles
#[utoipa::path(
    get,
    path = "/stats",
    tag = "stats",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Circulation statistics", body = CirculationStats),
        (status = 403, description = "Librarian role required", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_stats(
    State(state): State<crate::AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
) -> AppResult<Json<CirculationStats>> {
    principal.require_librarian()?;

    let stats = state.services.stats.stats(Utc::now()).await?;
    Ok(Json(stats))
}
