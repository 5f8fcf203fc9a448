//! Title endpoints: copy counts and catalog maintenance

use axum::{
    extract::{Path, State},
    Json,
};

use crate::{
    error::AppResult,
    models::{ResizeTitle, Title},
};

use super::AuthenticatedUser;

/// Get title by ID
#[utoipa::path(
    get,
    path = "/titles/{id}",
    tag = "titles",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "Title ID")
    ),
    responses(
        (status = 200, description = "Title with copy counts", body = Title),
        (status = 404, description = "Title not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_title(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_principal): AuthenticatedUser,
    Path(title_id): Path<i64>,
) -> AppResult<Json<Title>> {
    let title = state.services.catalog.get_title(title_id).await?;
    Ok(Json(title))
}

/// Change the number of copies a title owns
#[utoipa::path(
    put,
    path = "/titles/{id}/copies",
    tag = "titles",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "Title ID")
    ),
    request_body = ResizeTitle,
    responses(
        (status = 200, description = "Title resized", body = Title),
        (status = 404, description = "Title not found", body = crate::error::ErrorResponse),
        (status = 422, description = "Fewer copies than on loan", body = crate::error::ErrorResponse)
    )
)]
pub async fn resize_title(
    State(state): State<crate::AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(title_id): Path<i64>,
    Json(request): Json<ResizeTitle>,
) -> AppResult<Json<Title>> {
    principal.require_librarian()?;

    let title = state
        .services
        .catalog
        .resize_title(title_id, request.total_copies)
        .await?;
    Ok(Json(title))
}
