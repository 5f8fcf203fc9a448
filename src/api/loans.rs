//! Loan endpoints: issue, return, listing

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{Loan, LoanPage, LoanQuery, OpenLoans},
    services::loans::IssueLoan,
};

use super::AuthenticatedUser;

/// Issue loan request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct IssueLoanRequest {
    /// Title ID
    #[validate(range(min = 1, message = "title_id must be a positive identifier"))]
    pub title_id: i64,
    /// Member external identifier (student number)
    #[validate(length(min = 1, max = 64, message = "member_id must be 1 to 64 characters"))]
    pub member_id: String,
    /// Due date (ISO 8601 format)
    pub due_date: DateTime<Utc>,
}

/// Overdue refresh result
#[derive(Serialize, ToSchema)]
pub struct RefreshResponse {
    /// Loans whose stored status was switched to overdue
    pub updated: u64,
}

/// Issue a loan (check a copy out to a member)
#[utoipa::path(
    post,
    path = "/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    request_body = IssueLoanRequest,
    responses(
        (status = 201, description = "Loan issued", body = Loan),
        (status = 400, description = "Invalid request", body = crate::error::ErrorResponse),
        (status = 404, description = "Title or member not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Out of stock, or title/member inactive", body = crate::error::ErrorResponse),
        (status = 422, description = "Loan limit reached", body = crate::error::ErrorResponse),
        (status = 503, description = "Store unavailable", body = crate::error::ErrorResponse)
    )
)]
pub async fn issue_loan(
    State(state): State<crate::AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Json(request): Json<IssueLoanRequest>,
) -> AppResult<(StatusCode, Json<Loan>)> {
    principal.require_librarian()?;
    request
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let issue = IssueLoan {
        title_id: request.title_id,
        member_id: request.member_id,
        due_date: request.due_date,
    };

    let loan = state.services.loans.issue(issue, &principal, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(loan)))
}

/// Return a loan
#[utoipa::path(
    post,
    path = "/loans/{id}/return",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Loan returned, fine fixed", body = Loan),
        (status = 404, description = "Loan not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Already returned", body = crate::error::ErrorResponse)
    )
)]
pub async fn return_loan(
    State(state): State<crate::AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(loan_id): Path<i64>,
) -> AppResult<Json<Loan>> {
    principal.require_librarian()?;

    let loan = state.services.loans.return_loan(loan_id, Utc::now()).await?;
    Ok(Json(loan))
}

/// List loans, newest first
///
/// Member principals only ever see their own loans.
#[utoipa::path(
    get,
    path = "/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(LoanQuery),
    responses(
        (status = 200, description = "Page of loans", body = LoanPage),
        (status = 403, description = "Listing another member's loans", body = crate::error::ErrorResponse),
        (status = 404, description = "Member not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_loans(
    State(state): State<crate::AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Query(mut query): Query<LoanQuery>,
) -> AppResult<Json<LoanPage>> {
    if !principal.is_librarian() {
        let own = principal.own_member_id()?;
        match query.member.as_deref() {
            Some(requested) if requested != own => {
                return Err(AppError::Authorization(
                    "Members may only list their own loans".to_string(),
                ));
            }
            _ => query.member = Some(own.to_string()),
        }
    }

    let page = state.services.loans.list_loans(&query, Utc::now()).await?;
    Ok(Json(page))
}

/// Get loan by ID
#[utoipa::path(
    get,
    path = "/loans/{id}",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Loan details", body = Loan),
        (status = 403, description = "Loan belongs to another member", body = crate::error::ErrorResponse),
        (status = 404, description = "Loan not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_loan(
    State(state): State<crate::AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(loan_id): Path<i64>,
) -> AppResult<Json<Loan>> {
    let loan = state.services.loans.get_loan(loan_id, Utc::now()).await?;

    if !principal.is_librarian() {
        let member = state.services.loans.member(principal.own_member_id()?).await?;
        if member.id != loan.member_id {
            return Err(AppError::Authorization(
                "Loan belongs to another member".to_string(),
            ));
        }
    }

    Ok(Json(loan))
}

/// Persist the overdue status of open loans past their due date
#[utoipa::path(
    post,
    path = "/loans/refresh-overdue",
    tag = "loans",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Overdue statuses refreshed", body = RefreshResponse)
    )
)]
pub async fn refresh_overdue(
    State(state): State<crate::AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
) -> AppResult<Json<RefreshResponse>> {
    principal.require_librarian()?;

    let updated = state.services.loans.refresh_overdue(Utc::now()).await?;
    Ok(Json(RefreshResponse { updated }))
}

/// Open loans of a member, in issue order
#[utoipa::path(
    get,
    path = "/members/{external_id}/open-loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("external_id" = String, Path, description = "Member external identifier")
    ),
    responses(
        (status = 200, description = "Open-loan index", body = OpenLoans),
        (status = 404, description = "Member not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_open_loans(
    State(state): State<crate::AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    Path(external_id): Path<String>,
) -> AppResult<Json<OpenLoans>> {
    if !principal.is_librarian() && principal.own_member_id()? != external_id {
        return Err(AppError::Authorization(
            "Members may only view their own loans".to_string(),
        ));
    }

    let open = state.services.loans.open_loans(&external_id).await?;
    Ok(Json(open))
}
