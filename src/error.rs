//! Error types for the circulation server

use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// Client-visible error codes, one per failure kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Failure = 1,
    NotAuthorized = 2,
    StoreFailure = 3,
    StoreUnavailable = 4,
    BadValue = 5,
    NoSuchTitle = 10,
    TitleInactive = 11,
    NoSuchMember = 12,
    MemberInactive = 13,
    MaxLoansReached = 14,
    OutOfStock = 15,
    NoSuchLoan = 20,
    AlreadyReturned = 21,
    InvalidCopyCount = 30,
}

/// Backing-store failures. These are the only retry-eligible errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store did not answer within {0:?}")]
    Timeout(Duration),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Inconsistent store data: {0}")]
    Corrupt(String),
}

/// Inventory ledger failures
#[derive(Error, Debug)]
pub enum InventoryError {
    #[error("Title {0} not found")]
    TitleNotFound(i64),

    #[error("No copies of title {0} available")]
    OutOfStock(i64),

    #[error("All copies of title {0} are already on the shelf")]
    AlreadyFull(i64),

    #[error("Title {title_id} cannot own {requested} copies ({on_loan} on loan)")]
    InvalidTotal {
        title_id: i64,
        requested: i32,
        on_loan: i32,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Loan-limit guard failures
#[derive(Error, Debug)]
pub enum LimitError {
    #[error("Member {member_id} already holds {open} of {max} allowed loans")]
    LimitExceeded { member_id: i64, open: i64, max: u32 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Issue operation failures
#[derive(Error, Debug)]
pub enum IssueError {
    #[error("Due date {due_date} is before {now}")]
    InvalidDueDate {
        due_date: DateTime<Utc>,
        now: DateTime<Utc>,
    },

    #[error("Title {0} not found")]
    TitleNotFound(i64),

    #[error("Title {0} is withdrawn from circulation")]
    TitleInactive(i64),

    #[error("Member {0} not found")]
    MemberNotFound(String),

    #[error("Member {0} is inactive")]
    MemberInactive(String),

    #[error("Member {member_id} already holds {open} of {max} allowed loans")]
    LimitExceeded { member_id: i64, open: i64, max: u32 },

    #[error("No copies of title {0} available")]
    OutOfStock(i64),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<InventoryError> for IssueError {
    fn from(e: InventoryError) -> Self {
        match e {
            InventoryError::TitleNotFound(id) => IssueError::TitleNotFound(id),
            InventoryError::OutOfStock(id) => IssueError::OutOfStock(id),
            InventoryError::Store(e) => IssueError::Store(e),
            other => IssueError::Store(StoreError::Corrupt(other.to_string())),
        }
    }
}

impl From<LimitError> for IssueError {
    fn from(e: LimitError) -> Self {
        match e {
            LimitError::LimitExceeded {
                member_id,
                open,
                max,
            } => IssueError::LimitExceeded {
                member_id,
                open,
                max,
            },
            LimitError::Store(e) => IssueError::Store(e),
        }
    }
}

/// Return operation failures
#[derive(Error, Debug)]
pub enum ReturnError {
    #[error("Loan {0} not found")]
    LoanNotFound(i64),

    #[error("Loan {0} already returned")]
    AlreadyReturned(i64),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<InventoryError> for ReturnError {
    fn from(e: InventoryError) -> Self {
        match e {
            InventoryError::Store(e) => ReturnError::Store(e),
            // A loan references a title the ledger cannot release into
            other => ReturnError::Store(StoreError::Corrupt(other.to_string())),
        }
    }
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Authorization failed: {0}")]
    Authorization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Loan {0} not found")]
    LoanNotFound(i64),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Issue(#[from] IssueError),

    #[error(transparent)]
    Return(#[from] ReturnError),

    #[error(transparent)]
    Inventory(#[from] InventoryError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub code: u32,
    pub error: String,
    pub message: String,
}

impl AppError {
    /// HTTP status and error code for this error
    pub fn classify(&self) -> (StatusCode, ErrorCode) {
        match self {
            AppError::Authentication(_) => (StatusCode::UNAUTHORIZED, ErrorCode::NotAuthorized),
            AppError::Authorization(_) => (StatusCode::FORBIDDEN, ErrorCode::NotAuthorized),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, ErrorCode::Failure),
            AppError::LoanNotFound(_) => (StatusCode::NOT_FOUND, ErrorCode::NoSuchLoan),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, ErrorCode::BadValue),
            AppError::Issue(e) => match e {
                IssueError::InvalidDueDate { .. } => (StatusCode::BAD_REQUEST, ErrorCode::BadValue),
                IssueError::TitleNotFound(_) => (StatusCode::NOT_FOUND, ErrorCode::NoSuchTitle),
                IssueError::TitleInactive(_) => (StatusCode::CONFLICT, ErrorCode::TitleInactive),
                IssueError::MemberNotFound(_) => (StatusCode::NOT_FOUND, ErrorCode::NoSuchMember),
                IssueError::MemberInactive(_) => (StatusCode::CONFLICT, ErrorCode::MemberInactive),
                IssueError::LimitExceeded { .. } => {
                    (StatusCode::UNPROCESSABLE_ENTITY, ErrorCode::MaxLoansReached)
                }
                IssueError::OutOfStock(_) => (StatusCode::CONFLICT, ErrorCode::OutOfStock),
                IssueError::Store(e) => store_status(e),
            },
            AppError::Return(e) => match e {
                ReturnError::LoanNotFound(_) => (StatusCode::NOT_FOUND, ErrorCode::NoSuchLoan),
                ReturnError::AlreadyReturned(_) => (StatusCode::CONFLICT, ErrorCode::AlreadyReturned),
                ReturnError::Store(e) => store_status(e),
            },
            AppError::Inventory(e) => match e {
                InventoryError::TitleNotFound(_) => (StatusCode::NOT_FOUND, ErrorCode::NoSuchTitle),
                InventoryError::OutOfStock(_) => (StatusCode::CONFLICT, ErrorCode::OutOfStock),
                InventoryError::InvalidTotal { .. } => {
                    (StatusCode::UNPROCESSABLE_ENTITY, ErrorCode::InvalidCopyCount)
                }
                InventoryError::AlreadyFull(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::StoreFailure)
                }
                InventoryError::Store(e) => store_status(e),
            },
            AppError::Store(e) => store_status(e),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::Failure),
        }
    }
}

fn store_status(e: &StoreError) -> (StatusCode, ErrorCode) {
    match e {
        StoreError::Timeout(_) | StoreError::Unavailable(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, ErrorCode::StoreUnavailable)
        }
        StoreError::Database(_) | StoreError::Corrupt(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::StoreFailure)
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.classify();

        // Infrastructure details stay in the logs
        let message = if status.is_server_error() {
            tracing::error!("Request failed: {:?}", self);
            match code {
                ErrorCode::StoreUnavailable => "Store unavailable, retry later".to_string(),
                _ => "Internal server error".to_string(),
            }
        } else {
            self.to_string()
        };

        let body = Json(ErrorResponse {
            code: code as u32,
            error: format!("{:?}", code),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
