//! Loan model and related types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use sqlx::{Decode, Encode, FromRow, Postgres};
use utoipa::{IntoParams, ToSchema};

/// Loan status.
///
/// Only `Active` and `Returned` are authoritative in storage. `Overdue` is
/// derived at read time from the due date; a stored `Overdue` is a cache
/// written by the overdue refresh and is treated like `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Active,
    Overdue,
    Returned,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Active => "active",
            LoanStatus::Overdue => "overdue",
            LoanStatus::Returned => "returned",
        }
    }

    /// Whether the loan still holds a copy
    pub fn is_open(&self) -> bool {
        !matches!(self, LoanStatus::Returned)
    }
}

impl std::fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for LoanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(LoanStatus::Active),
            "overdue" => Ok(LoanStatus::Overdue),
            "returned" => Ok(LoanStatus::Returned),
            _ => Err(format!("Invalid loan status: {}", s)),
        }
    }
}

// SQLx conversion for LoanStatus
impl sqlx::Type<Postgres> for LoanStatus {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<Postgres>>::type_info()
    }
}

impl<'r> Decode<'r, Postgres> for LoanStatus {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s: String = Decode::<Postgres>::decode(value)?;
        s.parse().map_err(|e: String| e.into())
    }
}

impl Encode<'_, Postgres> for LoanStatus {
    fn encode_by_ref(&self, buf: &mut sqlx::postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
        <&str as Encode<Postgres>>::encode(self.as_str(), buf)
    }
}

/// Fine attached to a loan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Fine {
    pub amount: Decimal,
    pub paid: bool,
}

impl Default for Fine {
    fn default() -> Self {
        Self {
            amount: Decimal::ZERO,
            paid: false,
        }
    }
}

/// A single checkout of one copy of a title by one member
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Loan {
    pub id: i64,
    pub title_id: i64,
    pub member_id: i64,
    /// Identifier of the principal who issued the loan
    pub issued_by: String,
    pub borrow_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub status: LoanStatus,
    pub fine: Fine,
    pub renewal_count: i32,
}

impl Loan {
    /// Status as of `now`: open loans past their due date read as overdue
    pub fn current_status(&self, now: DateTime<Utc>) -> LoanStatus {
        if self.return_date.is_some() || self.status == LoanStatus::Returned {
            LoanStatus::Returned
        } else if now > self.due_date {
            LoanStatus::Overdue
        } else {
            LoanStatus::Active
        }
    }

    pub fn is_open(&self) -> bool {
        self.return_date.is_none() && self.status.is_open()
    }

    /// Copy of the loan carrying its derived status, for display
    pub fn as_of(mut self, now: DateTime<Utc>) -> Self {
        self.status = self.current_status(now);
        self
    }
}

/// Row shape of the `loans` table
#[derive(Debug, Clone, FromRow)]
pub struct LoanRow {
    id: i64,
    title_id: i64,
    member_id: i64,
    issued_by: String,
    borrow_date: DateTime<Utc>,
    due_date: DateTime<Utc>,
    return_date: Option<DateTime<Utc>>,
    status: LoanStatus,
    fine_amount: Decimal,
    fine_paid: bool,
    renewal_count: i32,
}

impl From<LoanRow> for Loan {
    fn from(row: LoanRow) -> Self {
        Loan {
            id: row.id,
            title_id: row.title_id,
            member_id: row.member_id,
            issued_by: row.issued_by,
            borrow_date: row.borrow_date,
            due_date: row.due_date,
            return_date: row.return_date,
            status: row.status,
            fine: Fine {
                amount: row.fine_amount,
                paid: row.fine_paid,
            },
            renewal_count: row.renewal_count,
        }
    }
}

/// Insert payload for a new loan record
#[derive(Debug, Clone)]
pub struct NewLoan {
    pub title_id: i64,
    pub member_id: i64,
    pub issued_by: String,
    pub borrow_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
}

/// Store-level listing filter. `status` matches the derived status at `now`.
#[derive(Debug, Clone)]
pub struct LoanFilter {
    pub member_id: Option<i64>,
    pub status: Option<LoanStatus>,
    pub now: DateTime<Utc>,
    pub offset: i64,
    pub limit: i64,
}

impl LoanFilter {
    pub fn matches(&self, loan: &Loan) -> bool {
        self.member_id.map_or(true, |m| loan.member_id == m)
            && self.status.map_or(true, |s| loan.current_status(self.now) == s)
    }
}

/// Loan listing query parameters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct LoanQuery {
    /// Member external identifier
    pub member: Option<String>,
    /// Derived status (active, overdue, returned)
    pub status: Option<LoanStatus>,
    /// Page number (default: 1)
    pub page: Option<i64>,
    /// Loans per page
    pub per_page: Option<i64>,
}

/// One page of loans
#[derive(Debug, Serialize, ToSchema)]
pub struct LoanPage {
    pub items: Vec<Loan>,
    /// Total number of matching loans
    pub total: i64,
    /// Current page number
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}
