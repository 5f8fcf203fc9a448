//! Fine policy

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::models::{Loan, LoanStatus};

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Flat per-day fine with no cap
#[derive(Debug, Clone)]
pub struct FinePolicy {
    rate_per_day: Decimal,
}

impl FinePolicy {
    pub fn new(rate_per_day: Decimal) -> Self {
        Self { rate_per_day }
    }

    /// Whole days late at `now`, any started day counting as a full one
    pub fn overdue_days(due_date: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
        let late_ms = (now - due_date).num_milliseconds();
        if late_ms <= 0 {
            0
        } else {
            (late_ms + MILLIS_PER_DAY - 1) / MILLIS_PER_DAY
        }
    }

    /// Fine owed on `loan` if it were returned at `now`.
    ///
    /// Returned loans owe nothing here: their fine was fixed at return time.
    pub fn compute_fine(&self, loan: &Loan, now: DateTime<Utc>) -> Decimal {
        if loan.status == LoanStatus::Returned {
            return Decimal::ZERO;
        }
        Decimal::from(Self::overdue_days(loan.due_date, now)) * self.rate_per_day
    }
}
