//! Loan-limit guard

use crate::{error::LimitError, models::Member, repository::CirculationTx};

/// Caps the number of loans a member may hold at once
#[derive(Debug, Clone)]
pub struct LoanLimitGuard {
    max_concurrent_loans: u32,
}

impl LoanLimitGuard {
    pub fn new(max_concurrent_loans: u32) -> Self {
        Self {
            max_concurrent_loans,
        }
    }

    /// Fails when the member already holds the maximum number of open loans.
    /// The member row must be locked by `tx` for the count to stay valid.
    pub async fn check_limit(&self, tx: &mut dyn CirculationTx, member: &Member) -> Result<(), LimitError> {
        let open = tx.count_open_loans(member.id).await?;
        if open >= i64::from(self.max_concurrent_loans) {
            tracing::debug!(
                member_id = member.id,
                open,
                max = self.max_concurrent_loans,
                "Loan limit reached"
            );
            return Err(LimitError::LimitExceeded {
                member_id: member.id,
                open,
                max: self.max_concurrent_loans,
            });
        }
        Ok(())
    }
}
