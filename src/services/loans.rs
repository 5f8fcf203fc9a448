//! Loan lifecycle: issue, return, listing
//!
//! Issue and return each run as a single store transaction under the store
//! deadline. Either every step commits or none does.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::{
    config::CirculationConfig,
    error::{AppError, AppResult, IssueError, ReturnError},
    models::{Loan, LoanFilter, LoanPage, LoanQuery, LoanStatus, Member, NewLoan, OpenLoans, Principal},
    repository::Repository,
};

use super::{fines::FinePolicy, inventory::InventoryLedger, limits::LoanLimitGuard};

/// Issue request as accepted by the loan state machine
#[derive(Debug, Clone)]
pub struct IssueLoan {
    pub title_id: i64,
    /// Member external identifier
    pub member_id: String,
    pub due_date: DateTime<Utc>,
}

#[derive(Clone)]
pub struct LoansService {
    repository: Repository,
    fines: FinePolicy,
    ledger: InventoryLedger,
    guard: LoanLimitGuard,
    default_page_size: i64,
    max_page_size: i64,
}

impl LoansService {
    pub fn new(repository: Repository, config: &CirculationConfig) -> Self {
        Self {
            repository,
            fines: FinePolicy::new(config.fine_rate_per_day),
            ledger: InventoryLedger::new(),
            guard: LoanLimitGuard::new(config.max_concurrent_loans),
            default_page_size: config.default_page_size,
            max_page_size: config.max_page_size,
        }
    }

    /// Check a title out to a member
    pub async fn issue(&self, request: IssueLoan, issuer: &Principal, now: DateTime<Utc>) -> Result<Loan, IssueError> {
        self.repository
            .within(self.issue_in_tx(request, issuer, now))
            .await
    }

    async fn issue_in_tx(&self, request: IssueLoan, issuer: &Principal, now: DateTime<Utc>) -> Result<Loan, IssueError> {
        if request.due_date < now {
            return Err(IssueError::InvalidDueDate {
                due_date: request.due_date,
                now,
            });
        }

        let mut tx = self.repository.store().begin().await?;

        let title = tx
            .title_for_update(request.title_id)
            .await?
            .ok_or(IssueError::TitleNotFound(request.title_id))?;
        if !title.is_active {
            return Err(IssueError::TitleInactive(title.id));
        }

        let member = tx
            .member_for_update(&request.member_id)
            .await?
            .ok_or_else(|| IssueError::MemberNotFound(request.member_id.clone()))?;
        if !member.is_active {
            return Err(IssueError::MemberInactive(member.external_id));
        }

        self.guard.check_limit(tx.as_mut(), &member).await?;
        let title = self.ledger.reserve_copy(tx.as_mut(), title.id).await?;

        let loan = tx
            .insert_loan(NewLoan {
                title_id: title.id,
                member_id: member.id,
                issued_by: issuer.id.clone(),
                borrow_date: now,
                due_date: request.due_date,
            })
            .await?;
        tx.add_open_loan(member.id, loan.id).await?;
        tx.commit().await?;

        tracing::info!(
            loan_id = loan.id,
            title_id = title.id,
            member = %member.external_id,
            issued_by = %issuer.id,
            available = title.available_copies,
            "Loan issued"
        );
        Ok(loan)
    }

    /// Check a loan back in, fixing its fine
    pub async fn return_loan(&self, loan_id: i64, now: DateTime<Utc>) -> Result<Loan, ReturnError> {
        self.repository.within(self.return_in_tx(loan_id, now)).await
    }

    async fn return_in_tx(&self, loan_id: i64, now: DateTime<Utc>) -> Result<Loan, ReturnError> {
        let mut tx = self.repository.store().begin().await?;

        let mut loan = tx
            .loan_for_update(loan_id)
            .await?
            .ok_or(ReturnError::LoanNotFound(loan_id))?;
        if !loan.is_open() {
            return Err(ReturnError::AlreadyReturned(loan_id));
        }

        let fine = self.fines.compute_fine(&loan, now);
        let was_overdue = fine > Decimal::ZERO;

        loan.fine.amount = fine;
        loan.return_date = Some(now);
        loan.status = LoanStatus::Returned;
        tx.update_loan(&loan).await?;

        let title = self.ledger.release_copy(tx.as_mut(), loan.title_id).await?;
        tx.remove_open_loan(loan.member_id, loan.id).await?;
        tx.commit().await?;

        tracing::info!(
            loan_id = loan.id,
            title_id = loan.title_id,
            member_id = loan.member_id,
            overdue = was_overdue,
            fine = %loan.fine.amount,
            available = title.available_copies,
            "Loan returned"
        );
        Ok(loan)
    }

    /// Page through loans, newest first, with statuses derived at `now`
    pub async fn list_loans(&self, query: &LoanQuery, now: DateTime<Utc>) -> AppResult<LoanPage> {
        let member_id = match query.member.as_deref() {
            Some(external_id) => Some(self.member(external_id).await?.id),
            None => None,
        };

        let page = query.page.unwrap_or(1).max(1);
        let per_page = query
            .per_page
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size.max(1));

        let offset = (page - 1)
            .checked_mul(per_page)
            .ok_or_else(|| AppError::Validation(format!("Page {} is out of range", page)))?;

        let filter = LoanFilter {
            member_id,
            status: query.status,
            now,
            offset,
            limit: per_page,
        };

        let (loans, total) = self
            .repository
            .within(self.repository.store().list_loans(&filter))
            .await?;

        Ok(LoanPage {
            items: loans.into_iter().map(|loan| loan.as_of(now)).collect(),
            total,
            page,
            per_page,
            total_pages: (total + per_page - 1) / per_page,
        })
    }

    pub async fn get_loan(&self, loan_id: i64, now: DateTime<Utc>) -> AppResult<Loan> {
        self.repository
            .within(self.repository.store().get_loan(loan_id))
            .await?
            .map(|loan| loan.as_of(now))
            .ok_or(AppError::LoanNotFound(loan_id))
    }

    /// Persist `overdue` on open loans past due. Reads derive the status
    /// regardless; this only refreshes the stored copy.
    pub async fn refresh_overdue(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let touched = self
            .repository
            .within(async {
                let mut tx = self.repository.store().begin().await?;
                let touched = tx.mark_overdue(now).await?;
                tx.commit().await?;
                Ok::<_, AppError>(touched)
            })
            .await?;

        tracing::info!(touched, "Overdue status refreshed");
        Ok(touched)
    }

    pub async fn member(&self, external_id: &str) -> AppResult<Member> {
        self.repository
            .within(self.repository.store().get_member(external_id))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Member {} not found", external_id)))
    }

    /// Open-loan index of a member
    pub async fn open_loans(&self, external_id: &str) -> AppResult<OpenLoans> {
        let member = self.member(external_id).await?;
        let loan_ids = self
            .repository
            .within(self.repository.store().open_loan_ids(member.id))
            .await?;

        Ok(OpenLoans {
            member_id: member.id,
            external_id: member.external_id,
            loan_ids,
        })
    }
}
