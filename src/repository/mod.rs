//! Store layer: catalog, member directory and loan collection
//!
//! Every mutation of the circulation core goes through a [`CirculationTx`].
//! A transaction sees its own writes, publishes all of them on
//! [`CirculationTx::commit`] and none of them when dropped. Rows read with
//! a `*_for_update` method stay locked until the transaction ends, which is
//! what serializes concurrent issue/return requests on the same title,
//! member or loan.

pub mod memory;
pub mod postgres;

use std::{future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;

use crate::{
    error::StoreError,
    models::{Loan, LoanFilter, Member, NewLoan, Title},
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Unit of work over the shared circulation state
#[async_trait]
pub trait CirculationTx: Send {
    /// Fetch a title and lock it for the rest of the transaction
    async fn title_for_update(&mut self, title_id: i64) -> Result<Option<Title>, StoreError>;

    /// Add `delta` to the available copy count
    async fn adjust_available_copies(&mut self, title_id: i64, delta: i32) -> Result<Title, StoreError>;

    /// Add `delta` to both the total and the available copy count
    async fn resize_title(&mut self, title_id: i64, delta: i32) -> Result<Title, StoreError>;

    /// Fetch a member by external identifier and lock it
    async fn member_for_update(&mut self, external_id: &str) -> Result<Option<Member>, StoreError>;

    /// Number of the member's loans without a return date
    async fn count_open_loans(&mut self, member_id: i64) -> Result<i64, StoreError>;

    async fn insert_loan(&mut self, loan: NewLoan) -> Result<Loan, StoreError>;

    /// Fetch a loan and lock it
    async fn loan_for_update(&mut self, loan_id: i64) -> Result<Option<Loan>, StoreError>;

    /// Persist the mutable fields of a loan (return date, status, fine)
    async fn update_loan(&mut self, loan: &Loan) -> Result<(), StoreError>;

    /// Persist `overdue` on open loans past due; returns the number touched
    async fn mark_overdue(&mut self, now: chrono::DateTime<chrono::Utc>) -> Result<u64, StoreError>;

    async fn add_open_loan(&mut self, member_id: i64, loan_id: i64) -> Result<(), StoreError>;

    async fn remove_open_loan(&mut self, member_id: i64, loan_id: i64) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Backing store for the circulation core
#[async_trait]
pub trait CirculationStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn CirculationTx>, StoreError>;

    /// Cheap liveness check
    async fn ping(&self) -> Result<(), StoreError>;

    async fn get_title(&self, title_id: i64) -> Result<Option<Title>, StoreError>;

    async fn get_titles(&self, title_ids: &[i64]) -> Result<Vec<Title>, StoreError>;

    async fn get_member(&self, external_id: &str) -> Result<Option<Member>, StoreError>;

    async fn get_loan(&self, loan_id: i64) -> Result<Option<Loan>, StoreError>;

    /// One page of loans matching `filter`, newest first, with the total match count
    async fn list_loans(&self, filter: &LoanFilter) -> Result<(Vec<Loan>, i64), StoreError>;

    /// Every loan ever issued
    async fn scan_loans(&self) -> Result<Vec<Loan>, StoreError>;

    /// Open-loan index of a member, in insertion order
    async fn open_loan_ids(&self, member_id: i64) -> Result<Vec<i64>, StoreError>;

    async fn count_active_titles(&self) -> Result<i64, StoreError>;

    async fn count_active_members(&self) -> Result<i64, StoreError>;
}

/// Shared handle to the store with a per-operation deadline
#[derive(Clone)]
pub struct Repository {
    store: Arc<dyn CirculationStore>,
    deadline: Duration,
}

impl Repository {
    pub fn new(store: Arc<dyn CirculationStore>, deadline: Duration) -> Self {
        Self { store, deadline }
    }

    pub fn store(&self) -> &dyn CirculationStore {
        self.store.as_ref()
    }

    /// Run a unit of work under the store deadline.
    ///
    /// A unit of work that misses the deadline is dropped, which rolls back
    /// any transaction it holds.
    pub async fn within<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: From<StoreError>,
    {
        match tokio::time::timeout(self.deadline, work).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!("Store operation exceeded {:?}", self.deadline);
                Err(StoreError::Timeout(self.deadline).into())
            }
        }
    }
}
