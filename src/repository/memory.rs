//! In-process store.
//!
//! All state sits behind one async mutex. A transaction holds the lock from
//! `begin` until it is committed or dropped. It writes in place and keeps
//! the prior value of every entry it touches, so a dropped transaction
//! only restores what it changed.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use serde::Deserialize;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    error::StoreError,
    models::{Fine, Loan, LoanFilter, LoanStatus, Member, NewLoan, NewMember, NewTitle, Title},
};

use super::{CirculationStore, CirculationTx};

/// Titles and members to preload into a fresh store
#[derive(Debug, Default, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub titles: Vec<NewTitle>,
    #[serde(default)]
    pub members: Vec<NewMember>,
}

#[derive(Debug, Default)]
struct MemoryState {
    titles: BTreeMap<i64, Title>,
    members: BTreeMap<i64, Member>,
    member_ids: HashMap<String, i64>,
    loans: BTreeMap<i64, Loan>,
    open_loans: HashMap<i64, IndexSet<i64>>,
    next_title_id: i64,
    next_member_id: i64,
    next_loan_id: i64,
    #[cfg(test)]
    fail_on: Option<&'static str>,
}

impl MemoryState {
    fn title_mut(&mut self, title_id: i64) -> Result<&mut Title, StoreError> {
        self.titles
            .get_mut(&title_id)
            .ok_or_else(|| StoreError::Corrupt(format!("title {} vanished", title_id)))
    }

    #[cfg(test)]
    fn check(&self, op: &'static str) -> Result<(), StoreError> {
        match self.fail_on {
            Some(failing) if failing == op => Err(StoreError::Unavailable(format!("{} failed", op))),
            _ => Ok(()),
        }
    }

    #[cfg(not(test))]
    fn check(&self, _op: &'static str) -> Result<(), StoreError> {
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a title with all copies on the shelf
    pub async fn insert_title(&self, title: NewTitle) -> Result<Title, StoreError> {
        if title.total_copies < 1 {
            return Err(StoreError::Corrupt(format!(
                "title '{}' must own at least one copy",
                title.name
            )));
        }

        let mut state = self.state.lock().await;
        state.next_title_id += 1;
        let record = Title {
            id: state.next_title_id,
            name: title.name,
            author: title.author,
            total_copies: title.total_copies,
            available_copies: title.total_copies,
            is_active: title.is_active,
        };
        state.titles.insert(record.id, record.clone());
        Ok(record)
    }

    pub async fn insert_member(&self, member: NewMember) -> Result<Member, StoreError> {
        let mut state = self.state.lock().await;
        if state.member_ids.contains_key(&member.external_id) {
            return Err(StoreError::Corrupt(format!(
                "member {} already registered",
                member.external_id
            )));
        }

        state.next_member_id += 1;
        let record = Member {
            id: state.next_member_id,
            external_id: member.external_id,
            name: member.name,
            is_active: member.is_active,
        };
        state.member_ids.insert(record.external_id.clone(), record.id);
        state.members.insert(record.id, record.clone());
        Ok(record)
    }

    /// Catalog-side withdrawal or reinstatement of a title
    pub async fn set_title_active(&self, title_id: i64, active: bool) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.title_mut(title_id)?.is_active = active;
        Ok(())
    }

    /// Directory-side (de)activation of a member
    pub async fn set_member_active(&self, external_id: &str, active: bool) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let member_id = *state
            .member_ids
            .get(external_id)
            .ok_or_else(|| StoreError::Corrupt(format!("member {} not registered", external_id)))?;
        if let Some(member) = state.members.get_mut(&member_id) {
            member.is_active = active;
        }
        Ok(())
    }

    pub async fn seed(&self, seed: Seed) -> Result<(), StoreError> {
        let (titles, members) = (seed.titles.len(), seed.members.len());
        for title in seed.titles {
            self.insert_title(title).await?;
        }
        for member in seed.members {
            self.insert_member(member).await?;
        }
        tracing::info!("Seeded memory store with {} titles and {} members", titles, members);
        Ok(())
    }

    /// Make the named transaction step fail from now on
    #[cfg(test)]
    pub(crate) async fn fail_on(&self, op: &'static str) {
        self.state.lock().await.fail_on = Some(op);
    }
}

/// Prior value of something a transaction overwrote
#[derive(Debug)]
enum Undo {
    Title(Title),
    Loan { loan_id: i64, prior: Option<Loan> },
    OpenLoans { member_id: i64, prior: Option<IndexSet<i64>> },
    NextLoanId(i64),
}

impl MemoryState {
    fn restore(&mut self, undo: Undo) {
        match undo {
            Undo::Title(title) => {
                self.titles.insert(title.id, title);
            }
            Undo::Loan { loan_id, prior } => match prior {
                Some(loan) => {
                    self.loans.insert(loan_id, loan);
                }
                None => {
                    self.loans.remove(&loan_id);
                }
            },
            Undo::OpenLoans { member_id, prior } => match prior {
                Some(set) => {
                    self.open_loans.insert(member_id, set);
                }
                None => {
                    self.open_loans.remove(&member_id);
                }
            },
            Undo::NextLoanId(id) => self.next_loan_id = id,
        }
    }
}

/// Writes go straight to the locked state; an uncommitted transaction
/// replays its undo log, newest first, when dropped.
pub struct MemoryTx {
    state: OwnedMutexGuard<MemoryState>,
    undo: Vec<Undo>,
    committed: bool,
}

impl MemoryTx {
    fn save_title(&mut self, title_id: i64) -> Result<(), StoreError> {
        let prior = self.state.title_mut(title_id)?.clone();
        self.undo.push(Undo::Title(prior));
        Ok(())
    }

    fn save_loan(&mut self, loan_id: i64) {
        let prior = self.state.loans.get(&loan_id).cloned();
        self.undo.push(Undo::Loan { loan_id, prior });
    }

    fn save_open_loans(&mut self, member_id: i64) {
        let prior = self.state.open_loans.get(&member_id).cloned();
        self.undo.push(Undo::OpenLoans { member_id, prior });
    }
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        while let Some(undo) = self.undo.pop() {
            self.state.restore(undo);
        }
    }
}

#[async_trait]
impl CirculationTx for MemoryTx {
    async fn title_for_update(&mut self, title_id: i64) -> Result<Option<Title>, StoreError> {
        self.state.check("title_for_update")?;
        Ok(self.state.titles.get(&title_id).cloned())
    }

    async fn adjust_available_copies(&mut self, title_id: i64, delta: i32) -> Result<Title, StoreError> {
        self.state.check("adjust_available_copies")?;
        let title = self.state.title_mut(title_id)?;
        let available = title.available_copies + delta;
        if available < 0 || available > title.total_copies {
            return Err(StoreError::Corrupt(format!(
                "title {} would have {} of {} copies available",
                title_id, available, title.total_copies
            )));
        }
        self.save_title(title_id)?;
        let title = self.state.title_mut(title_id)?;
        title.available_copies = available;
        Ok(title.clone())
    }

    async fn resize_title(&mut self, title_id: i64, delta: i32) -> Result<Title, StoreError> {
        self.state.check("resize_title")?;
        let title = self.state.title_mut(title_id)?;
        let total = title.total_copies + delta;
        let available = title.available_copies + delta;
        if total < 1 || available < 0 {
            return Err(StoreError::Corrupt(format!(
                "title {} cannot be resized to {} copies",
                title_id, total
            )));
        }
        self.save_title(title_id)?;
        let title = self.state.title_mut(title_id)?;
        title.total_copies = total;
        title.available_copies = available;
        Ok(title.clone())
    }

    async fn member_for_update(&mut self, external_id: &str) -> Result<Option<Member>, StoreError> {
        self.state.check("member_for_update")?;
        Ok(self
            .state
            .member_ids
            .get(external_id)
            .and_then(|id| self.state.members.get(id))
            .cloned())
    }

    async fn count_open_loans(&mut self, member_id: i64) -> Result<i64, StoreError> {
        self.state.check("count_open_loans")?;
        Ok(self
            .state
            .loans
            .values()
            .filter(|loan| loan.member_id == member_id && loan.is_open())
            .count() as i64)
    }

    async fn insert_loan(&mut self, loan: NewLoan) -> Result<Loan, StoreError> {
        self.state.check("insert_loan")?;
        self.undo.push(Undo::NextLoanId(self.state.next_loan_id));
        self.state.next_loan_id += 1;
        let record = Loan {
            id: self.state.next_loan_id,
            title_id: loan.title_id,
            member_id: loan.member_id,
            issued_by: loan.issued_by,
            borrow_date: loan.borrow_date,
            due_date: loan.due_date,
            return_date: None,
            status: LoanStatus::Active,
            fine: Fine::default(),
            renewal_count: 0,
        };
        self.save_loan(record.id);
        self.state.loans.insert(record.id, record.clone());
        Ok(record)
    }

    async fn loan_for_update(&mut self, loan_id: i64) -> Result<Option<Loan>, StoreError> {
        self.state.check("loan_for_update")?;
        Ok(self.state.loans.get(&loan_id).cloned())
    }

    async fn update_loan(&mut self, loan: &Loan) -> Result<(), StoreError> {
        self.state.check("update_loan")?;
        if !self.state.loans.contains_key(&loan.id) {
            return Err(StoreError::Corrupt(format!("loan {} vanished", loan.id)));
        }
        self.save_loan(loan.id);
        if let Some(stored) = self.state.loans.get_mut(&loan.id) {
            stored.return_date = loan.return_date;
            stored.status = loan.status;
            stored.fine = loan.fine.clone();
            stored.renewal_count = loan.renewal_count;
        }
        Ok(())
    }

    async fn mark_overdue(&mut self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        self.state.check("mark_overdue")?;
        let due: Vec<i64> = self
            .state
            .loans
            .values()
            .filter(|loan| loan.status == LoanStatus::Active && loan.is_open() && now > loan.due_date)
            .map(|loan| loan.id)
            .collect();

        for loan_id in &due {
            self.save_loan(*loan_id);
            if let Some(loan) = self.state.loans.get_mut(loan_id) {
                loan.status = LoanStatus::Overdue;
            }
        }
        Ok(due.len() as u64)
    }

    async fn add_open_loan(&mut self, member_id: i64, loan_id: i64) -> Result<(), StoreError> {
        self.state.check("add_open_loan")?;
        let indexed = self
            .state
            .open_loans
            .get(&member_id)
            .map_or(false, |set| set.contains(&loan_id));
        if indexed {
            return Err(StoreError::Corrupt(format!(
                "loan {} already indexed for member {}",
                loan_id, member_id
            )));
        }
        self.save_open_loans(member_id);
        self.state
            .open_loans
            .entry(member_id)
            .or_default()
            .insert(loan_id);
        Ok(())
    }

    async fn remove_open_loan(&mut self, member_id: i64, loan_id: i64) -> Result<(), StoreError> {
        self.state.check("remove_open_loan")?;
        let indexed = self
            .state
            .open_loans
            .get(&member_id)
            .map_or(false, |set| set.contains(&loan_id));
        if !indexed {
            return Err(StoreError::Corrupt(format!(
                "loan {} missing from open loans of member {}",
                loan_id, member_id
            )));
        }
        self.save_open_loans(member_id);
        if let Some(set) = self.state.open_loans.get_mut(&member_id) {
            set.shift_remove(&loan_id);
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut tx = self;
        tx.committed = true;
        tx.undo.clear();
        Ok(())
    }
}

#[async_trait]
impl CirculationStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn CirculationTx>, StoreError> {
        let state = self.state.clone().lock_owned().await;
        Ok(Box::new(MemoryTx {
            state,
            undo: Vec::new(),
            committed: false,
        }))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn get_title(&self, title_id: i64) -> Result<Option<Title>, StoreError> {
        Ok(self.state.lock().await.titles.get(&title_id).cloned())
    }

    async fn get_titles(&self, title_ids: &[i64]) -> Result<Vec<Title>, StoreError> {
        let state = self.state.lock().await;
        Ok(title_ids
            .iter()
            .filter_map(|id| state.titles.get(id).cloned())
            .collect())
    }

    async fn get_member(&self, external_id: &str) -> Result<Option<Member>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .member_ids
            .get(external_id)
            .and_then(|id| state.members.get(id))
            .cloned())
    }

    async fn get_loan(&self, loan_id: i64) -> Result<Option<Loan>, StoreError> {
        Ok(self.state.lock().await.loans.get(&loan_id).cloned())
    }

    async fn list_loans(&self, filter: &LoanFilter) -> Result<(Vec<Loan>, i64), StoreError> {
        let state = self.state.lock().await;
        let mut matching: Vec<&Loan> = state.loans.values().filter(|l| filter.matches(l)).collect();
        matching.sort_by(|a, b| b.borrow_date.cmp(&a.borrow_date).then(b.id.cmp(&a.id)));

        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn scan_loans(&self) -> Result<Vec<Loan>, StoreError> {
        Ok(self.state.lock().await.loans.values().cloned().collect())
    }

    async fn open_loan_ids(&self, member_id: i64) -> Result<Vec<i64>, StoreError> {
        Ok(self
            .state
            .lock()
            .await
            .open_loans
            .get(&member_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn count_active_titles(&self) -> Result<i64, StoreError> {
        Ok(self.state.lock().await.titles.values().filter(|t| t.is_active).count() as i64)
    }

    async fn count_active_members(&self) -> Result<i64, StoreError> {
        Ok(self.state.lock().await.members.values().filter(|m| m.is_active).count() as i64)
    }
}
