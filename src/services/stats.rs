//! Statistics service

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::{
    error::AppResult,
    models::{BorrowedTitle, CirculationStats, Loan, LoanStatus},
    repository::Repository,
};

/// Counts gathered in one pass over the loan collection
#[derive(Debug, Default, PartialEq, Eq)]
pub struct LoanTally {
    pub active: i64,
    pub overdue: i64,
    /// (title id, loan count), most borrowed first
    pub top: Vec<(i64, i64)>,
}

/// Map-reduce over the loan collection: current status counts plus the
/// `limit` most borrowed titles (ties go to the lower title id).
pub fn tally_loans(loans: &[Loan], now: DateTime<Utc>, limit: usize) -> LoanTally {
    let mut tally = LoanTally::default();
    let mut per_title: HashMap<i64, i64> = HashMap::new();

    for loan in loans {
        match loan.current_status(now) {
            LoanStatus::Active => tally.active += 1,
            LoanStatus::Overdue => tally.overdue += 1,
            LoanStatus::Returned => {}
        }
        *per_title.entry(loan.title_id).or_insert(0) += 1;
    }

    let mut ranked: Vec<(i64, i64)> = per_title.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked.truncate(limit);
    tally.top = ranked;
    tally
}

#[derive(Clone)]
pub struct StatsService {
    repository: Repository,
    top_limit: usize,
}

impl StatsService {
    pub fn new(repository: Repository, top_limit: usize) -> Self {
        Self {
            repository,
            top_limit,
        }
    }

    /// Snapshot of circulation as of `now`
    pub async fn stats(&self, now: DateTime<Utc>) -> AppResult<CirculationStats> {
        let store = self.repository.store();

        let loans = self.repository.within(store.scan_loans()).await?;
        let tally = tally_loans(&loans, now, self.top_limit);

        let ids: Vec<i64> = tally.top.iter().map(|(id, _)| *id).collect();
        let titles: HashMap<i64, _> = self
            .repository
            .within(store.get_titles(&ids))
            .await?
            .into_iter()
            .map(|t| (t.id, t))
            .collect();

        let top_borrowed = tally
            .top
            .iter()
            .map(|(title_id, count)| {
                let title = titles.get(title_id);
                BorrowedTitle {
                    title_id: *title_id,
                    count: *count,
                    name: title.map(|t| t.name.clone()),
                    author: title.and_then(|t| t.author.clone()),
                }
            })
            .collect();

        Ok(CirculationStats {
            active_count: tally.active,
            overdue_count: tally.overdue,
            total_active_titles: self.repository.within(store.count_active_titles()).await?,
            total_active_members: self.repository.within(store.count_active_members()).await?,
            top_borrowed,
        })
    }
}
