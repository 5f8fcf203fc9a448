//! PostgreSQL store
//!
//! Each circulation transaction is a database transaction. Rows are locked
//! with `FOR UPDATE` in the order loan, title, member.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, QueryBuilder, Row, Transaction};

use crate::{
    error::StoreError,
    models::{loan::LoanRow, Loan, LoanFilter, LoanStatus, Member, NewLoan, Title},
};

use super::{CirculationStore, CirculationTx};

const TITLE_COLUMNS: &str = "id, name, author, total_copies, available_copies, is_active";
const MEMBER_COLUMNS: &str = "id, external_id, name, is_active";
const LOAN_COLUMNS: &str = "id, title_id, member_id, issued_by, borrow_date, due_date, \
     return_date, status, fine_amount, fine_paid, renewal_count";

#[derive(Clone)]
pub struct PgStore {
    pool: Pool<Postgres>,
}

impl PgStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

/// Append the WHERE clause for a loan listing
fn push_loan_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &LoanFilter) {
    qb.push(" WHERE TRUE");
    if let Some(member_id) = filter.member_id {
        qb.push(" AND member_id = ").push_bind(member_id);
    }
    match filter.status {
        Some(LoanStatus::Active) => {
            qb.push(" AND return_date IS NULL AND due_date >= ")
                .push_bind(filter.now);
        }
        Some(LoanStatus::Overdue) => {
            qb.push(" AND return_date IS NULL AND due_date < ")
                .push_bind(filter.now);
        }
        Some(LoanStatus::Returned) => {
            qb.push(" AND return_date IS NOT NULL");
        }
        None => {}
    }
}

#[async_trait]
impl CirculationTx for PgTx {
    async fn title_for_update(&mut self, title_id: i64) -> Result<Option<Title>, StoreError> {
        let title = sqlx::query_as::<_, Title>(&format!(
            "SELECT {} FROM titles WHERE id = $1 FOR UPDATE",
            TITLE_COLUMNS
        ))
        .bind(title_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(title)
    }

    async fn adjust_available_copies(&mut self, title_id: i64, delta: i32) -> Result<Title, StoreError> {
        sqlx::query_as::<_, Title>(&format!(
            "UPDATE titles SET available_copies = available_copies + $2 WHERE id = $1 RETURNING {}",
            TITLE_COLUMNS
        ))
        .bind(title_id)
        .bind(delta)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| StoreError::Corrupt(format!("title {} vanished", title_id)))
    }

    async fn resize_title(&mut self, title_id: i64, delta: i32) -> Result<Title, StoreError> {
        sqlx::query_as::<_, Title>(&format!(
            r#"
            UPDATE titles
            SET total_copies = total_copies + $2,
                available_copies = available_copies + $2
            WHERE id = $1
            RETURNING {}
            "#,
            TITLE_COLUMNS
        ))
        .bind(title_id)
        .bind(delta)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| StoreError::Corrupt(format!("title {} vanished", title_id)))
    }

    async fn member_for_update(&mut self, external_id: &str) -> Result<Option<Member>, StoreError> {
        let member = sqlx::query_as::<_, Member>(&format!(
            "SELECT {} FROM members WHERE external_id = $1 FOR UPDATE",
            MEMBER_COLUMNS
        ))
        .bind(external_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(member)
    }

    async fn count_open_loans(&mut self, member_id: i64) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM loans WHERE member_id = $1 AND return_date IS NULL",
        )
        .bind(member_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(count)
    }

    async fn insert_loan(&mut self, loan: NewLoan) -> Result<Loan, StoreError> {
        let row = sqlx::query_as::<_, LoanRow>(&format!(
            r#"
            INSERT INTO loans (title_id, member_id, issued_by, borrow_date, due_date, status)
            VALUES ($1, $2, $3, $4, $5, 'active')
            RETURNING {}
            "#,
            LOAN_COLUMNS
        ))
        .bind(loan.title_id)
        .bind(loan.member_id)
        .bind(&loan.issued_by)
        .bind(loan.borrow_date)
        .bind(loan.due_date)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(row.into())
    }

    async fn loan_for_update(&mut self, loan_id: i64) -> Result<Option<Loan>, StoreError> {
        let row = sqlx::query_as::<_, LoanRow>(&format!(
            "SELECT {} FROM loans WHERE id = $1 FOR UPDATE",
            LOAN_COLUMNS
        ))
        .bind(loan_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(Loan::from))
    }

    async fn update_loan(&mut self, loan: &Loan) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE loans
            SET return_date = $2, status = $3, fine_amount = $4, fine_paid = $5, renewal_count = $6
            WHERE id = $1
            "#,
        )
        .bind(loan.id)
        .bind(loan.return_date)
        .bind(loan.status)
        .bind(loan.fine.amount)
        .bind(loan.fine.paid)
        .bind(loan.renewal_count)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Corrupt(format!("loan {} vanished", loan.id)));
        }
        Ok(())
    }

    async fn mark_overdue(&mut self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE loans SET status = 'overdue'
            WHERE status = 'active' AND return_date IS NULL AND due_date < $1
            "#,
        )
        .bind(now)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected())
    }

    async fn add_open_loan(&mut self, member_id: i64, loan_id: i64) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO member_open_loans (member_id, loan_id) VALUES ($1, $2)")
            .bind(member_id)
            .bind(loan_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn remove_open_loan(&mut self, member_id: i64, loan_id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM member_open_loans WHERE member_id = $1 AND loan_id = $2")
            .bind(member_id)
            .bind(loan_id)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Corrupt(format!(
                "loan {} missing from open loans of member {}",
                loan_id, member_id
            )));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl CirculationStore for PgStore {
    async fn begin(&self) -> Result<Box<dyn CirculationTx>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx }))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn get_title(&self, title_id: i64) -> Result<Option<Title>, StoreError> {
        let title = sqlx::query_as::<_, Title>(&format!("SELECT {} FROM titles WHERE id = $1", TITLE_COLUMNS))
            .bind(title_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(title)
    }

    async fn get_titles(&self, title_ids: &[i64]) -> Result<Vec<Title>, StoreError> {
        let titles = sqlx::query_as::<_, Title>(&format!(
            "SELECT {} FROM titles WHERE id = ANY($1)",
            TITLE_COLUMNS
        ))
        .bind(title_ids.to_vec())
        .fetch_all(&self.pool)
        .await?;
        Ok(titles)
    }

    async fn get_member(&self, external_id: &str) -> Result<Option<Member>, StoreError> {
        let member = sqlx::query_as::<_, Member>(&format!(
            "SELECT {} FROM members WHERE external_id = $1",
            MEMBER_COLUMNS
        ))
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(member)
    }

    async fn get_loan(&self, loan_id: i64) -> Result<Option<Loan>, StoreError> {
        let row = sqlx::query_as::<_, LoanRow>(&format!("SELECT {} FROM loans WHERE id = $1", LOAN_COLUMNS))
            .bind(loan_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Loan::from))
    }

    async fn list_loans(&self, filter: &LoanFilter) -> Result<(Vec<Loan>, i64), StoreError> {
        let mut count_query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM loans");
        push_loan_filter(&mut count_query, filter);
        let total: i64 = count_query.build().fetch_one(&self.pool).await?.try_get(0)?;

        let mut query = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM loans", LOAN_COLUMNS));
        push_loan_filter(&mut query, filter);
        query
            .push(" ORDER BY borrow_date DESC, id DESC LIMIT ")
            .push_bind(filter.limit)
            .push(" OFFSET ")
            .push_bind(filter.offset);

        let rows = query.build_query_as::<LoanRow>().fetch_all(&self.pool).await?;
        Ok((rows.into_iter().map(Loan::from).collect(), total))
    }

    async fn scan_loans(&self) -> Result<Vec<Loan>, StoreError> {
        let rows = sqlx::query_as::<_, LoanRow>(&format!("SELECT {} FROM loans", LOAN_COLUMNS))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Loan::from).collect())
    }

    async fn open_loan_ids(&self, member_id: i64) -> Result<Vec<i64>, StoreError> {
        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT loan_id FROM member_open_loans WHERE member_id = $1 ORDER BY added_at, loan_id",
        )
        .bind(member_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn count_active_titles(&self) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM titles WHERE is_active")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn count_active_members(&self) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM members WHERE is_active")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
