//! PostgreSQL store tests
//!
//! Run with: DATABASE_URL=postgres://... cargo test -- --ignored

use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sqlx::{postgres::PgPoolOptions, PgPool};

use circulation_server::{
    config::CirculationConfig,
    error::{IssueError, ReturnError},
    models::{LoanStatus, Principal, Role},
    repository::{CirculationStore, PgStore, Repository},
    services::{loans::IssueLoan, Services},
};

async fn pool() -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPoolOptions::new()
        .max_connections(8)
        .connect(&url)
        .await
        .expect("Failed to connect to database");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run database migrations");
    pool
}

fn services(pool: &PgPool) -> (PgStore, Services) {
    let config = CirculationConfig::default();
    let store = PgStore::new(pool.clone());
    let repository = Repository::new(Arc::new(store.clone()), config.store_timeout());
    (store, Services::new(repository, &config))
}

fn librarian() -> Principal {
    Principal {
        id: "pg-librarian".to_string(),
        role: Role::Librarian,
        member_id: None,
    }
}

/// Identifier unique to this test run, so tests can share one database
fn unique(prefix: &str) -> String {
    format!("{}-{}", prefix, Utc::now().timestamp_nanos_opt().unwrap_or_default())
}

async fn insert_title(pool: &PgPool, copies: i32) -> i64 {
    sqlx::query_scalar::<_, i64>(
        "INSERT INTO titles (name, total_copies, available_copies) VALUES ($1, $2, $2) RETURNING id",
    )
    .bind(unique("title"))
    .bind(copies)
    .fetch_one(pool)
    .await
    .unwrap()
}

async fn insert_member(pool: &PgPool, external_id: &str) {
    sqlx::query("INSERT INTO members (external_id, name) VALUES ($1, $2)")
        .bind(external_id)
        .bind("Postgres Test Member")
        .execute(pool)
        .await
        .unwrap();
}

#[tokio::test]
#[ignore]
async fn test_issue_and_return_round_trip() {
    let pool = pool().await;
    let (store, services) = services(&pool);
    let title_id = insert_title(&pool, 2).await;
    let member = unique("member");
    insert_member(&pool, &member).await;

    let now = Utc::now();
    let loan = services
        .loans
        .issue(
            IssueLoan {
                title_id,
                member_id: member.clone(),
                due_date: now + Duration::days(14),
            },
            &librarian(),
            now,
        )
        .await
        .unwrap();
    assert_eq!(store.get_title(title_id).await.unwrap().unwrap().available_copies, 1);

    let open = services.loans.open_loans(&member).await.unwrap();
    assert_eq!(open.loan_ids, vec![loan.id]);

    let returned = services
        .loans
        .return_loan(loan.id, now + Duration::days(20))
        .await
        .unwrap();
    assert_eq!(returned.status, LoanStatus::Returned);
    assert_eq!(returned.fine.amount, Decimal::from(60));

    let stored = store.get_loan(loan.id).await.unwrap().unwrap();
    assert_eq!(stored.fine.amount, Decimal::from(60));
    assert_eq!(store.get_title(title_id).await.unwrap().unwrap().available_copies, 2);
    assert!(services.loans.open_loans(&member).await.unwrap().loan_ids.is_empty());

    let again = services.loans.return_loan(loan.id, now).await;
    assert!(matches!(again, Err(ReturnError::AlreadyReturned(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn test_row_locks_serialize_last_copy() {
    let pool = pool().await;
    let (store, services) = services(&pool);
    let title_id = insert_title(&pool, 1).await;

    let mut handles = Vec::new();
    for n in 0..4 {
        let member = unique(&format!("racer{}", n));
        insert_member(&pool, &member).await;
        let loans = services.loans.clone();
        handles.push(tokio::spawn(async move {
            let now = Utc::now();
            loans
                .issue(
                    IssueLoan {
                        title_id,
                        member_id: member,
                        due_date: now + Duration::days(7),
                    },
                    &librarian(),
                    now,
                )
                .await
        }));
    }

    let mut granted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => granted += 1,
            Err(IssueError::OutOfStock(id)) => assert_eq!(id, title_id),
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!(granted, 1);
    assert_eq!(store.get_title(title_id).await.unwrap().unwrap().available_copies, 0);
}
