//! PostgreSQLの台帳ストアのテスト
//!
//! DATABASE_URLのデータベースが必要なため既定では実行しない。
//! `cargo test -- --ignored`で実行する。

mod common;

use chrono::{DateTime, Utc};
use library_lending_ledger::adapters::postgres::PostgresLedgerStore;
use library_lending_ledger::domain::{
    Availability, BookCopy, CopyId, FinePolicy, IdempotencyToken, LendingPolicy, Loan,
    LoanStatus, SummaryScope, TitleId, UserId, fine, loan,
};
use library_lending_ledger::ports::{Catalog, LedgerStore, LedgerStoreError};
use rust_decimal::Decimal;
use serial_test::serial;
use sqlx::PgPool;
use std::sync::Arc;

/// PostgreSQLの時刻精度（マイクロ秒）に合わせて丸める
///
/// PostgreSQL TIMESTAMPTZはマイクロ秒精度（6桁）だが、
/// RustのDateTime<Utc>はナノ秒精度（9桁）を持つ。
fn truncate_to_micros(dt: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(dt.timestamp_micros()).expect("Invalid timestamp")
}

/// 各テストの前にすべてのデータを削除する
async fn setup_store() -> (PgPool, PostgresLedgerStore) {
    let pool = common::create_test_pool().await;

    sqlx::query("TRUNCATE TABLE fine_payments, loans, copies CASCADE")
        .execute(&pool)
        .await
        .expect("Failed to truncate ledger tables");

    let store = PostgresLedgerStore::new(pool.clone());
    (pool, store)
}

async fn insert_copy(store: &PostgresLedgerStore) -> BookCopy {
    let copy = BookCopy::new(CopyId::new(), TitleId::new());
    store.insert_copy(&copy).await.unwrap();
    copy
}

fn new_loan(copy: &BookCopy) -> Loan {
    let mut loan = loan::checkout(
        copy,
        UserId::new(),
        truncate_to_micros(Utc::now()),
        &LendingPolicy::default(),
    )
    .unwrap();
    loan.due_date = truncate_to_micros(loan.due_date);
    loan
}

#[tokio::test]
#[serial]
#[ignore]
async fn test_checkout_round_trip() {
    let (_pool, store) = setup_store().await;
    let copy = insert_copy(&store).await;
    let loan = new_loan(&copy);

    store.insert_checkout(&loan).await.unwrap();

    assert_eq!(store.get_loan(loan.loan_id).await.unwrap(), Some(loan));
    let stored_copy = store.get_copy(copy.copy_id).await.unwrap().unwrap();
    assert_eq!(stored_copy.availability, Availability::OnLoan);
}

#[tokio::test]
#[serial]
#[ignore]
async fn test_duplicate_copy_is_rejected() {
    let (_pool, store) = setup_store().await;
    let copy = insert_copy(&store).await;

    let result = store.insert_copy(&copy).await;

    assert!(matches!(result, Err(LedgerStoreError::CopyExists)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
#[serial]
#[ignore]
async fn test_concurrent_checkouts_have_one_winner() {
    const CALLERS: usize = 16;
    let (_pool, store) = setup_store().await;
    let store = Arc::new(store);
    let copy = insert_copy(&store).await;

    let mut handles = Vec::with_capacity(CALLERS);
    for _ in 0..CALLERS {
        let store = store.clone();
        let loan = new_loan(&copy);
        handles.push(tokio::spawn(async move { store.insert_checkout(&loan).await }));
    }

    let mut successes = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => successes += 1,
            Err(LedgerStoreError::CopyUnavailable) => {}
            Err(e) => panic!("unexpected error: {:?}", e),
        }
    }

    assert_eq!(successes, 1);
    let summary = store
        .summarize(SummaryScope::System, Utc::now())
        .await
        .unwrap();
    assert_eq!(summary.borrowed, 1);
}

#[tokio::test]
#[serial]
#[ignore]
async fn test_update_loan_with_stale_version_conflicts() {
    let (_pool, store) = setup_store().await;
    let copy = insert_copy(&store).await;
    let active = new_loan(&copy);
    store.insert_checkout(&active).await.unwrap();

    let now = truncate_to_micros(Utc::now());
    let returned = loan::return_loan(&active, now, &FinePolicy::default(), Decimal::ZERO).unwrap();
    store
        .update_loan(&returned, active.version, Some(Availability::Available))
        .await
        .unwrap();

    let result = store
        .update_loan(&returned, active.version, Some(Availability::Available))
        .await;

    assert!(matches!(result, Err(LedgerStoreError::Conflict)));
    let stored = store.get_loan(active.loan_id).await.unwrap().unwrap();
    assert_eq!(stored.status, LoanStatus::Returned);
    assert_eq!(stored.version, returned.version);
}

#[tokio::test]
#[serial]
#[ignore]
async fn test_record_payment_detects_duplicate_token() {
    let (_pool, store) = setup_store().await;
    let copy = insert_copy(&store).await;
    let mut active = new_loan(&copy);
    // 返却期限を過去にして延滞料を発生させる
    active.checkout_time -= chrono::Duration::days(30);
    active.due_date -= chrono::Duration::days(30);
    store.insert_checkout(&active).await.unwrap();

    let now = truncate_to_micros(Utc::now());
    let token = IdempotencyToken::parse("pg-token").unwrap();
    let (paid, record) = fine::pay_fine(
        &active,
        &[],
        Decimal::from(10),
        Some(token.clone()),
        &FinePolicy::default(),
        now,
    )
    .unwrap();
    store
        .record_payment(&record, &paid, active.version)
        .await
        .unwrap();

    let (retry_loan, retry) = fine::pay_fine(
        &active,
        &[],
        Decimal::from(10),
        Some(token),
        &FinePolicy::default(),
        now,
    )
    .unwrap();
    let result = store
        .record_payment(&retry, &retry_loan, active.version)
        .await;

    match result {
        Err(LedgerStoreError::DuplicatePayment(existing)) => {
            assert_eq!(existing.payment_id, record.payment_id)
        }
        other => panic!("expected DuplicatePayment, got {:?}", other),
    }
    assert_eq!(store.find_payments(active.loan_id).await.unwrap().len(), 1);
}

#[tokio::test]
#[serial]
#[ignore]
async fn test_summarize_scopes_by_borrower() {
    let (_pool, store) = setup_store().await;
    let first = insert_copy(&store).await;
    let second = insert_copy(&store).await;
    insert_copy(&store).await;

    let mine = new_loan(&first);
    let theirs = new_loan(&second);
    store.insert_checkout(&mine).await.unwrap();
    store.insert_checkout(&theirs).await.unwrap();

    // 両方の返却期限より後を基準にすると、両方とも延滞
    let cutoff = mine.due_date.max(theirs.due_date) + chrono::Duration::days(1);

    let scoped = store
        .summarize(SummaryScope::Borrower(mine.borrower_id), cutoff)
        .await
        .unwrap();
    let system = store.summarize(SummaryScope::System, cutoff).await.unwrap();

    assert_eq!((scoped.borrowed, scoped.overdue, scoped.available), (1, 1, 1));
    assert_eq!((system.borrowed, system.overdue, system.available), (2, 2, 1));
}

#[tokio::test]
#[serial]
#[ignore]
async fn test_copies_of_title_are_ordered_by_id() {
    let (_pool, store) = setup_store().await;
    let title_id = TitleId::new();
    for _ in 0..4 {
        store
            .insert_copy(&BookCopy::new(CopyId::new(), title_id))
            .await
            .unwrap();
    }

    let copies = store.copies_of_title(title_id).await.unwrap();

    assert_eq!(copies.len(), 4);
    assert!(copies.windows(2).all(|w| w[0].copy_id < w[1].copy_id));
}
