use crate::domain::{
    self, Availability, BookCopy, FinePolicy, LendingPolicy, Loan, LoanId, LoanStatus,
    MarkLostError, PaymentRecord, RenewLoanError, ReturnLoanError, UserId, commands::*, fine,
};
use crate::ports::*;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;

use super::access;
use super::errors::{LendingError, Result};

/// サービスの依存関係
///
/// 関数型DDDの原則に従い、データ構造として定義。
/// 振る舞いは持たず、各操作の関数に依存関係を渡す。
/// ポリシーは設定から与えられる不変の値。
#[derive(Clone)]
pub struct ServiceDependencies {
    pub ledger_store: Arc<dyn LedgerStore>,
    pub catalog: Arc<dyn Catalog>,
    pub authorization: Arc<dyn AuthorizationService>,
    pub clock: Arc<dyn Clock>,
    pub lending_policy: LendingPolicy,
    pub fine_policy: FinePolicy,
}

/// 台帳から貸出を読み込むヘルパー関数
///
/// 返却・延長・紛失・支払で共通利用される。
pub(super) async fn load_loan(store: &Arc<dyn LedgerStore>, loan_id: LoanId) -> Result<Loan> {
    store
        .get_loan(loan_id)
        .await?
        .ok_or(LendingError::LoanNotFound)
}

/// 支払記録の合計
///
/// 支払時に累計の範囲を確認しているため、保存済みの記録が溢れることはない。
pub(super) fn sum_payments(payments: &[PaymentRecord]) -> Result<Decimal> {
    fine::total_paid(payments)
        .ok_or_else(|| LendingError::InvalidLoanState("payment total out of range".to_string()))
}

/// 貸出に対する累計支払額
pub(super) async fn paid_so_far(store: &Arc<dyn LedgerStore>, loan_id: LoanId) -> Result<Decimal> {
    let payments = store.find_payments(loan_id).await?;
    sum_payments(&payments)
}

/// 借り手の未払い延滞料の合計（`now`時点）
///
/// Activeな貸出は`now`までの発生額、終端の貸出は確定額で数える。
pub(super) async fn outstanding_for_borrower(
    deps: &ServiceDependencies,
    loans: &[Loan],
    now: DateTime<Utc>,
) -> Result<Decimal> {
    let mut total = Decimal::ZERO;

    for loan in loans {
        let accrued = fine::compute_fine(loan, &deps.fine_policy, now);
        if accrued.is_zero() {
            continue;
        }
        let paid = paid_so_far(&deps.ledger_store, loan.loan_id).await?;
        total = total.saturating_add(fine::outstanding(accrued, paid));
    }

    Ok(total)
}

/// 借り手が新たに借りられるか確認する
///
/// ビジネスルール：
/// - 借り手が存在すること
/// - 同時貸出数が上限未満であること
/// - 未払い延滞料がしきい値を超えていないこと（しきい値が設定されている場合）
async fn ensure_borrower_may_borrow(
    deps: &ServiceDependencies,
    borrower_id: UserId,
    now: DateTime<Utc>,
) -> Result<()> {
    if access::verified_role(deps, borrower_id).await?.is_none() {
        return Err(LendingError::BorrowerNotFound);
    }

    let loans = deps.ledger_store.find_loans_by_borrower(borrower_id).await?;

    let active = loans.iter().filter(|l| l.status.is_active()).count();
    if active >= deps.lending_policy.max_active_loans {
        return Err(LendingError::LoanLimitExceeded {
            limit: deps.lending_policy.max_active_loans,
        });
    }

    if let Some(threshold) = deps.lending_policy.blocking_fine_threshold {
        let outstanding = outstanding_for_borrower(deps, &loans, now).await?;
        if outstanding > threshold {
            tracing::warn!(%borrower_id, %outstanding, %threshold, "Borrower blocked by unpaid fines");
            return Err(LendingError::BorrowerBlocked { outstanding });
        }
    }

    Ok(())
}

/// 1冊の蔵書について貸出を成立させる
///
/// 台帳ストアの条件付き書き込みが最終判定。同じ蔵書への並行した貸出は
/// 1件だけが成立し、残りは`CopyUnavailable`になる。
async fn lend_copy(
    deps: &ServiceDependencies,
    copy: &BookCopy,
    borrower_id: UserId,
    now: DateTime<Utc>,
) -> Result<Loan> {
    let loan = domain::loan::checkout(copy, borrower_id, now, &deps.lending_policy)
        .map_err(|_| LendingError::CopyUnavailable)?;

    deps.ledger_store.insert_checkout(&loan).await?;

    tracing::info!(
        loan_id = %loan.loan_id,
        copy_id = %loan.copy_id,
        %borrower_id,
        due_date = %loan.due_date,
        "Copy checked out"
    );

    Ok(loan)
}

/// 蔵書を貸し出す
///
/// ビジネスルール：
/// - 蔵書が存在し、Availableであること
/// - 借り手が借りられる状態であること（`ensure_borrower_may_borrow`）
///
/// 蔵書のOnLoanへの書き換えと貸出の登録は1つの不可分な操作。
/// 失敗時は何も書き込まれない。
#[tracing::instrument(skip(deps))]
pub async fn checkout(deps: &ServiceDependencies, cmd: Checkout) -> Result<Loan> {
    let now = deps.clock.now();

    let copy = deps
        .catalog
        .get_copy(cmd.copy_id)
        .await
        .map_err(LendingError::CatalogError)?
        .ok_or(LendingError::CopyNotFound)?;

    if !copy.is_available() {
        return Err(LendingError::CopyUnavailable);
    }

    ensure_borrower_may_borrow(deps, cmd.borrower_id, now).await?;

    lend_copy(deps, &copy, cmd.borrower_id, now).await
}

/// タイトルを指定して貸し出す
///
/// タイトルの蔵書をID順に試し、最初に成立した貸出を返す。
/// 並行する貸出に先を越された蔵書は飛ばす。
#[tracing::instrument(skip(deps))]
pub async fn checkout_title(deps: &ServiceDependencies, cmd: CheckoutTitle) -> Result<Loan> {
    let now = deps.clock.now();

    let mut copies = deps
        .catalog
        .copies_of_title(cmd.title_id)
        .await
        .map_err(LendingError::CatalogError)?;

    if copies.is_empty() {
        return Err(LendingError::CopyNotFound);
    }
    copies.sort_by_key(|c| c.copy_id);

    ensure_borrower_may_borrow(deps, cmd.borrower_id, now).await?;

    for copy in copies.iter().filter(|c| c.is_available()) {
        match lend_copy(deps, copy, cmd.borrower_id, now).await {
            Ok(loan) => return Ok(loan),
            Err(LendingError::CopyUnavailable) => {
                tracing::debug!(copy_id = %copy.copy_id, "Copy taken concurrently, trying next");
            }
            Err(e) => return Err(e),
        }
    }

    Err(LendingError::CopyUnavailable)
}

/// 返却する
///
/// ビジネスルール：
/// - 貸出が存在し、Activeであること
/// - 返却時点で延滞料を確定する
/// - 蔵書をAvailableに戻す（貸出の更新と同じ操作で）
///
/// # 冪等性
///
/// 返却済みの貸出に対しては何も書き込まず、保存済みの返却結果を
/// `AlreadyReturned`で返す。同じ貸出への並行した返却は1件だけが成立する。
#[tracing::instrument(skip(deps))]
pub async fn return_loan(deps: &ServiceDependencies, cmd: ReturnLoan) -> Result<Loan> {
    let now = deps.clock.now();
    let loan = load_loan(&deps.ledger_store, cmd.loan_id).await?;

    if loan.status == LoanStatus::Returned {
        return Err(LendingError::AlreadyReturned(Box::new(loan)));
    }

    let paid = paid_so_far(&deps.ledger_store, loan.loan_id).await?;

    let returned = domain::loan::return_loan(&loan, now, &deps.fine_policy, paid).map_err(|e| match e {
        ReturnLoanError::AlreadyReturned => LendingError::AlreadyReturned(Box::new(loan.clone())),
        ReturnLoanError::LoanLost => {
            LendingError::InvalidLoanState("Cannot return a lost loan".to_string())
        }
    })?;

    match deps
        .ledger_store
        .update_loan(&returned, loan.version, Some(Availability::Available))
        .await
    {
        Ok(()) => {}
        Err(LedgerStoreError::Conflict) => {
            // 並行した返却が先に成立していれば、その結果を返す
            let current = load_loan(&deps.ledger_store, cmd.loan_id).await?;
            if current.status == LoanStatus::Returned {
                return Err(LendingError::AlreadyReturned(Box::new(current)));
            }
            tracing::warn!(loan_id = %cmd.loan_id, "Return lost a concurrent update");
            return Err(LendingError::StoreConflict);
        }
        Err(e) => return Err(e.into()),
    }

    tracing::info!(
        loan_id = %returned.loan_id,
        copy_id = %returned.copy_id,
        fine = %returned.fine,
        "Loan returned"
    );

    Ok(returned)
}

/// 貸出を延長する
///
/// ビジネスルール：
/// - 貸出がActiveであること
/// - 延滞中でないこと（先に返却・支払が必要）
/// - 延長回数が上限未満であること
#[tracing::instrument(skip(deps))]
pub async fn renew_loan(deps: &ServiceDependencies, cmd: RenewLoan) -> Result<Loan> {
    let now = deps.clock.now();
    let loan = load_loan(&deps.ledger_store, cmd.loan_id).await?;

    let renewed = domain::loan::renew_loan(&loan, now, &deps.lending_policy, &deps.fine_policy)
        .map_err(|e| match e {
            RenewLoanError::NotActive(status) => LendingError::InvalidLoanState(format!(
                "Cannot renew {} loan",
                status.as_str()
            )),
            RenewLoanError::LoanOverdue => LendingError::LoanOverdue,
            RenewLoanError::RenewalLimitExceeded => LendingError::RenewalLimitExceeded,
        })?;

    deps.ledger_store
        .update_loan(&renewed, loan.version, None)
        .await?;

    tracing::info!(
        loan_id = %renewed.loan_id,
        due_date = %renewed.due_date,
        renewals = renewed.renewal_count.value(),
        "Loan renewed"
    );

    Ok(renewed)
}

/// 紛失として処理する
///
/// ビジネスルール：
/// - 貸出がActiveであること
/// - 延滞料は弁償額で確定し、蔵書はLostになる
/// - 終端状態。以後の状態遷移はない
#[tracing::instrument(skip(deps))]
pub async fn mark_lost(deps: &ServiceDependencies, cmd: MarkLost) -> Result<Loan> {
    let loan = load_loan(&deps.ledger_store, cmd.loan_id).await?;
    let paid = paid_so_far(&deps.ledger_store, loan.loan_id).await?;

    let lost = domain::loan::mark_lost(&loan, &deps.lending_policy, paid).map_err(|e| match e {
        MarkLostError::NotActive(LoanStatus::Returned) => {
            LendingError::AlreadyReturned(Box::new(loan.clone()))
        }
        MarkLostError::NotActive(status) => LendingError::InvalidLoanState(format!(
            "Cannot mark {} loan as lost",
            status.as_str()
        )),
    })?;

    deps.ledger_store
        .update_loan(&lost, loan.version, Some(Availability::Lost))
        .await?;

    tracing::info!(
        loan_id = %lost.loan_id,
        copy_id = %lost.copy_id,
        fine = %lost.fine,
        "Loan marked as lost"
    );

    Ok(lost)
}
