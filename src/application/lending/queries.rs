use crate::domain::{Loan, LoanId, PaymentRecord, UserId, fine};
use rust_decimal::Decimal;
use serde::Serialize;

use super::access;
use super::errors::Result;
use super::lending_service::{ServiceDependencies, load_loan, sum_payments};

/// 貸出の詳細（支払記録と現時点の残高つき）
///
/// `loan.fine_paid`は最後に延滞料を計算した時点の値。Activeな貸出では
/// その後も延滞料が増えるため、現時点の判定は`fine_paid`を見る。
#[derive(Debug, Clone, Serialize)]
pub struct LoanDetails {
    pub loan: Loan,
    pub payments: Vec<PaymentRecord>,
    /// 現時点の延滞料（Activeなら`now`まで、終端なら確定額）
    pub accrued_fine: Decimal,
    pub total_paid: Decimal,
    pub outstanding: Decimal,
    /// 現時点の延滞料を払い終えているか
    pub fine_paid: bool,
}

impl LoanDetails {
    fn build(deps: &ServiceDependencies, loan: Loan, payments: Vec<PaymentRecord>) -> Result<Self> {
        let accrued_fine = fine::compute_fine(&loan, &deps.fine_policy, deps.clock.now());
        let total_paid = sum_payments(&payments)?;
        Ok(Self {
            outstanding: fine::outstanding(accrued_fine, total_paid),
            fine_paid: fine::is_paid_in_full(accrued_fine, total_paid),
            loan,
            payments,
            accrued_fine,
            total_paid,
        })
    }

    /// 延滞料が発生していて、まだ払い終えていないか
    pub fn has_unpaid_fine(&self) -> bool {
        self.accrued_fine > Decimal::ZERO && !self.fine_paid
    }
}

/// 貸出の詳細を取得する（本人または司書・管理者）
#[tracing::instrument(skip(deps))]
pub async fn get_loan(deps: &ServiceDependencies, caller_id: UserId, loan_id: LoanId) -> Result<LoanDetails> {
    let loan = load_loan(&deps.ledger_store, loan_id).await?;
    access::require_self_or_staff(deps, caller_id, loan.borrower_id).await?;

    let payments = deps.ledger_store.find_payments(loan_id).await?;
    LoanDetails::build(deps, loan, payments)
}

/// 借り手の貸出一覧（貸出日の新しい順）
#[tracing::instrument(skip(deps))]
pub async fn list_loans(deps: &ServiceDependencies, caller_id: UserId, borrower_id: UserId) -> Result<Vec<Loan>> {
    access::require_self_or_staff(deps, caller_id, borrower_id).await?;

    let mut loans = deps.ledger_store.find_loans_by_borrower(borrower_id).await?;
    loans.sort_by(|a, b| b.checkout_time.cmp(&a.checkout_time));
    Ok(loans)
}

/// 未払いの延滞料がある貸出の一覧（支払画面用）
#[tracing::instrument(skip(deps))]
pub async fn unpaid_fines(
    deps: &ServiceDependencies,
    caller_id: UserId,
    borrower_id: UserId,
) -> Result<Vec<LoanDetails>> {
    let loans = list_loans(deps, caller_id, borrower_id).await?;

    let mut unpaid = Vec::new();
    for loan in loans {
        let payments = deps.ledger_store.find_payments(loan.loan_id).await?;
        let details = LoanDetails::build(deps, loan, payments)?;
        if details.has_unpaid_fine() {
            unpaid.push(details);
        }
    }

    Ok(unpaid)
}
