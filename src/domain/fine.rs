use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{FinePolicy, IdempotencyToken, Loan, LoanId, LoanStatus, PayFineError, PaymentId};

/// 延滞料の支払記録
///
/// 追記のみで更新しない。同じ冪等キーの再送はこの記録との照合で検出する。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub payment_id: PaymentId,
    pub loan_id: LoanId,
    pub amount: Decimal,
    pub paid_at: DateTime<Utc>,
    /// この支払の時点で累計支払額が延滞料以上になったか
    pub paid_in_full: bool,
    pub idempotency_token: Option<IdempotencyToken>,
}

/// 純粋関数：延滞料を計算する
///
/// 評価時刻はActiveなら`now`、返却済みなら返却時刻。紛失は確定済みの弁償額を返す。
///
/// 延滞日数 = (評価時刻 - (返却期限 + 猶予期間)) の日単位切り捨て、負にならない。
/// 金額 = min(上限, 延滞日数 × 日額)。
///
/// Activeな貸出に対して`now`を進めても金額が減ることはない。
pub fn compute_fine(loan: &Loan, policy: &FinePolicy, now: DateTime<Utc>) -> Decimal {
    let evaluated_at = match loan.status {
        LoanStatus::Lost => return loan.fine,
        LoanStatus::Returned => loan.return_time.unwrap_or(now),
        LoanStatus::Active => now,
    };

    let accrual_starts_at = loan.due_date + policy.grace_period;
    if evaluated_at <= accrual_starts_at {
        return Decimal::ZERO;
    }

    let overdue_days = (evaluated_at - accrual_starts_at).num_days().max(0);
    (Decimal::from(overdue_days) * policy.daily_rate).min(policy.max_fine)
}

/// 累計支払額
///
/// `Decimal`の範囲を超える場合は`None`。
pub fn total_paid(payments: &[PaymentRecord]) -> Option<Decimal> {
    payments
        .iter()
        .try_fold(Decimal::ZERO, |total, p| total.checked_add(p.amount))
}

/// 未払残高（負にならない）
pub fn outstanding(accrued: Decimal, paid: Decimal) -> Decimal {
    (accrued - paid).max(Decimal::ZERO)
}

/// 延滞料が発生しており、既払額がそれ以上か
pub fn is_paid_in_full(accrued: Decimal, paid: Decimal) -> bool {
    accrued > Decimal::ZERO && paid >= accrued
}

/// 同じ冪等キーでの再送を検出する
///
/// 同じキー・同じ金額なら既存の記録を返す（二重計上しない）。
/// 同じキーで金額が違う場合はキーの使い回しとして拒否する。
pub fn find_replayed_payment<'a>(
    payments: &'a [PaymentRecord],
    token: Option<&IdempotencyToken>,
    amount: Decimal,
) -> Result<Option<&'a PaymentRecord>, PayFineError> {
    let Some(token) = token else {
        return Ok(None);
    };

    match payments
        .iter()
        .find(|p| p.idempotency_token.as_ref() == Some(token))
    {
        Some(existing) if existing.amount == amount => Ok(Some(existing)),
        Some(_) => Err(PayFineError::IdempotencyTokenReused),
        None => Ok(None),
    }
}

/// 純粋関数：延滞料の支払を記録する
///
/// ビジネスルール：
/// - 支払額は正であること
/// - 評価時点で延滞料が発生していること
/// - 部分払いを受け付ける（残高以上の支払も拒否しない）
/// - 累計支払額が評価時点の延滞料以上になったら支払済み
///
/// 副作用なし。延滞料と支払済みフラグを更新した貸出と、追記する支払記録を返す。
pub fn pay_fine(
    loan: &Loan,
    prior_payments: &[PaymentRecord],
    amount: Decimal,
    idempotency_token: Option<IdempotencyToken>,
    policy: &FinePolicy,
    now: DateTime<Utc>,
) -> Result<(Loan, PaymentRecord), PayFineError> {
    if amount <= Decimal::ZERO {
        return Err(PayFineError::InvalidAmount);
    }

    let accrued = compute_fine(loan, policy, now);
    if accrued.is_zero() {
        return Err(PayFineError::NoFineDue);
    }

    // 累計が`Decimal`の範囲を超える支払は受け付けない
    let paid_after = total_paid(prior_payments)
        .and_then(|paid| paid.checked_add(amount))
        .ok_or(PayFineError::InvalidAmount)?;
    let paid_in_full = is_paid_in_full(accrued, paid_after);

    let updated_loan = Loan {
        fine: accrued,
        fine_paid: paid_in_full,
        version: loan.version + 1,
        ..loan.clone()
    };

    let record = PaymentRecord {
        payment_id: PaymentId::new(),
        loan_id: loan.loan_id,
        amount,
        paid_at: now,
        paid_in_full,
        idempotency_token,
    };

    Ok((updated_loan, record))
}
