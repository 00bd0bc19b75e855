use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{
    BookCopy, CheckoutError, CopyId, FinePolicy, LendingPolicy, LoanId, MarkLostError,
    RenewLoanError, RenewalCount, ReturnLoanError, UserId, fine,
};

/// 貸出ステータス
///
/// 状態遷移: Active → {Returned, Lost}。どちらも終端で、Activeには戻らない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    /// 貸出中
    Active,
    /// 返却済み
    Returned,
    /// 紛失
    Lost,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Active => "active",
            LoanStatus::Returned => "returned",
            LoanStatus::Lost => "lost",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, LoanStatus::Active)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

impl std::str::FromStr for LoanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(LoanStatus::Active),
            "returned" => Ok(LoanStatus::Returned),
            "lost" => Ok(LoanStatus::Lost),
            _ => Err(format!("Invalid loan status: {}", s)),
        }
    }
}

/// Loan集約 - 1冊の蔵書の1回の貸出
///
/// 作成後に削除されることはない（監査証跡）。`copy_id`は作成後不変。
/// `version`は同一貸出への並行更新を検出するための楽観ロック用カウンタ。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    pub loan_id: LoanId,
    pub copy_id: CopyId,
    pub borrower_id: UserId,

    pub checkout_time: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_time: Option<DateTime<Utc>>,

    /// 最後に計算した時点の延滞料
    pub fine: Decimal,
    /// `fine`に対して払い終えているか（最後に計算した時点の値）
    ///
    /// Activeな貸出はその後も延滞料が増えるため、現時点の判定には使わない。
    pub fine_paid: bool,

    pub status: LoanStatus,
    pub renewal_count: RenewalCount,
    pub version: u64,
}

impl Loan {
    /// 状態遷移後の新しいバージョン
    fn next(&self) -> Self {
        Self {
            version: self.version + 1,
            ..self.clone()
        }
    }
}

/// 純粋関数：蔵書を貸し出す
///
/// ビジネスルール：
/// - 蔵書がAvailableであること
/// - 返却期限 = 貸出時刻 + 貸出期間
/// - 状態はActive、延長回数は0
///
/// 副作用なし。蔵書状態の書き換えと貸出の登録は台帳ストアが一括で行う。
pub fn checkout(
    copy: &BookCopy,
    borrower_id: UserId,
    now: DateTime<Utc>,
    policy: &LendingPolicy,
) -> Result<Loan, CheckoutError> {
    if !copy.is_available() {
        return Err(CheckoutError::CopyUnavailable);
    }

    Ok(Loan {
        loan_id: LoanId::new(),
        copy_id: copy.copy_id,
        borrower_id,
        checkout_time: now,
        due_date: now + policy.loan_period,
        return_time: None,
        fine: Decimal::ZERO,
        fine_paid: false,
        status: LoanStatus::Active,
        renewal_count: RenewalCount::new(),
        version: 1,
    })
}

/// 純粋関数：蔵書を返却する
///
/// ビジネスルール：
/// - Activeのみ返却可能
/// - 返却時点で延滞料を確定する
/// - 既払額が確定額以上なら支払済みとする
pub fn return_loan(
    loan: &Loan,
    now: DateTime<Utc>,
    fine_policy: &FinePolicy,
    paid_so_far: Decimal,
) -> Result<Loan, ReturnLoanError> {
    match loan.status {
        LoanStatus::Returned => return Err(ReturnLoanError::AlreadyReturned),
        LoanStatus::Lost => return Err(ReturnLoanError::LoanLost),
        LoanStatus::Active => {}
    }

    let amount = fine::compute_fine(loan, fine_policy, now);

    Ok(Loan {
        return_time: Some(now),
        status: LoanStatus::Returned,
        fine: amount,
        fine_paid: fine::is_paid_in_full(amount, paid_so_far),
        ..loan.next()
    })
}

/// 純粋関数：貸出を延長する
///
/// ビジネスルール：
/// - Activeのみ延長可能
/// - 延滞中は延長不可（先に返却・支払が必要）
/// - 延長回数はポリシーの上限まで
/// - 延長時：現在の返却期限 + 貸出期間
pub fn renew_loan(
    loan: &Loan,
    now: DateTime<Utc>,
    lending_policy: &LendingPolicy,
    fine_policy: &FinePolicy,
) -> Result<Loan, RenewLoanError> {
    if loan.status.is_terminal() {
        return Err(RenewLoanError::NotActive(loan.status));
    }

    if is_overdue(loan, now, fine_policy) {
        return Err(RenewLoanError::LoanOverdue);
    }

    let renewal_count = loan.renewal_count.increment(lending_policy.max_renewals)?;

    Ok(Loan {
        due_date: loan.due_date + lending_policy.loan_period,
        renewal_count,
        ..loan.next()
    })
}

/// 純粋関数：紛失として処理する
///
/// 延滞料は日割り計算とは独立した弁償額で確定する。終端状態。
pub fn mark_lost(
    loan: &Loan,
    lending_policy: &LendingPolicy,
    paid_so_far: Decimal,
) -> Result<Loan, MarkLostError> {
    if loan.status.is_terminal() {
        return Err(MarkLostError::NotActive(loan.status));
    }

    let amount = lending_policy.lost_replacement_fee;

    Ok(Loan {
        status: LoanStatus::Lost,
        fine: amount,
        fine_paid: fine::is_paid_in_full(amount, paid_so_far),
        ..loan.next()
    })
}

/// 純粋関数：延滞判定
///
/// Activeかつ「返却期限 + 猶予期間」を過ぎていれば延滞。
pub fn is_overdue(loan: &Loan, now: DateTime<Utc>, fine_policy: &FinePolicy) -> bool {
    loan.status.is_active() && loan.due_date < overdue_cutoff(now, fine_policy)
}

/// 延滞とみなす返却期限の境界
///
/// `due_date < overdue_cutoff(now)`のActiveな貸出が延滞。
pub fn overdue_cutoff(now: DateTime<Utc>, fine_policy: &FinePolicy) -> DateTime<Utc> {
    now - fine_policy.grace_period
}

/// 返却期限 + 猶予期間からの経過日数（切り捨て、延滞でなければ0）
pub fn days_overdue(loan: &Loan, now: DateTime<Utc>, fine_policy: &FinePolicy) -> i64 {
    if !is_overdue(loan, now, fine_policy) {
        return 0;
    }
    (overdue_cutoff(now, fine_policy) - loan.due_date).num_days()
}
