use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{BookCopy, Loan, Role, TitleId, UserId};

/// 集計対象の範囲
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryScope {
    /// 自分の貸出のみ（会員）
    Borrower(UserId),
    /// 全利用者（司書・管理者）
    System,
}

impl SummaryScope {
    /// 認可サービスで確認した役割から範囲を決める
    pub fn for_role(role: Role, caller_id: UserId) -> Self {
        if role.is_staff() {
            SummaryScope::System
        } else {
            SummaryScope::Borrower(caller_id)
        }
    }

    pub fn includes(&self, loan: &Loan) -> bool {
        match self {
            SummaryScope::Borrower(borrower_id) => loan.borrower_id == *borrower_id,
            SummaryScope::System => true,
        }
    }
}

/// ダッシュボード用の集計値
///
/// 3つの値は同じスナップショットから数える。`overdue <= borrowed`は常に成り立つ。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LedgerSummary {
    /// 範囲内のActiveな貸出数
    pub borrowed: u64,
    /// 貸出可能な蔵書数（範囲によらず全体）
    pub available: u64,
    /// 範囲内の延滞中の貸出数
    pub overdue: u64,
}

/// タイトル単位の蔵書数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleAvailability {
    pub title_id: TitleId,
    pub total: u64,
    pub available: u64,
}

/// 純粋関数：1つのスナップショットから集計する
///
/// 延滞は`due_date < overdue_cutoff`のActiveな貸出。
/// 延滞はborrowedの部分集合として数えるため、overdueがborrowedを超えることはない。
pub fn tally<'a>(
    loans: impl IntoIterator<Item = &'a Loan>,
    copies: impl IntoIterator<Item = &'a BookCopy>,
    scope: SummaryScope,
    overdue_cutoff: DateTime<Utc>,
) -> LedgerSummary {
    let mut summary = LedgerSummary::default();

    for loan in loans
        .into_iter()
        .filter(|l| l.status.is_active() && scope.includes(l))
    {
        summary.borrowed += 1;
        if loan.due_date < overdue_cutoff {
            summary.overdue += 1;
        }
    }

    summary.available = copies.into_iter().filter(|c| c.is_available()).count() as u64;

    summary
}

/// 純粋関数：タイトルの蔵書数を数える
pub fn title_availability(title_id: TitleId, copies: &[BookCopy]) -> TitleAvailability {
    TitleAvailability {
        title_id,
        total: copies.len() as u64,
        available: copies.iter().filter(|c| c.is_available()).count() as u64,
    }
}
