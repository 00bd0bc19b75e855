use crate::domain::{Loan, UserId, fine, loan};
use rust_decimal::Decimal;
use serde::Serialize;

use super::access;
use super::errors::Result;
use super::lending_service::ServiceDependencies;

/// 延滞一覧の1行
#[derive(Debug, Clone, Serialize)]
pub struct OverdueLoan {
    pub loan: Loan,
    /// 返却期限 + 猶予期間からの経過日数（切り捨て）
    pub days_overdue: i64,
    /// 現時点の延滞料
    pub accrued_fine: Decimal,
}

/// 延滞一覧（司書・管理者のみ）
///
/// ビジネスルール：
/// - 返却期限 + 猶予期間を過ぎたActiveな貸出を延滞とする
/// - 返却済み・紛失は含めない
/// - 返却期限の古い順
///
/// ダッシュボードが画面側で延滞を数えていた処理の置き換え。
#[tracing::instrument(skip(deps))]
pub async fn overdue_report(deps: &ServiceDependencies, caller_id: UserId) -> Result<Vec<OverdueLoan>> {
    access::require_staff(deps, caller_id).await?;

    let now = deps.clock.now();
    let cutoff = loan::overdue_cutoff(now, &deps.fine_policy);

    let mut report: Vec<OverdueLoan> = deps
        .ledger_store
        .find_overdue_candidates(cutoff)
        .await?
        .into_iter()
        .filter(|l| loan::is_overdue(l, now, &deps.fine_policy))
        .map(|l| OverdueLoan {
            days_overdue: loan::days_overdue(&l, now, &deps.fine_policy),
            accrued_fine: fine::compute_fine(&l, &deps.fine_policy, now),
            loan: l,
        })
        .collect();

    report.sort_by_key(|r| r.loan.due_date);

    tracing::debug!(count = report.len(), "Overdue report built");

    Ok(report)
}
