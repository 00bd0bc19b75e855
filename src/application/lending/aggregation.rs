use crate::domain::{LedgerSummary, SummaryScope, commands::Summarize, loan};

use super::access;
use super::errors::{LendingError, Result};
use super::lending_service::ServiceDependencies;

/// ダッシュボード用の集計
///
/// 範囲は呼び出し側の申告ではなく、認可サービスで確認した役割で決める。
/// 申告と確認結果が食い違う場合は拒否する。
///
/// - 会員：自分の貸出のみ
/// - 司書・管理者：全体
///
/// borrowed / available / overdue は台帳ストアの1つのスナップショットから数える。
#[tracing::instrument(skip(deps))]
pub async fn summarize(deps: &ServiceDependencies, cmd: Summarize) -> Result<LedgerSummary> {
    let role = access::verified_role(deps, cmd.caller_id)
        .await?
        .ok_or(LendingError::Forbidden)?;

    if role != cmd.claimed_role {
        tracing::warn!(
            caller_id = %cmd.caller_id,
            claimed = cmd.claimed_role.as_str(),
            verified = role.as_str(),
            "Claimed role does not match verified role"
        );
        return Err(LendingError::Forbidden);
    }

    let scope = SummaryScope::for_role(role, cmd.caller_id);
    let cutoff = loan::overdue_cutoff(deps.clock.now(), &deps.fine_policy);

    let summary = deps.ledger_store.summarize(scope, cutoff).await?;
    debug_assert!(summary.overdue <= summary.borrowed);

    Ok(summary)
}
