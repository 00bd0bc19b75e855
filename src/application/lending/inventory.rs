use crate::domain::{
    Availability, BookCopy, TitleAvailability, TitleId,
    commands::{RegisterCopy, WithdrawCopy},
    summary,
};

use super::access;
use super::errors::{LendingError, Result};
use super::lending_service::ServiceDependencies;

/// 蔵書を登録する（司書・管理者のみ）
///
/// 登録直後の状態はAvailable。
#[tracing::instrument(skip(deps))]
pub async fn register_copy(deps: &ServiceDependencies, cmd: RegisterCopy) -> Result<BookCopy> {
    access::require_staff(deps, cmd.caller_id).await?;

    let copy = BookCopy::new(cmd.copy_id, cmd.title_id);
    deps.ledger_store.insert_copy(&copy).await?;

    tracing::info!(copy_id = %copy.copy_id, title_id = %copy.title_id, "Copy registered");
    Ok(copy)
}

/// 蔵書を除籍する（司書・管理者のみ）
///
/// Availableの蔵書だけが対象。貸出中・紛失・除籍済みなら`CopyUnavailable`。
#[tracing::instrument(skip(deps))]
pub async fn withdraw_copy(deps: &ServiceDependencies, cmd: WithdrawCopy) -> Result<()> {
    access::require_staff(deps, cmd.caller_id).await?;

    deps.ledger_store
        .transition_copy(cmd.copy_id, Availability::Available, Availability::Withdrawn)
        .await?;

    tracing::info!(copy_id = %cmd.copy_id, "Copy withdrawn");
    Ok(())
}

/// タイトルの蔵書数と貸出可能数
#[tracing::instrument(skip(deps))]
pub async fn title_availability(deps: &ServiceDependencies, title_id: TitleId) -> Result<TitleAvailability> {
    let copies = deps
        .catalog
        .copies_of_title(title_id)
        .await
        .map_err(LendingError::CatalogError)?;

    Ok(summary::title_availability(title_id, &copies))
}
