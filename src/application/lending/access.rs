use crate::domain::{Role, UserId};

use super::errors::{LendingError, Result};
use super::lending_service::ServiceDependencies;

/// 認可サービスで役割を確認する。未登録の利用者は`None`
pub(super) async fn verified_role(deps: &ServiceDependencies, user_id: UserId) -> Result<Option<Role>> {
    deps.authorization
        .check_role(user_id)
        .await
        .map_err(LendingError::AuthorizationError)
}

/// 司書・管理者のみ許可する
pub(super) async fn require_staff(deps: &ServiceDependencies, caller_id: UserId) -> Result<Role> {
    match verified_role(deps, caller_id).await? {
        Some(role) if role.is_staff() => Ok(role),
        _ => {
            tracing::warn!(%caller_id, "Staff-only operation refused");
            Err(LendingError::Forbidden)
        }
    }
}

/// 本人または司書・管理者のみ許可する
pub(super) async fn require_self_or_staff(
    deps: &ServiceDependencies,
    caller_id: UserId,
    borrower_id: UserId,
) -> Result<()> {
    match verified_role(deps, caller_id).await? {
        Some(role) if role.is_staff() => Ok(()),
        Some(_) if caller_id == borrower_id => Ok(()),
        _ => {
            tracing::warn!(%caller_id, %borrower_id, "Access to another borrower's loans refused");
            Err(LendingError::Forbidden)
        }
    }
}
