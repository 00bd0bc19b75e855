use crate::domain::{Role, UserId};
use async_trait::async_trait;

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// 認可サービスポート
///
/// 認証そのものは扱わない。利用者IDから役割を引くだけの外部能力。
#[async_trait]
pub trait AuthorizationService: Send + Sync {
    /// 利用者の役割を返す。未登録なら`None`
    async fn check_role(&self, user_id: UserId) -> Result<Option<Role>>;
}
