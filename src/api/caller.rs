use crate::domain::{Role, UserId};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use std::str::FromStr;
use uuid::Uuid;

use super::error::ApiError;

pub const CALLER_ID_HEADER: &str = "x-caller-id";
pub const CALLER_ROLE_HEADER: &str = "x-caller-role";

/// 呼び出し元
///
/// 認証は前段のゲートウェイで済んでいる前提で、利用者IDと申告された役割を
/// ヘッダーから読む。役割は申告にすぎず、必要な操作では認可サービスで確認し直す。
#[derive(Debug, Clone, Copy)]
pub struct Caller {
    pub caller_id: UserId,
    pub claimed_role: Option<Role>,
}

impl Caller {
    /// 役割の申告を必須にする
    pub fn require_role(&self) -> Result<Role, ApiError> {
        self.claimed_role
            .ok_or(ApiError::Unauthenticated("Missing x-caller-role header"))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let caller_id = parts
            .headers
            .get(CALLER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v).ok())
            .map(UserId::from_uuid)
            .ok_or(ApiError::Unauthenticated("Missing or invalid x-caller-id header"))?;

        let claimed_role = match parts.headers.get(CALLER_ROLE_HEADER) {
            None => None,
            Some(value) => Some(
                value
                    .to_str()
                    .ok()
                    .and_then(|v| Role::from_str(v).ok())
                    .ok_or(ApiError::Unauthenticated("Invalid x-caller-role header"))?,
            ),
        };

        Ok(Caller {
            caller_id,
            claimed_role,
        })
    }
}
