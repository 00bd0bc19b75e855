use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// 貸出ID - 貸出台帳の集約ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoanId(Uuid);

impl LoanId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn value(&self) -> Uuid {
        self.0
    }
}

impl Default for LoanId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LoanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// 蔵書ID - 物理的な1冊（カタログが所有）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CopyId(Uuid);

impl CopyId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn value(&self) -> Uuid {
        self.0
    }
}

impl Default for CopyId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CopyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// タイトルID - カタログ上の書誌への参照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TitleId(Uuid);

impl TitleId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn value(&self) -> Uuid {
        self.0
    }
}

impl Default for TitleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TitleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// 利用者ID - 借り手（会員）と操作者（司書・管理者）の両方を指す
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn value(&self) -> Uuid {
        self.0
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// 支払ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentId(Uuid);

impl PaymentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn value(&self) -> Uuid {
        self.0
    }
}

impl Default for PaymentId {
    fn default() -> Self {
        Self::new()
    }
}

/// 冪等キーエラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdempotencyTokenError {
    /// 空、または空白のみ
    Empty,
    /// 最大文字数を超えた
    TooLong { max: usize },
}

impl fmt::Display for IdempotencyTokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdempotencyTokenError::Empty => f.write_str("idempotency token must not be empty"),
            IdempotencyTokenError::TooLong { max } => {
                write!(f, "idempotency token must be at most {} characters", max)
            }
        }
    }
}

impl std::error::Error for IdempotencyTokenError {}

/// 冪等キー
///
/// 利用者の1回の操作ごとに呼び出し側が発行する。同じキーでの再送は
/// 二重計上されない。`parse`を通したものだけが存在する。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IdempotencyToken(String);

impl IdempotencyToken {
    /// 最大文字数（fine_payments.idempotency_tokenの列幅と同じ）
    pub const MAX_LEN: usize = 255;

    /// 空白のみのキーと、`MAX_LEN`文字を超えるキーは拒否する
    pub fn parse(token: impl Into<String>) -> Result<Self, IdempotencyTokenError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(IdempotencyTokenError::Empty);
        }
        if token.chars().count() > Self::MAX_LEN {
            return Err(IdempotencyTokenError::TooLong { max: Self::MAX_LEN });
        }
        Ok(Self(token))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for IdempotencyToken {
    type Error = IdempotencyTokenError;

    fn try_from(token: String) -> Result<Self, Self::Error> {
        Self::parse(token)
    }
}

impl From<IdempotencyToken> for String {
    fn from(token: IdempotencyToken) -> Self {
        token.0
    }
}

impl fmt::Display for IdempotencyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 利用者の役割
///
/// 認可サービスが返す値。呼び出し側の自己申告は信用しない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Member,
    Librarian,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Librarian => "librarian",
            Role::Admin => "admin",
        }
    }

    /// 全利用者の台帳を参照できるか
    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Librarian | Role::Admin)
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "member" => Ok(Role::Member),
            "librarian" => Ok(Role::Librarian),
            "admin" => Ok(Role::Admin),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

/// 延長回数エラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenewalError {
    /// 延長回数の上限を超えた
    LimitExceeded,
}

/// 延長回数
///
/// 上限は貸出ポリシーで決まるため、増やす時点で上限を受け取る。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RenewalCount(u8);

impl RenewalCount {
    /// 新規作成（0回）
    pub fn new() -> Self {
        Self(0)
    }

    /// 永続化された値から復元する
    pub fn from_value(value: u8) -> Self {
        Self(value)
    }

    /// 延長回数を増やす
    ///
    /// # エラー
    /// 既に`limit`回延長済みの場合は`RenewalError::LimitExceeded`を返す
    pub fn increment(self, limit: u8) -> Result<Self, RenewalError> {
        if !self.can_renew(limit) {
            return Err(RenewalError::LimitExceeded);
        }
        Ok(Self(self.0 + 1))
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    pub fn can_renew(&self, limit: u8) -> bool {
        self.0 < limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idempotency_token_rejects_blank() {
        assert_eq!(IdempotencyToken::parse(""), Err(IdempotencyTokenError::Empty));
        assert_eq!(IdempotencyToken::parse("   "), Err(IdempotencyTokenError::Empty));
    }

    #[test]
    fn test_idempotency_token_length_limit() {
        let longest = "a".repeat(IdempotencyToken::MAX_LEN);
        assert_eq!(IdempotencyToken::parse(longest.clone()).unwrap().as_str(), longest);

        let too_long = "a".repeat(IdempotencyToken::MAX_LEN + 1);
        assert_eq!(
            IdempotencyToken::parse(too_long),
            Err(IdempotencyTokenError::TooLong { max: 255 })
        );
    }

    #[test]
    fn test_idempotency_token_length_counts_characters() {
        // PostgreSQLのVARCHAR(n)はバイト数ではなく文字数で数える
        let multibyte = "鍵".repeat(IdempotencyToken::MAX_LEN);
        assert!(IdempotencyToken::parse(multibyte).is_ok());
    }

    #[test]
    fn test_renewal_count_new() {
        let count = RenewalCount::new();
        assert_eq!(count.value(), 0);
        assert!(count.can_renew(1));
    }

    #[test]
    fn test_renewal_count_increment_until_limit() {
        let count = RenewalCount::new().increment(2).unwrap();
        assert_eq!(count.value(), 1);
        let count = count.increment(2).unwrap();
        assert_eq!(count.value(), 2);
        assert_eq!(count.increment(2), Err(RenewalError::LimitExceeded));
    }

    #[test]
    fn test_renewal_count_zero_limit_never_renews() {
        let count = RenewalCount::new();
        assert!(!count.can_renew(0));
        assert_eq!(count.increment(0), Err(RenewalError::LimitExceeded));
    }

    #[test]
    fn test_loan_id_creation() {
        let id1 = LoanId::new();
        let id2 = LoanId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_copy_id_from_uuid() {
        let uuid = Uuid::new_v4();
        let id = CopyId::from_uuid(uuid);
        assert_eq!(id.value(), uuid);
    }

    #[test]
    fn test_role_parse_and_scope() {
        assert_eq!("admin".parse::<Role>(), Ok(Role::Admin));
        assert_eq!("librarian".parse::<Role>(), Ok(Role::Librarian));
        assert_eq!("member".parse::<Role>(), Ok(Role::Member));
        assert!("guest".parse::<Role>().is_err());

        assert!(Role::Admin.is_staff());
        assert!(Role::Librarian.is_staff());
        assert!(!Role::Member.is_staff());
    }
}
