use crate::domain::{IdempotencyTokenError, Loan};
use crate::ports::LedgerStoreError;
use rust_decimal::Decimal;
use thiserror::Error;

/// 貸出・延滞料台帳アプリケーション層のエラー
///
/// `StoreConflict`だけが一時的なエラーで、同じ引数での再実行が安全。
/// それ以外は呼び出し単位で確定しており、そのまま利用者に返す。
#[derive(Debug, Error)]
pub enum LendingError {
    /// 蔵書が存在しない
    #[error("Copy not found")]
    CopyNotFound,

    /// 蔵書が貸出可能状態ではない
    #[error("Copy is not available for loan")]
    CopyUnavailable,

    /// 同じIDの蔵書が既に登録されている
    #[error("Copy already exists")]
    CopyExists,

    /// 借り手が存在しない
    #[error("Borrower not found")]
    BorrowerNotFound,

    /// 未払い延滞料が上限を超えている
    #[error("Borrower is blocked by unpaid fines ({outstanding})")]
    BorrowerBlocked { outstanding: Decimal },

    /// 同時貸出数の上限に達している
    #[error("Loan limit exceeded (max {limit} active loans)")]
    LoanLimitExceeded { limit: usize },

    /// 貸出が見つからない
    #[error("Loan not found")]
    LoanNotFound,

    /// 既に返却済み。保存されている返却結果をそのまま返す
    #[error("Loan has already been returned")]
    AlreadyReturned(Box<Loan>),

    /// 貸出の状態が不正（例: 紛失済みの貸出の返却）
    #[error("Invalid loan state: {0}")]
    InvalidLoanState(String),

    /// 延滞中のため延長不可
    #[error("Loan is overdue and cannot be renewed")]
    LoanOverdue,

    /// 延長回数の上限を超えた
    #[error("Renewal limit exceeded")]
    RenewalLimitExceeded,

    /// 支払額が0以下
    #[error("Payment amount must be positive")]
    InvalidAmount,

    /// 冪等キーが空、または長すぎる
    #[error("Invalid idempotency token: {0}")]
    InvalidIdempotencyToken(IdempotencyTokenError),

    /// 発生している延滞料がない
    #[error("No fine is due for this loan")]
    NoFineDue,

    /// 同じ冪等キーで異なる金額が送られた
    #[error("Idempotency token was already used for a different payment")]
    IdempotencyTokenReused,

    /// 呼び出し元にこの操作・範囲の権限がない
    #[error("Operation not permitted for caller")]
    Forbidden,

    /// 条件付き書き込みが競合に負けた。操作全体を再実行すること
    #[error("Concurrent update conflict, retry the operation")]
    StoreConflict,

    /// 台帳ストアのエラー
    #[error("Ledger store error")]
    StoreError(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// カタログのエラー
    #[error("Catalog error")]
    CatalogError(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// 認可サービスのエラー
    #[error("Authorization service error")]
    AuthorizationError(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl LendingError {
    /// 同じ引数で再実行してよいか
    pub fn is_retryable(&self) -> bool {
        matches!(self, LendingError::StoreConflict)
    }
}

impl From<LedgerStoreError> for LendingError {
    fn from(err: LedgerStoreError) -> Self {
        match err {
            LedgerStoreError::CopyUnavailable => LendingError::CopyUnavailable,
            LedgerStoreError::CopyNotFound => LendingError::CopyNotFound,
            LedgerStoreError::CopyExists => LendingError::CopyExists,
            LedgerStoreError::Conflict | LedgerStoreError::DuplicatePayment(_) => {
                LendingError::StoreConflict
            }
            LedgerStoreError::Backend(e) => LendingError::StoreError(e),
        }
    }
}

/// アプリケーション層の Result型
pub type Result<T> = std::result::Result<T, LendingError>;
