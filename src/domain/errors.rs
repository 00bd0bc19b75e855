use super::RenewalError;
use super::loan::LoanStatus;

/// 貸出のエラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutError {
    /// 蔵書が貸出可能状態ではない
    CopyUnavailable,
}

/// 返却のエラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnLoanError {
    /// 既に返却済み
    AlreadyReturned,
    /// 紛失処理済みのため返却できない
    LoanLost,
}

/// 延長のエラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenewLoanError {
    /// 貸出中ではない（返却済み・紛失）
    NotActive(LoanStatus),
    /// 延滞中のため延長不可
    LoanOverdue,
    /// 延長回数の上限を超えた
    RenewalLimitExceeded,
}

impl From<RenewalError> for RenewLoanError {
    fn from(err: RenewalError) -> Self {
        match err {
            RenewalError::LimitExceeded => RenewLoanError::RenewalLimitExceeded,
        }
    }
}

/// 紛失処理のエラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkLostError {
    /// 貸出中ではない（返却済み・紛失）
    NotActive(LoanStatus),
}

/// 延滞料支払のエラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayFineError {
    /// 支払額が0以下
    InvalidAmount,
    /// 発生している延滞料がない
    NoFineDue,
    /// 同じ冪等キーで異なる金額が送られた
    IdempotencyTokenReused,
}
