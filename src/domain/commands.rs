use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{CopyId, IdempotencyToken, LoanId, Role, TitleId, UserId};

/// コマンド：蔵書を貸し出す
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkout {
    pub borrower_id: UserId,
    pub copy_id: CopyId,
}

/// コマンド：タイトルを指定して、空いている蔵書を貸し出す
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutTitle {
    pub borrower_id: UserId,
    pub title_id: TitleId,
}

/// コマンド：返却する
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnLoan {
    pub loan_id: LoanId,
}

/// コマンド：貸出を延長する
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenewLoan {
    pub loan_id: LoanId,
}

/// コマンド：紛失として処理する
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkLost {
    pub loan_id: LoanId,
}

/// コマンド：延滞料を支払う
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayFine {
    pub loan_id: LoanId,
    pub amount: Decimal,
    pub idempotency_token: Option<IdempotencyToken>,
}

/// コマンド：蔵書を登録する
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterCopy {
    pub caller_id: UserId,
    pub copy_id: CopyId,
    pub title_id: TitleId,
}

/// コマンド：蔵書を除籍する
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawCopy {
    pub caller_id: UserId,
    pub copy_id: CopyId,
}

/// クエリ：ダッシュボード集計
///
/// `claimed_role`は呼び出し側の申告値で、認可サービスの結果と照合する。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summarize {
    pub caller_id: UserId,
    pub claimed_role: Role,
}
