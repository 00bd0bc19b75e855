use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::application::lending::{LendingError, LoanDetails, OverdueLoan};
use crate::domain::{
    BookCopy, CopyId, IdempotencyToken, Loan, LoanId, PaymentRecord, TitleId, UserId,
    commands::{Checkout, CheckoutTitle, PayFine, RegisterCopy},
};

/// 貸出リクエスト（POST /loans）
#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub borrower_id: Uuid,
    pub copy_id: Uuid,
}

impl CheckoutRequest {
    pub fn to_command(&self) -> Checkout {
        Checkout {
            borrower_id: UserId::from_uuid(self.borrower_id),
            copy_id: CopyId::from_uuid(self.copy_id),
        }
    }
}

/// タイトル指定の貸出リクエスト（POST /titles/:id/checkout）
#[derive(Debug, Deserialize)]
pub struct CheckoutTitleRequest {
    pub borrower_id: Uuid,
}

impl CheckoutTitleRequest {
    pub fn to_command(&self, title_id: Uuid) -> CheckoutTitle {
        CheckoutTitle {
            borrower_id: UserId::from_uuid(self.borrower_id),
            title_id: TitleId::from_uuid(title_id),
        }
    }
}

/// 延滞料支払リクエスト（POST /loans/:id/payments）
#[derive(Debug, Deserialize)]
pub struct PayFineRequest {
    pub amount: Decimal,
    pub idempotency_token: Option<String>,
}

impl PayFineRequest {
    /// 冪等キーが空・長すぎる場合は`InvalidIdempotencyToken`
    pub fn to_command(&self, loan_id: Uuid) -> Result<PayFine, LendingError> {
        let idempotency_token = self
            .idempotency_token
            .clone()
            .map(IdempotencyToken::parse)
            .transpose()
            .map_err(LendingError::InvalidIdempotencyToken)?;

        Ok(PayFine {
            loan_id: LoanId::from_uuid(loan_id),
            amount: self.amount,
            idempotency_token,
        })
    }
}

/// 蔵書登録リクエスト（POST /copies）
///
/// `copy_id`を省略するとサーバー側で採番する。
#[derive(Debug, Deserialize)]
pub struct RegisterCopyRequest {
    pub copy_id: Option<Uuid>,
    pub title_id: Uuid,
}

impl RegisterCopyRequest {
    pub fn to_command(&self, caller_id: UserId) -> RegisterCopy {
        RegisterCopy {
            caller_id,
            copy_id: self.copy_id.map(CopyId::from_uuid).unwrap_or_default(),
            title_id: TitleId::from_uuid(self.title_id),
        }
    }
}

/// 貸出レスポンス
#[derive(Debug, Serialize, Deserialize)]
pub struct LoanResponse {
    pub loan_id: Uuid,
    pub copy_id: Uuid,
    pub borrower_id: Uuid,
    pub checkout_time: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_time: Option<DateTime<Utc>>,
    pub fine: Decimal,
    pub fine_paid: bool,
    pub status: String,
    pub renewal_count: u8,
}

impl From<Loan> for LoanResponse {
    fn from(loan: Loan) -> Self {
        Self {
            loan_id: loan.loan_id.value(),
            copy_id: loan.copy_id.value(),
            borrower_id: loan.borrower_id.value(),
            checkout_time: loan.checkout_time,
            due_date: loan.due_date,
            return_time: loan.return_time,
            fine: loan.fine,
            fine_paid: loan.fine_paid,
            status: loan.status.as_str().to_string(),
            renewal_count: loan.renewal_count.value(),
        }
    }
}

/// 支払記録レスポンス
#[derive(Debug, Serialize, Deserialize)]
pub struct PaymentResponse {
    pub payment_id: Uuid,
    pub loan_id: Uuid,
    pub amount: Decimal,
    pub paid_at: DateTime<Utc>,
    pub paid_in_full: bool,
    pub idempotency_token: Option<String>,
}

impl From<PaymentRecord> for PaymentResponse {
    fn from(record: PaymentRecord) -> Self {
        Self {
            payment_id: record.payment_id.value(),
            loan_id: record.loan_id.value(),
            amount: record.amount,
            paid_at: record.paid_at,
            paid_in_full: record.paid_in_full,
            idempotency_token: record.idempotency_token.map(|t| t.as_str().to_string()),
        }
    }
}

/// 蔵書レスポンス
#[derive(Debug, Serialize, Deserialize)]
pub struct CopyResponse {
    pub copy_id: Uuid,
    pub title_id: Uuid,
    pub availability: String,
}

impl From<BookCopy> for CopyResponse {
    fn from(copy: BookCopy) -> Self {
        Self {
            copy_id: copy.copy_id.value(),
            title_id: copy.title_id.value(),
            availability: copy.availability.as_str().to_string(),
        }
    }
}

/// 貸出詳細レスポンス（GET /loans/:id、GET /borrowers/:id/fines）
#[derive(Debug, Serialize, Deserialize)]
pub struct LoanDetailsResponse {
    pub loan: LoanResponse,
    pub payments: Vec<PaymentResponse>,
    pub accrued_fine: Decimal,
    pub total_paid: Decimal,
    pub outstanding: Decimal,
    pub fine_paid: bool,
}

impl From<LoanDetails> for LoanDetailsResponse {
    fn from(details: LoanDetails) -> Self {
        Self {
            loan: details.loan.into(),
            payments: details.payments.into_iter().map(Into::into).collect(),
            accrued_fine: details.accrued_fine,
            total_paid: details.total_paid,
            outstanding: details.outstanding,
            fine_paid: details.fine_paid,
        }
    }
}

/// 延滞一覧の1行（GET /overdue）
#[derive(Debug, Serialize, Deserialize)]
pub struct OverdueLoanResponse {
    pub loan: LoanResponse,
    pub days_overdue: i64,
    pub accrued_fine: Decimal,
}

impl From<OverdueLoan> for OverdueLoanResponse {
    fn from(row: OverdueLoan) -> Self {
        Self {
            loan: row.loan.into(),
            days_overdue: row.days_overdue,
            accrued_fine: row.accrued_fine,
        }
    }
}

/// エラーレスポンス
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}
