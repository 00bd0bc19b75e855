use crate::application::lending::LendingError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use super::types::ErrorResponse;

/// API層のエラー型
///
/// アプリケーション層のエラーと、呼び出し元の識別に失敗した場合を表し、
/// HTTPレスポンスへのマッピングを提供する。
#[derive(Debug)]
pub enum ApiError {
    Lending(LendingError),
    /// 呼び出し元ヘッダーがない、または読めない
    Unauthenticated(&'static str),
}

impl From<LendingError> for ApiError {
    fn from(err: LendingError) -> Self {
        ApiError::Lending(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = match self {
            ApiError::Unauthenticated(message) => {
                let body = Json(ErrorResponse::new("UNAUTHENTICATED", message));
                return (StatusCode::UNAUTHORIZED, body).into_response();
            }
            ApiError::Lending(err) => err,
        };

        let (status, error_type) = match &err {
            // 404 Not Found - リクエストされたリソースが存在しない
            LendingError::CopyNotFound => (StatusCode::NOT_FOUND, "COPY_NOT_FOUND"),
            LendingError::LoanNotFound => (StatusCode::NOT_FOUND, "LOAN_NOT_FOUND"),

            // 403 Forbidden - 役割・範囲の確認に失敗
            LendingError::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN"),

            // 409 Conflict - 現在の状態と衝突（再試行で解消しうるものを含む）
            LendingError::CopyUnavailable => (StatusCode::CONFLICT, "COPY_UNAVAILABLE"),
            LendingError::CopyExists => (StatusCode::CONFLICT, "COPY_EXISTS"),
            LendingError::AlreadyReturned(_) => (StatusCode::CONFLICT, "ALREADY_RETURNED"),
            LendingError::IdempotencyTokenReused => {
                (StatusCode::CONFLICT, "IDEMPOTENCY_TOKEN_REUSED")
            }
            LendingError::StoreConflict => (StatusCode::CONFLICT, "STORE_CONFLICT"),

            // 422 Unprocessable Entity - ビジネスルール違反
            LendingError::BorrowerNotFound => {
                (StatusCode::UNPROCESSABLE_ENTITY, "BORROWER_NOT_FOUND")
            }
            LendingError::BorrowerBlocked { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "BORROWER_BLOCKED")
            }
            LendingError::LoanLimitExceeded { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "LOAN_LIMIT_EXCEEDED")
            }
            LendingError::InvalidLoanState(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_LOAN_STATE")
            }
            LendingError::LoanOverdue => (StatusCode::UNPROCESSABLE_ENTITY, "LOAN_OVERDUE"),
            LendingError::RenewalLimitExceeded => {
                (StatusCode::UNPROCESSABLE_ENTITY, "RENEWAL_LIMIT_EXCEEDED")
            }
            LendingError::InvalidAmount => (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_AMOUNT"),
            LendingError::NoFineDue => (StatusCode::UNPROCESSABLE_ENTITY, "NO_FINE_DUE"),
            LendingError::InvalidIdempotencyToken(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_IDEMPOTENCY_TOKEN")
            }

            // 500 Internal Server Error - システム障害
            // 内部エラーの詳細はログに記録し、クライアントには一般的なメッセージのみを返す
            LendingError::StoreError(e) => {
                tracing::error!("Ledger store error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR")
            }
            LendingError::CatalogError(e) => {
                tracing::error!("Catalog error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "CATALOG_ERROR")
            }
            LendingError::AuthorizationError(e) => {
                tracing::error!("Authorization service error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "AUTHORIZATION_ERROR")
            }
        };

        let body = Json(ErrorResponse::new(error_type, err.to_string()));
        (status, body).into_response()
    }
}
