use crate::application::lending::{
    self, LendingError, ServiceDependencies,
};
use crate::domain::{
    CopyId, LedgerSummary, LoanId, TitleAvailability, TitleId, UserId,
    commands::{MarkLost, RenewLoan, ReturnLoan, Summarize, WithdrawCopy},
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use std::sync::Arc;
use uuid::Uuid;

use super::{
    caller::Caller,
    error::ApiError,
    types::{
        CheckoutRequest, CheckoutTitleRequest, CopyResponse, LoanDetailsResponse, LoanResponse,
        OverdueLoanResponse, PayFineRequest, PaymentResponse, RegisterCopyRequest,
    },
};

// ============================================================================
// State
// ============================================================================

/// ハンドラー間で共有されるアプリケーション状態
#[derive(Clone)]
pub struct AppState {
    pub service_deps: ServiceDependencies,
}

// ============================================================================
// Lending (POST)
// ============================================================================

/// POST /loans - 蔵書を貸し出す
pub async fn checkout(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<LoanResponse>), ApiError> {
    let loan = lending::checkout(&state.service_deps, req.to_command()).await?;
    Ok((StatusCode::CREATED, Json(loan.into())))
}

/// POST /titles/:id/checkout - タイトルの空いている蔵書を貸し出す
pub async fn checkout_title(
    State(state): State<Arc<AppState>>,
    Path(title_id): Path<Uuid>,
    Json(req): Json<CheckoutTitleRequest>,
) -> Result<(StatusCode, Json<LoanResponse>), ApiError> {
    let loan = lending::checkout_title(&state.service_deps, req.to_command(title_id)).await?;
    Ok((StatusCode::CREATED, Json(loan.into())))
}

/// POST /loans/:id/return - 返却する
///
/// 返却済みの貸出に対しては、保存されている返却結果をそのまま200で返す。
/// 再送しても蔵書状態は変わらない。
pub async fn return_loan(
    State(state): State<Arc<AppState>>,
    Path(loan_id): Path<Uuid>,
) -> Result<Json<LoanResponse>, ApiError> {
    let cmd = ReturnLoan {
        loan_id: LoanId::from_uuid(loan_id),
    };

    match lending::return_loan(&state.service_deps, cmd).await {
        Ok(loan) => Ok(Json(loan.into())),
        Err(LendingError::AlreadyReturned(loan)) => Ok(Json((*loan).into())),
        Err(e) => Err(e.into()),
    }
}

/// POST /loans/:id/renew - 延長する
pub async fn renew_loan(
    State(state): State<Arc<AppState>>,
    Path(loan_id): Path<Uuid>,
) -> Result<Json<LoanResponse>, ApiError> {
    let cmd = RenewLoan {
        loan_id: LoanId::from_uuid(loan_id),
    };
    let loan = lending::renew_loan(&state.service_deps, cmd).await?;
    Ok(Json(loan.into()))
}

/// POST /loans/:id/lost - 紛失として処理する
pub async fn mark_lost(
    State(state): State<Arc<AppState>>,
    Path(loan_id): Path<Uuid>,
) -> Result<Json<LoanResponse>, ApiError> {
    let cmd = MarkLost {
        loan_id: LoanId::from_uuid(loan_id),
    };
    let loan = lending::mark_lost(&state.service_deps, cmd).await?;
    Ok(Json(loan.into()))
}

/// POST /loans/:id/payments - 延滞料を支払う
///
/// 同じ冪等キーの再送には最初の支払記録を返す。
pub async fn pay_fine(
    State(state): State<Arc<AppState>>,
    Path(loan_id): Path<Uuid>,
    Json(req): Json<PayFineRequest>,
) -> Result<(StatusCode, Json<PaymentResponse>), ApiError> {
    let record = lending::pay_fine(&state.service_deps, req.to_command(loan_id)?).await?;
    Ok((StatusCode::CREATED, Json(record.into())))
}

// ============================================================================
// Inventory
// ============================================================================

/// POST /copies - 蔵書を登録する（司書・管理者）
pub async fn register_copy(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(req): Json<RegisterCopyRequest>,
) -> Result<(StatusCode, Json<CopyResponse>), ApiError> {
    let copy =
        lending::register_copy(&state.service_deps, req.to_command(caller.caller_id)).await?;
    Ok((StatusCode::CREATED, Json(copy.into())))
}

/// POST /copies/:id/withdraw - 蔵書を除籍する（司書・管理者）
pub async fn withdraw_copy(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(copy_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let cmd = WithdrawCopy {
        caller_id: caller.caller_id,
        copy_id: CopyId::from_uuid(copy_id),
    };
    lending::withdraw_copy(&state.service_deps, cmd).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /titles/:id/availability - タイトルの蔵書数と貸出可能数
pub async fn title_availability(
    State(state): State<Arc<AppState>>,
    Path(title_id): Path<Uuid>,
) -> Result<Json<TitleAvailability>, ApiError> {
    let availability =
        lending::title_availability(&state.service_deps, TitleId::from_uuid(title_id)).await?;
    Ok(Json(availability))
}

// ============================================================================
// Queries (GET)
// ============================================================================

/// GET /loans/:id - 貸出の詳細（本人または司書・管理者）
pub async fn get_loan(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(loan_id): Path<Uuid>,
) -> Result<Json<LoanDetailsResponse>, ApiError> {
    let details = lending::get_loan(
        &state.service_deps,
        caller.caller_id,
        LoanId::from_uuid(loan_id),
    )
    .await?;
    Ok(Json(details.into()))
}

/// GET /borrowers/:id/loans - 借り手の貸出一覧
pub async fn list_loans(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(borrower_id): Path<Uuid>,
) -> Result<Json<Vec<LoanResponse>>, ApiError> {
    let loans = lending::list_loans(
        &state.service_deps,
        caller.caller_id,
        UserId::from_uuid(borrower_id),
    )
    .await?;
    Ok(Json(loans.into_iter().map(Into::into).collect()))
}

/// GET /borrowers/:id/fines - 未払いの延滞料がある貸出
pub async fn unpaid_fines(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(borrower_id): Path<Uuid>,
) -> Result<Json<Vec<LoanDetailsResponse>>, ApiError> {
    let unpaid = lending::unpaid_fines(
        &state.service_deps,
        caller.caller_id,
        UserId::from_uuid(borrower_id),
    )
    .await?;
    Ok(Json(unpaid.into_iter().map(Into::into).collect()))
}

/// GET /summary - ダッシュボード用の集計
///
/// 申告された役割（x-caller-role）は認可サービスで確認し直す。
pub async fn summary(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<LedgerSummary>, ApiError> {
    let cmd = Summarize {
        caller_id: caller.caller_id,
        claimed_role: caller.require_role()?,
    };
    let summary = lending::summarize(&state.service_deps, cmd).await?;
    Ok(Json(summary))
}

/// GET /overdue - 延滞一覧（司書・管理者）
pub async fn overdue_report(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<Vec<OverdueLoanResponse>>, ApiError> {
    let report = lending::overdue_report(&state.service_deps, caller.caller_id).await?;
    Ok(Json(report.into_iter().map(Into::into).collect()))
}
