use crate::domain::{PayFineError, PaymentRecord, commands::PayFine, fine};
use crate::ports::LedgerStoreError;

use super::errors::{LendingError, Result};
use super::lending_service::{ServiceDependencies, load_loan};

fn map_pay_fine_error(err: PayFineError) -> LendingError {
    match err {
        PayFineError::InvalidAmount => LendingError::InvalidAmount,
        PayFineError::NoFineDue => LendingError::NoFineDue,
        PayFineError::IdempotencyTokenReused => LendingError::IdempotencyTokenReused,
    }
}

/// 延滞料を支払う
///
/// ビジネスルール：
/// - 貸出が存在すること
/// - 支払額が正であること
/// - 部分払いを受け付け、累計が発生額以上になった時点で支払済みとする
///
/// # 冪等性
///
/// 冪等キー付きの支払は、同じキー・同じ金額の再送に対して最初の記録を返し、
/// 二重計上しない。並行した再送は台帳ストアの一意制約で検出する。
#[tracing::instrument(skip(deps))]
pub async fn pay_fine(deps: &ServiceDependencies, cmd: PayFine) -> Result<PaymentRecord> {
    let now = deps.clock.now();
    let loan = load_loan(&deps.ledger_store, cmd.loan_id).await?;
    let payments = deps.ledger_store.find_payments(cmd.loan_id).await?;

    if let Some(existing) =
        fine::find_replayed_payment(&payments, cmd.idempotency_token.as_ref(), cmd.amount)
            .map_err(map_pay_fine_error)?
    {
        tracing::info!(payment_id = ?existing.payment_id, "Replayed payment ignored");
        return Ok(existing.clone());
    }

    let (updated_loan, record) = fine::pay_fine(
        &loan,
        &payments,
        cmd.amount,
        cmd.idempotency_token.clone(),
        &deps.fine_policy,
        now,
    )
    .map_err(map_pay_fine_error)?;

    match deps
        .ledger_store
        .record_payment(&record, &updated_loan, loan.version)
        .await
    {
        Ok(()) => {}
        Err(LedgerStoreError::DuplicatePayment(existing)) => {
            // 同じキーの並行した再送が先に記録された
            return if existing.amount == cmd.amount {
                Ok(*existing)
            } else {
                Err(LendingError::IdempotencyTokenReused)
            };
        }
        Err(e) => return Err(e.into()),
    }

    tracing::info!(
        loan_id = %record.loan_id,
        amount = %record.amount,
        paid_in_full = record.paid_in_full,
        "Fine payment recorded"
    );

    Ok(record)
}
