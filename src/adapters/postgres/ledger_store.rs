use crate::domain::{
    Availability, BookCopy, CopyId, IdempotencyToken, LedgerSummary, Loan, LoanId, LoanStatus,
    PaymentId, PaymentRecord, RenewalCount, SummaryScope, TitleId, UserId,
};
use crate::ports::catalog::{self, Catalog};
use crate::ports::ledger_store::{LedgerStore as LedgerStoreTrait, LedgerStoreError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{TryStreamExt, future};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use std::str::FromStr;
use uuid::Uuid;

/// 部分一意インデックス：1冊の蔵書にActiveな貸出は高々1件
const ACTIVE_LOAN_PER_COPY: &str = "uq_loans_active_copy";
/// 一意制約：同じ貸出で同じ冪等キーの支払は1件
const PAYMENT_TOKEN_UNIQUE: &str = "uq_fine_payments_token";

/// sqlxのエラーを台帳ストアのエラーに変換する
///
/// 直列化失敗とデッドロックは楽観ロックの競合として扱う。
fn map_sqlx_error(error: sqlx::Error) -> LedgerStoreError {
    if let Some(db_error) = error.as_database_error() {
        match db_error.code().as_deref() {
            Some("40001") | Some("40P01") => return LedgerStoreError::Conflict,
            _ => {}
        }
    }
    LedgerStoreError::Backend(Box::new(error))
}

fn violated_constraint(error: &sqlx::Error) -> Option<String> {
    let db_error = error.as_database_error()?;
    if db_error.is_unique_violation() {
        db_error.constraint().map(str::to_owned)
    } else {
        None
    }
}

fn invalid_data(message: String) -> LedgerStoreError {
    LedgerStoreError::Backend(Box::new(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        message,
    )))
}

#[derive(sqlx::FromRow)]
struct CopyRow {
    copy_id: Uuid,
    title_id: Uuid,
    availability: String,
}

impl CopyRow {
    fn into_copy(self) -> Result<BookCopy> {
        Ok(BookCopy {
            copy_id: CopyId::from_uuid(self.copy_id),
            title_id: TitleId::from_uuid(self.title_id),
            availability: Availability::from_str(&self.availability).map_err(invalid_data)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct LoanRow {
    loan_id: Uuid,
    copy_id: Uuid,
    borrower_id: Uuid,
    checkout_time: DateTime<Utc>,
    due_date: DateTime<Utc>,
    return_time: Option<DateTime<Utc>>,
    fine: Decimal,
    fine_paid: bool,
    status: String,
    renewal_count: i16,
    version: i64,
}

impl LoanRow {
    /// 行を貸出に変換する
    ///
    /// renewal_countのi16からu8、versionのi64からu64、statusの文字列からの変換で
    /// 範囲外・未知の値をエラーにする。
    fn into_loan(self) -> Result<Loan> {
        let renewal_count = u8::try_from(self.renewal_count).map_err(|_| {
            invalid_data(format!("renewal_count out of range: {}", self.renewal_count))
        })?;
        let version = u64::try_from(self.version)
            .map_err(|_| invalid_data(format!("version out of range: {}", self.version)))?;

        Ok(Loan {
            loan_id: LoanId::from_uuid(self.loan_id),
            copy_id: CopyId::from_uuid(self.copy_id),
            borrower_id: UserId::from_uuid(self.borrower_id),
            checkout_time: self.checkout_time,
            due_date: self.due_date,
            return_time: self.return_time,
            fine: self.fine,
            fine_paid: self.fine_paid,
            status: LoanStatus::from_str(&self.status).map_err(invalid_data)?,
            renewal_count: RenewalCount::from_value(renewal_count),
            version,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    payment_id: Uuid,
    loan_id: Uuid,
    amount: Decimal,
    paid_at: DateTime<Utc>,
    paid_in_full: bool,
    idempotency_token: Option<String>,
}

impl PaymentRow {
    fn into_payment(self) -> Result<PaymentRecord> {
        let idempotency_token = self
            .idempotency_token
            .map(IdempotencyToken::parse)
            .transpose()
            .map_err(|e| invalid_data(e.to_string()))?;

        Ok(PaymentRecord {
            payment_id: PaymentId::from_uuid(self.payment_id),
            loan_id: LoanId::from_uuid(self.loan_id),
            amount: self.amount,
            paid_at: self.paid_at,
            paid_in_full: self.paid_in_full,
            idempotency_token,
        })
    }
}

/// LedgerStoreのPostgreSQL実装
///
/// 条件付き書き込みはすべて1トランザクションで行う。
/// - 貸出成立：`availability = 'available'`を条件にした蔵書のUPDATEと貸出のINSERT
/// - 貸出更新：`version`を条件にしたUPDATE
/// - 支払記録：貸出行をロックしてから冪等キーを照合し、追記と貸出更新を行う
///
/// 集計はREPEATABLE READの読み取り専用トランザクションで1つのスナップショットから数える。
pub struct LedgerStore {
    pool: PgPool,
}

impl LedgerStore {
    /// PostgreSQLコネクションプールから新しいLedgerStoreを作成
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn copy_exists(&self, copy_id: CopyId) -> Result<bool> {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM copies WHERE copy_id = $1)")
            .bind(copy_id.value())
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }

    async fn find_payment_by_token(
        &self,
        loan_id: LoanId,
        token: &IdempotencyToken,
    ) -> Result<Option<PaymentRecord>> {
        let row: Option<PaymentRow> = sqlx::query_as(
            r#"
            SELECT payment_id, loan_id, amount, paid_at, paid_in_full, idempotency_token
            FROM fine_payments
            WHERE loan_id = $1 AND idempotency_token = $2
            "#,
        )
        .bind(loan_id.value())
        .bind(token.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(PaymentRow::into_payment).transpose()
    }
}

/// versionを条件に貸出を書き換える
async fn compare_and_swap_loan(
    tx: &mut Transaction<'_, Postgres>,
    loan: &Loan,
    expected_version: u64,
) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE loans
        SET due_date = $2,
            return_time = $3,
            fine = $4,
            fine_paid = $5,
            status = $6,
            renewal_count = $7,
            version = $8,
            updated_at = NOW()
        WHERE loan_id = $1 AND version = $9
        "#,
    )
    .bind(loan.loan_id.value())
    .bind(loan.due_date)
    .bind(loan.return_time)
    .bind(loan.fine)
    .bind(loan.fine_paid)
    .bind(loan.status.as_str())
    .bind(i16::from(loan.renewal_count.value()))
    .bind(loan.version as i64)
    .bind(expected_version as i64)
    .execute(&mut **tx)
    .await
    .map_err(map_sqlx_error)?;

    if result.rows_affected() == 0 {
        return Err(LedgerStoreError::Conflict);
    }
    Ok(())
}

#[async_trait]
impl LedgerStoreTrait for LedgerStore {
    async fn insert_copy(&self, copy: &BookCopy) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO copies (copy_id, title_id, availability)
            VALUES ($1, $2, $3)
            ON CONFLICT (copy_id) DO NOTHING
            "#,
        )
        .bind(copy.copy_id.value())
        .bind(copy.title_id.value())
        .bind(copy.availability.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(LedgerStoreError::CopyExists);
        }
        Ok(())
    }

    async fn transition_copy(
        &self,
        copy_id: CopyId,
        from: Availability,
        to: Availability,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE copies
            SET availability = $3, updated_at = NOW()
            WHERE copy_id = $1 AND availability = $2
            "#,
        )
        .bind(copy_id.value())
        .bind(from.as_str())
        .bind(to.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return if self.copy_exists(copy_id).await? {
                Err(LedgerStoreError::CopyUnavailable)
            } else {
                Err(LedgerStoreError::CopyNotFound)
            };
        }
        Ok(())
    }

    async fn insert_checkout(&self, loan: &Loan) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        // 条件付きUPDATE：先に成立した貸出があれば0行になる
        let claimed = sqlx::query(
            r#"
            UPDATE copies
            SET availability = 'on_loan', updated_at = NOW()
            WHERE copy_id = $1 AND availability = 'available'
            "#,
        )
        .bind(loan.copy_id.value())
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        if claimed.rows_affected() == 0 {
            drop(tx);
            return if self.copy_exists(loan.copy_id).await? {
                Err(LedgerStoreError::CopyUnavailable)
            } else {
                Err(LedgerStoreError::CopyNotFound)
            };
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO loans (
                loan_id,
                copy_id,
                borrower_id,
                checkout_time,
                due_date,
                return_time,
                fine,
                fine_paid,
                status,
                renewal_count,
                version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(loan.loan_id.value())
        .bind(loan.copy_id.value())
        .bind(loan.borrower_id.value())
        .bind(loan.checkout_time)
        .bind(loan.due_date)
        .bind(loan.return_time)
        .bind(loan.fine)
        .bind(loan.fine_paid)
        .bind(loan.status.as_str())
        .bind(i16::from(loan.renewal_count.value()))
        .bind(loan.version as i64)
        .execute(&mut *tx)
        .await;

        if let Err(error) = inserted {
            return Err(match violated_constraint(&error).as_deref() {
                Some(ACTIVE_LOAN_PER_COPY) => LedgerStoreError::CopyUnavailable,
                Some(_) => LedgerStoreError::Conflict,
                None => map_sqlx_error(error),
            });
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn get_loan(&self, loan_id: LoanId) -> Result<Option<Loan>> {
        let row: Option<LoanRow> = sqlx::query_as(
            r#"
            SELECT loan_id, copy_id, borrower_id, checkout_time, due_date, return_time,
                   fine, fine_paid, status, renewal_count, version
            FROM loans
            WHERE loan_id = $1
            "#,
        )
        .bind(loan_id.value())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(LoanRow::into_loan).transpose()
    }

    async fn update_loan(
        &self,
        loan: &Loan,
        expected_version: u64,
        copy_availability: Option<Availability>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        compare_and_swap_loan(&mut tx, loan, expected_version).await?;

        if let Some(availability) = copy_availability {
            let result = sqlx::query(
                r#"
                UPDATE copies
                SET availability = $2, updated_at = NOW()
                WHERE copy_id = $1
                "#,
            )
            .bind(loan.copy_id.value())
            .bind(availability.as_str())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

            if result.rows_affected() == 0 {
                return Err(LedgerStoreError::CopyNotFound);
            }
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn find_loans_by_borrower(&self, borrower_id: UserId) -> Result<Vec<Loan>> {
        sqlx::query_as::<_, LoanRow>(
            r#"
            SELECT loan_id, copy_id, borrower_id, checkout_time, due_date, return_time,
                   fine, fine_paid, status, renewal_count, version
            FROM loans
            WHERE borrower_id = $1
            ORDER BY checkout_time DESC
            "#,
        )
        .bind(borrower_id.value())
        .fetch(&self.pool)
        .map_err(map_sqlx_error)
        .and_then(|row| future::ready(row.into_loan()))
        .try_collect()
        .await
    }

    async fn find_overdue_candidates(&self, cutoff: DateTime<Utc>) -> Result<Vec<Loan>> {
        sqlx::query_as::<_, LoanRow>(
            r#"
            SELECT loan_id, copy_id, borrower_id, checkout_time, due_date, return_time,
                   fine, fine_paid, status, renewal_count, version
            FROM loans
            WHERE status = 'active' AND due_date < $1
            ORDER BY due_date ASC
            "#,
        )
        .bind(cutoff)
        .fetch(&self.pool)
        .map_err(map_sqlx_error)
        .and_then(|row| future::ready(row.into_loan()))
        .try_collect()
        .await
    }

    async fn find_payments(&self, loan_id: LoanId) -> Result<Vec<PaymentRecord>> {
        let rows: Vec<PaymentRow> = sqlx::query_as(
            r#"
            SELECT payment_id, loan_id, amount, paid_at, paid_in_full, idempotency_token
            FROM fine_payments
            WHERE loan_id = $1
            ORDER BY sequence_number ASC
            "#,
        )
        .bind(loan_id.value())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(PaymentRow::into_payment).collect()
    }

    async fn record_payment(
        &self,
        payment: &PaymentRecord,
        loan: &Loan,
        expected_version: u64,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        // 同じ貸出への支払を直列化する
        sqlx::query("SELECT 1 FROM loans WHERE loan_id = $1 FOR UPDATE")
            .bind(loan.loan_id.value())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        if let Some(token) = &payment.idempotency_token {
            let existing: Option<PaymentRow> = sqlx::query_as(
                r#"
                SELECT payment_id, loan_id, amount, paid_at, paid_in_full, idempotency_token
                FROM fine_payments
                WHERE loan_id = $1 AND idempotency_token = $2
                "#,
            )
            .bind(payment.loan_id.value())
            .bind(token.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

            if let Some(row) = existing {
                return Err(LedgerStoreError::DuplicatePayment(Box::new(
                    row.into_payment()?,
                )));
            }
        }

        compare_and_swap_loan(&mut tx, loan, expected_version).await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO fine_payments (
                payment_id,
                loan_id,
                amount,
                paid_at,
                paid_in_full,
                idempotency_token
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(payment.payment_id.value())
        .bind(payment.loan_id.value())
        .bind(payment.amount)
        .bind(payment.paid_at)
        .bind(payment.paid_in_full)
        .bind(payment.idempotency_token.as_ref().map(IdempotencyToken::as_str))
        .execute(&mut *tx)
        .await;

        if let Err(error) = inserted {
            drop(tx);
            if violated_constraint(&error).as_deref() == Some(PAYMENT_TOKEN_UNIQUE) {
                if let Some(token) = &payment.idempotency_token {
                    if let Some(existing) =
                        self.find_payment_by_token(payment.loan_id, token).await?
                    {
                        return Err(LedgerStoreError::DuplicatePayment(Box::new(existing)));
                    }
                }
                return Err(LedgerStoreError::Conflict);
            }
            return Err(map_sqlx_error(error));
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn summarize(
        &self,
        scope: SummaryScope,
        overdue_cutoff: DateTime<Utc>,
    ) -> Result<LedgerSummary> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        let borrower = match scope {
            SummaryScope::Borrower(borrower_id) => Some(borrower_id.value()),
            SummaryScope::System => None,
        };

        let (borrowed, overdue): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   COUNT(*) FILTER (WHERE due_date < $1)
            FROM loans
            WHERE status = 'active'
              AND ($2::uuid IS NULL OR borrower_id = $2)
            "#,
        )
        .bind(overdue_cutoff)
        .bind(borrower)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let available: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM copies WHERE availability = 'available'")
                .fetch_one(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(LedgerSummary {
            borrowed: borrowed as u64,
            available: available as u64,
            overdue: overdue as u64,
        })
    }
}

#[async_trait]
impl Catalog for LedgerStore {
    async fn get_copy(&self, copy_id: CopyId) -> catalog::Result<Option<BookCopy>> {
        let row: Option<CopyRow> = sqlx::query_as(
            "SELECT copy_id, title_id, availability FROM copies WHERE copy_id = $1",
        )
        .bind(copy_id.value())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(CopyRow::into_copy).transpose()?)
    }

    async fn copies_of_title(&self, title_id: TitleId) -> catalog::Result<Vec<BookCopy>> {
        let rows: Vec<CopyRow> = sqlx::query_as(
            r#"
            SELECT copy_id, title_id, availability
            FROM copies
            WHERE title_id = $1
            ORDER BY copy_id ASC
            "#,
        )
        .bind(title_id.value())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(CopyRow::into_copy)
            .collect::<Result<Vec<_>>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn loan_row(status: &str, renewal_count: i16) -> LoanRow {
        let at = Utc.with_ymd_and_hms(2025, 4, 1, 9, 0, 0).unwrap();
        LoanRow {
            loan_id: Uuid::new_v4(),
            copy_id: Uuid::new_v4(),
            borrower_id: Uuid::new_v4(),
            checkout_time: at,
            due_date: at + chrono::Duration::days(14),
            return_time: None,
            fine: Decimal::ZERO,
            fine_paid: false,
            status: status.to_string(),
            renewal_count,
            version: 3,
        }
    }

    #[test]
    fn test_loan_row_maps_to_loan() {
        let loan = loan_row("active", 1).into_loan().unwrap();

        assert_eq!(loan.status, LoanStatus::Active);
        assert_eq!(loan.renewal_count.value(), 1);
        assert_eq!(loan.version, 3);
    }

    #[test]
    fn test_loan_row_with_unknown_status_is_rejected() {
        let result = loan_row("borrowed", 0).into_loan();
        assert!(matches!(result, Err(LedgerStoreError::Backend(_))));
    }

    #[test]
    fn test_loan_row_with_negative_renewal_count_is_rejected() {
        let result = loan_row("active", -1).into_loan();
        assert!(matches!(result, Err(LedgerStoreError::Backend(_))));
    }

    fn payment_row(idempotency_token: Option<&str>) -> PaymentRow {
        PaymentRow {
            payment_id: Uuid::new_v4(),
            loan_id: Uuid::new_v4(),
            amount: Decimal::from(10),
            paid_at: Utc.with_ymd_and_hms(2025, 4, 20, 9, 0, 0).unwrap(),
            paid_in_full: false,
            idempotency_token: idempotency_token.map(str::to_string),
        }
    }

    #[test]
    fn test_payment_row_maps_token() {
        let payment = payment_row(Some("pay-1")).into_payment().unwrap();

        assert_eq!(
            payment.idempotency_token.as_ref().map(IdempotencyToken::as_str),
            Some("pay-1")
        );
    }

    #[test]
    fn test_payment_row_with_blank_token_is_rejected() {
        let result = payment_row(Some("")).into_payment();
        assert!(matches!(result, Err(LedgerStoreError::Backend(_))));
    }
}
