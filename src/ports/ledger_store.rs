use crate::domain::{
    Availability, BookCopy, CopyId, LedgerSummary, Loan, LoanId, PaymentRecord, SummaryScope,
    UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// 台帳ストアのエラー
///
/// 条件付き書き込みの失敗は型で区別し、バックエンド障害は`Backend`に包む。
#[derive(Debug, Error)]
pub enum LedgerStoreError {
    /// 蔵書が期待した状態ではなかった（貸出中・紛失・除籍、または別の貸出が先に成立した）
    #[error("Copy is not available")]
    CopyUnavailable,

    /// 蔵書が登録されていない
    #[error("Copy not found")]
    CopyNotFound,

    /// 同じIDの蔵書が既に登録されている
    #[error("Copy already exists")]
    CopyExists,

    /// 楽観ロックの競合（バージョン不一致、直列化失敗）
    #[error("Concurrent update conflict")]
    Conflict,

    /// 同じ冪等キーの支払が先に記録されていた
    #[error("Duplicate payment for idempotency token")]
    DuplicatePayment(Box<PaymentRecord>),

    /// バックエンドの障害
    #[error("Ledger store backend error")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T> = std::result::Result<T, LedgerStoreError>;

/// 台帳ストアポート
///
/// 貸出IDから貸出記録への永続マッピングと、蔵書の貸出可否状態を保持する。
/// すべての書き込みは条件付き・全か無か。
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// 蔵書を登録する（状態はAvailable）
    async fn insert_copy(&self, copy: &BookCopy) -> Result<()>;

    /// 蔵書の状態を`from`から`to`へ書き換える
    ///
    /// 現在の状態が`from`でなければ`CopyUnavailable`。
    async fn transition_copy(
        &self,
        copy_id: CopyId,
        from: Availability,
        to: Availability,
    ) -> Result<()>;

    /// 貸出を成立させる
    ///
    /// 蔵書がAvailableであること、その蔵書にActiveな貸出がないことを確認し、
    /// 貸出の登録と蔵書のOnLoanへの書き換えを1つの不可分な操作で行う。
    /// 条件を満たさなければ何も書かずに`CopyUnavailable`を返す。
    async fn insert_checkout(&self, loan: &Loan) -> Result<()>;

    /// IDで貸出を取得する
    async fn get_loan(&self, loan_id: LoanId) -> Result<Option<Loan>>;

    /// 貸出を更新する（compare-and-swap）
    ///
    /// 保存済みのversionが`expected_version`と一致する場合のみ書き込む。
    /// `copy_availability`が指定されれば蔵書の状態も同じ操作で書き換える。
    async fn update_loan(
        &self,
        loan: &Loan,
        expected_version: u64,
        copy_availability: Option<Availability>,
    ) -> Result<()>;

    /// 借り手の全貸出（返却済み・紛失を含む）
    async fn find_loans_by_borrower(&self, borrower_id: UserId) -> Result<Vec<Loan>>;

    /// 返却期限が`cutoff`より前のActiveな貸出
    async fn find_overdue_candidates(&self, cutoff: DateTime<Utc>) -> Result<Vec<Loan>>;

    /// 貸出に対する支払記録（記録順）
    async fn find_payments(&self, loan_id: LoanId) -> Result<Vec<PaymentRecord>>;

    /// 支払を記録する
    ///
    /// 支払記録の追記と貸出の更新（延滞料・支払済みフラグ）を1つの操作で行う。
    /// 貸出はversionでcompare-and-swapする。同じ冪等キーの記録が既にあれば
    /// `DuplicatePayment`で既存の記録を返す。
    async fn record_payment(
        &self,
        payment: &PaymentRecord,
        loan: &Loan,
        expected_version: u64,
    ) -> Result<()>;

    /// 1つのスナップショットから集計する
    ///
    /// 延滞は`due_date < overdue_cutoff`のActiveな貸出。
    async fn summarize(
        &self,
        scope: SummaryScope,
        overdue_cutoff: DateTime<Utc>,
    ) -> Result<LedgerSummary>;
}
