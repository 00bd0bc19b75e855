use chrono::Duration;
use rust_decimal::Decimal;

/// 貸出ポリシー
///
/// 設定から与えられる不変の値。貸出エンジンはこれを読むだけ。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LendingPolicy {
    /// 貸出期間（延長1回あたりの延長幅も同じ）
    pub loan_period: Duration,
    /// 借り手1人あたりの同時貸出上限
    pub max_active_loans: usize,
    /// 1貸出あたりの延長回数上限
    pub max_renewals: u8,
    /// 未払い延滞料がこの額を超えると貸出不可。`None`なら判定しない
    pub blocking_fine_threshold: Option<Decimal>,
    /// 紛失時の弁償額（日割り延滞料とは独立）
    pub lost_replacement_fee: Decimal,
}

impl Default for LendingPolicy {
    fn default() -> Self {
        Self {
            loan_period: Duration::days(14),
            max_active_loans: 5,
            max_renewals: 1,
            blocking_fine_threshold: Some(Decimal::from(100)),
            lost_replacement_fee: Decimal::from(500),
        }
    }
}

/// 延滞料ポリシー
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinePolicy {
    /// 返却期限後、延滞料が発生し始めるまでの猶予
    pub grace_period: Duration,
    /// 延滞1日あたりの料金
    pub daily_rate: Decimal,
    /// 延滞料の上限
    pub max_fine: Decimal,
}

impl Default for FinePolicy {
    fn default() -> Self {
        Self {
            grace_period: Duration::zero(),
            daily_rate: Decimal::from(5),
            max_fine: Decimal::from(100),
        }
    }
}
