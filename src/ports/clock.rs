use chrono::{DateTime, Utc};

/// 時計ポート
///
/// テストでは固定時刻の実装を差し込む。
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
