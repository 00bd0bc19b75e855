use crate::domain::{BookCopy, CopyId, TitleId};
use async_trait::async_trait;

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// カタログポート
///
/// 貸出コンテキストからは読み取り専用。書誌の詳細は知らず、
/// 蔵書IDとタイトルIDと貸出可否状態だけを見る。
#[async_trait]
pub trait Catalog: Send + Sync {
    /// 蔵書をIDで取得する
    async fn get_copy(&self, copy_id: CopyId) -> Result<Option<BookCopy>>;

    /// タイトルの全蔵書（ID順）
    async fn copies_of_title(&self, title_id: TitleId) -> Result<Vec<BookCopy>>;
}
