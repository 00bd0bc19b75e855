pub mod ledger_store;

// パブリックに型を再エクスポート
pub use ledger_store::LedgerStore as PostgresLedgerStore;
