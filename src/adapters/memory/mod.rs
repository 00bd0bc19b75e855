pub mod authorization_service;
pub mod ledger_store;

pub use authorization_service::AuthorizationService as InMemoryAuthorizationService;
pub use ledger_store::LedgerStore as InMemoryLedgerStore;
