pub mod authorization;
pub mod catalog;
pub mod clock;
pub mod ledger_store;

pub use authorization::AuthorizationService;
pub use catalog::Catalog;
pub use clock::Clock;
pub use ledger_store::{LedgerStore, LedgerStoreError};
