pub mod ledger;
pub mod store;

pub use ledger::{LedgerManager, LedgerTransaction};
pub use store::{LedgerEntry, LedgerStorage, MemoryLedgerStorage};
