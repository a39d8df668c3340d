pub mod clock;
pub mod handlers;
mod ledger;
pub mod memory;
mod record;
mod store;

pub use ledger::{LedgerSettings, Outcome, QuotaLedger, UsageSnapshot};
pub use memory::MemoryQuotaStore;
pub use record::{QuotaRecord, StoredRecord, VersionToken};
pub use store::{QuotaStore, StoreError};
