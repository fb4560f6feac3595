pub mod ledger;
pub mod lock;
pub mod paths;
pub mod store;

pub use ledger::{LedgerDoc, LedgerEntry, ProgressLedger, TestHashes};
pub use lock::RunLock;
pub use paths::RunPaths;
pub use store::write_atomic;
