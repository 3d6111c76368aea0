//! Per-wallet gas fee accounting for Solana addresses
//!
//! Scans an address's transaction history one month at a time, prices each
//! fee at its own timestamp, aggregates per local calendar day, and caches
//! the results in SQLite keyed by (address, date). Cached days whose
//! transaction count still matches the ledger are served without re-fetching
//! bodies.

pub mod aggregate;
pub mod cache;
pub mod config;
pub mod constants;
pub mod dates;
pub mod error;
pub mod prices;
pub mod retry;
pub mod rpc;
pub mod signatures;
pub mod sync;
pub mod transactions;

pub use cache::{DayRecord, SyncCache};
pub use config::{Config, FileConfig};
pub use error::SyncError;
pub use sync::{DayView, GasEngine, MonthTotals, MonthView};
