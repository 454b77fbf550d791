//! Background processors.
//!
//! - `LedgerSync`: receives `LedgerEvent`, mints tokens and mirrors
//!   admissions on the external ledger, retrying failed mints with backoff
//! - `ExpirySweeper`: periodically fails stale pending purchases and expires
//!   past-due listings

pub mod expiry_sweeper;
pub mod ledger_sync;

pub use expiry_sweeper::{ExpirySweeper, SweepNow, SweepReport};
pub use ledger_sync::{LedgerSync, calculate_retry_delay};
