//! Greenlight Ledger - the durable application record store
//!
//! An append-only ledger of what was actually applied against the system
//! of record, keyed by idempotency key. The uniqueness of that key is the
//! single correctness-critical property: it is what makes re-delivery of a
//! confirm command safe, and it is the audit trail. Records are never
//! deleted.
//!
//! Two implementations: [`MemoryLedger`] for tests and single-process
//! setups, [`SqliteLedger`] for durability across restarts.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod memory;
pub mod record;
pub mod sqlite;

// Re-exports for convenience
pub use memory::MemoryLedger;
pub use record::{ApplicationLedger, ApplicationRecord, LedgerError, Outcome, WriteIfAbsent};
pub use sqlite::SqliteLedger;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
