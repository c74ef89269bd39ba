//! Greenlight Tracker - system-of-record contract and mutation adapter
//!
//! The external tracker (an issue tracker / project board) is a black box
//! with unspecified latency and uneven idempotency guarantees. This crate
//! owns:
//! - The [`TrackerClient`] trait every concrete tracker implements
//! - The typed error taxonomy with transient/permanent classification
//! - Deterministic idempotency-key derivation from proposal ids
//! - The [`TrackerAdapter`]: bounded exponential retry, a proactive rate
//!   gate, and a pre-check fallback for operations without native
//!   idempotency support

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod adapter;
pub mod client;
pub mod error;
pub mod idempotency;
pub mod retry;

// Re-exports for convenience
pub use adapter::{AppliedMutation, TrackerAdapter};
pub use client::{
    CreateEntity, EntitySnapshot, IdempotencySupport, MutationKind, MutationOutcome, QuotaSignal,
    TrackerClient, UpdateStatus,
};
pub use error::TrackerError;
pub use idempotency::IdempotencyKey;
pub use retry::RetryPolicy;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
