//! Greenlight Engine - the confirmation workflow orchestrator
//!
//! Drives AI-suggested proposals from `Proposed` to a terminal state:
//! validates them against the configured workflow, serializes confirmations
//! per target entity, applies mutations through the tracker adapter exactly
//! once, records outcomes in the durable ledger, and pushes lifecycle
//! events back to the chat gateway.
//!
//! # Example
//!
//! ```rust,ignore
//! use greenlight_engine::{EngineConfig, WorkflowEngine};
//! use greenlight_proposal::{ProposalPayload, SessionId};
//!
//! # async fn example(tracker: std::sync::Arc<dyn greenlight_tracker::TrackerClient>,
//! #                  ledger: std::sync::Arc<dyn greenlight_ledger::ApplicationLedger>)
//! #     -> Result<(), greenlight_engine::EngineError> {
//! let engine = WorkflowEngine::new(EngineConfig::new(), tracker, ledger);
//! let session = SessionId::new();
//!
//! let proposal = engine.propose(
//!     session,
//!     ProposalPayload::TaskCreate {
//!         title: "Wire up CI".into(),
//!         body: String::new(),
//!         column: "Todo".into(),
//!     },
//!     None,
//! )?;
//! let event = engine.confirm(session, proposal.id, 0).await?;
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod locks;
pub mod reconcile;

// Re-exports for convenience
pub use cache::EntityCache;
pub use config::EngineConfig;
pub use engine::WorkflowEngine;
pub use error::EngineError;
pub use event::{ErrorKind, LifecycleEvent};
pub use reconcile::ReconcilerHandle;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
