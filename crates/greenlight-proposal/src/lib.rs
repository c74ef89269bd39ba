//! Greenlight Proposal - pending-mutation entity model and registry
//!
//! A proposal is an AI-suggested mutation (create a task, change a status,
//! recommend an issue) held in a pending state until its owning session
//! confirms or rejects it. This crate owns:
//! - The proposal entity model and its tagged payload union
//! - The lifecycle state machine (`Proposed` through terminal states)
//! - The session-scoped registry with compare-and-set transitions
//!
//! # Example
//!
//! ```rust
//! use greenlight_proposal::{
//!     Proposal, ProposalPayload, ProposalRegistry, ProposalState, SessionId,
//! };
//!
//! let registry = ProposalRegistry::new();
//! let session = SessionId::new();
//! let proposal = Proposal::new(
//!     session,
//!     ProposalPayload::TaskCreate {
//!         title: "Wire up CI".into(),
//!         body: String::new(),
//!         column: "Todo".into(),
//!     },
//!     None,
//! );
//! let id = proposal.id;
//! registry.insert(proposal).unwrap();
//!
//! let updated = registry.transition(id, 0, ProposalState::Rejected).unwrap();
//! assert_eq!(updated.version, 1);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod error;
pub mod registry;
pub mod state;
pub mod types;

// Re-exports for convenience
pub use error::RegistryError;
pub use registry::ProposalRegistry;
pub use state::{allowed_transitions, validate_transition, ProposalState};
pub use types::{
    EntityRef, ExternalEntityRecord, Proposal, ProposalId, ProposalPayload, SessionId,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
