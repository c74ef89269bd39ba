//! Deterministic idempotency-key derivation

use greenlight_proposal::ProposalId;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Domain tag folded into every key so other hash uses can never collide
const KEY_DOMAIN: &[u8] = b"greenlight.apply.v1";

/// Deterministic identifier for "the mutation of this proposal"
///
/// Derived purely from the proposal id: every retry of a confirm, on any
/// process, computes the same key, which is what makes the durable ledger's
/// uniqueness constraint an at-most-once guard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Derive the key for a proposal
    #[must_use]
    pub fn derive(proposal_id: ProposalId) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(KEY_DOMAIN);
        hasher.update([0]);
        hasher.update(proposal_id.to_string().as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Rehydrate a key previously stored via [`Self::as_str`]
    #[must_use]
    pub fn from_stored(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Key as a hex string, the form trackers and the ledger see
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
