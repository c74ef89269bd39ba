//! SQLite-backed ledger
//!
//! One table; `idempotency_key TEXT PRIMARY KEY` is the sole
//! correctness-critical schema element. `INSERT OR IGNORE` followed by a
//! read-back of the key gives the atomic write-if-absent inside a single
//! transaction.

use crate::record::{
    ApplicationLedger, ApplicationRecord, LedgerError, Outcome, WriteIfAbsent,
};
use chrono::{DateTime, Utc};
use greenlight_proposal::ProposalId;
use greenlight_tracker::IdempotencyKey;
use parking_lot::Mutex;
use rusqlite::{params, Connection, Row};
use std::path::Path;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS application_records (
    idempotency_key      TEXT PRIMARY KEY,
    proposal_id          TEXT NOT NULL,
    outcome              TEXT NOT NULL,
    external_mutation_id TEXT,
    applied_at           TEXT NOT NULL,
    error_kind           TEXT
);
CREATE INDEX IF NOT EXISTS idx_application_records_proposal
    ON application_records (proposal_id);
";

/// Durable ledger over a SQLite database
///
/// Operations are short single-row statements, so the connection sits
/// behind a plain mutex rather than a pool; the async trait methods do
/// their work inline.
pub struct SqliteLedger {
    conn: Mutex<Connection>,
}

impl SqliteLedger {
    /// Open (and bootstrap) a ledger database at `path`
    ///
    /// # Errors
    /// `LedgerError::Storage` when the file cannot be opened or the schema
    /// cannot be created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let conn = Connection::open(path)?;
        Self::bootstrap(conn)
    }

    /// In-memory database, for tests
    ///
    /// # Errors
    /// `LedgerError::Storage` when SQLite cannot allocate the database.
    pub fn in_memory() -> Result<Self, LedgerError> {
        let conn = Connection::open_in_memory()?;
        Self::bootstrap(conn)
    }

    fn bootstrap(conn: Connection) -> Result<Self, LedgerError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn map_row(row: &Row<'_>) -> Result<ApplicationRecord, LedgerError> {
        let key: String = row.get(0)?;
        let proposal_raw: String = row.get(1)?;
        let outcome_raw: String = row.get(2)?;
        let external_mutation_id: Option<String> = row.get(3)?;
        let applied_raw: String = row.get(4)?;
        let error_kind: Option<String> = row.get(5)?;

        let proposal_id = proposal_raw
            .parse::<ProposalId>()
            .map_err(|e| LedgerError::Corrupt {
                key: key.clone(),
                detail: format!("bad proposal id: {e}"),
            })?;
        let outcome = Outcome::parse(&outcome_raw).ok_or_else(|| LedgerError::Corrupt {
            key: key.clone(),
            detail: format!("unknown outcome {outcome_raw:?}"),
        })?;
        let applied_at = applied_raw
            .parse::<DateTime<Utc>>()
            .map_err(|e| LedgerError::Corrupt {
                key: key.clone(),
                detail: format!("bad timestamp: {e}"),
            })?;

        Ok(ApplicationRecord {
            idempotency_key: IdempotencyKey::from_stored(key),
            proposal_id,
            outcome,
            external_mutation_id,
            applied_at,
            error_kind,
        })
    }
}

#[async_trait::async_trait]
impl ApplicationLedger for SqliteLedger {
    async fn write_if_absent(
        &self,
        record: ApplicationRecord,
    ) -> Result<WriteIfAbsent, LedgerError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let inserted = tx.execute(
            "INSERT OR IGNORE INTO application_records
                 (idempotency_key, proposal_id, outcome, external_mutation_id, applied_at, error_kind)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.idempotency_key.as_str(),
                record.proposal_id.to_string(),
                record.outcome.as_str(),
                record.external_mutation_id,
                record.applied_at.to_rfc3339(),
                record.error_kind,
            ],
        )? == 1;

        let stored = tx.query_row(
            "SELECT idempotency_key, proposal_id, outcome, external_mutation_id, applied_at, error_kind
             FROM application_records
             WHERE idempotency_key = ?1",
            params![record.idempotency_key.as_str()],
            |row| Ok(Self::map_row(row)),
        )??;
        tx.commit()?;

        if !inserted {
            tracing::debug!(key = %stored.idempotency_key, "ledger write suppressed, key already present");
        }
        Ok(WriteIfAbsent {
            inserted,
            record: stored,
        })
    }

    async fn find_by_proposal(
        &self,
        proposal_id: ProposalId,
    ) -> Result<Option<ApplicationRecord>, LedgerError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT idempotency_key, proposal_id, outcome, external_mutation_id, applied_at, error_kind
             FROM application_records
             WHERE proposal_id = ?1",
        )?;
        let mut rows = stmt.query(params![proposal_id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(Self::map_row(row)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_collision_returns_first_record() {
        let ledger = SqliteLedger::in_memory().unwrap();
        let id = ProposalId::new();

        let first = ledger
            .write_if_absent(ApplicationRecord::success(id, "gh-9"))
            .await
            .unwrap();
        assert!(first.inserted);

        let second = ledger
            .write_if_absent(ApplicationRecord::failure(id, "tracker_permanent"))
            .await
            .unwrap();
        assert!(!second.inserted);
        assert_eq!(second.record.outcome, Outcome::Success);
        assert_eq!(second.record.external_mutation_id.as_deref(), Some("gh-9"));
    }

    #[tokio::test]
    async fn records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        let id = ProposalId::new();

        {
            let ledger = SqliteLedger::open(&path).unwrap();
            ledger
                .write_if_absent(ApplicationRecord::success(id, "gh-10"))
                .await
                .unwrap();
        }

        let reopened = SqliteLedger::open(&path).unwrap();
        let found = reopened.find_by_proposal(id).await.unwrap().unwrap();
        assert_eq!(found.outcome, Outcome::Success);
        assert_eq!(found.external_mutation_id.as_deref(), Some("gh-10"));
        assert_eq!(found.idempotency_key, IdempotencyKey::derive(id));
    }

    #[tokio::test]
    async fn missing_proposal_reads_back_none() {
        let ledger = SqliteLedger::in_memory().unwrap();
        assert!(ledger
            .find_by_proposal(ProposalId::new())
            .await
            .unwrap()
            .is_none());
    }
}
