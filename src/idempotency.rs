//! Idempotency Coordinator.
//!
//! Bridges a ledger transaction and an off-chain record write so that, per
//! key, both happen at most once and a retry after success observes the
//! original result.
//!
//! Record lifecycle:
//!
//! ```text
//!   (absent) --claim--> Pending --ledger ok--> Pending+tx --record ok--> Completed
//!                          |                        |
//!                          +--rejected/no-op--> Failed (reclaimable)
//!                          +--timeout: stays Pending, reclaimable after TTL
//!                                                   +--record failed: stays Pending+tx
//! ```
//!
//! A `Pending` record without a transaction signature may be reclaimed once it
//! is older than the pending TTL. A `Pending` record carrying a signature is
//! never reclaimed automatically: the ledger side already happened.
//!
//! Every write after the claim is conditional on the claim still being held
//! (`Pending` with the same `created_at`), so a holder whose key was reclaimed
//! cannot overwrite the new claimant.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use log::{error, info, warn};
use serde::Serialize;
use serde_json::Value;
use solana_program::hash::hashv;

use crate::clock::Clock;
use crate::error::AgentError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdempotencyStatus {
    Pending,
    Completed,
    Failed,
}

impl fmt::Display for IdempotencyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IdempotencyStatus::Pending => "pending",
            IdempotencyStatus::Completed => "completed",
            IdempotencyStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IdempotencyRecord {
    pub key: String,
    pub status: IdempotencyStatus,
    pub tx_signature: Option<String>,
    pub db_record_id: Option<String>,
    /// Result returned to the first caller, replayed to retries
    pub result: Option<Value>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl IdempotencyRecord {
    fn pending(key: &str, now: i64) -> Self {
        Self {
            key: key.to_string(),
            status: IdempotencyStatus::Pending,
            tx_signature: None,
            db_record_id: None,
            result: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this is the live claim made at `claimed_at`.
    pub fn is_held(&self, claimed_at: i64) -> bool {
        self.status == IdempotencyStatus::Pending && self.created_at == claimed_at
    }

    /// Whether a new `begin` may take this record over.
    pub fn is_reclaimable(&self, now: i64, pending_ttl_secs: u64) -> bool {
        match self.status {
            IdempotencyStatus::Failed => true,
            IdempotencyStatus::Completed => false,
            IdempotencyStatus::Pending => {
                self.tx_signature.is_none()
                    && crate::math::elapsed_seconds(now, self.updated_at) >= pending_ttl_secs
            }
        }
    }
}

/// Result of an atomic claim.
#[derive(Debug, Clone, PartialEq)]
pub enum Claim {
    /// A fresh `Pending` record now belongs to the caller
    Claimed,
    /// A live record exists and was left untouched
    Existing(IdempotencyRecord),
}

/// Storage for idempotency records.
///
/// `claim` and `replace` must each be a single compare-and-set: two
/// concurrent callers with the same key can never both get `Claim::Claimed`,
/// and a stale holder can never overwrite a newer claim.
pub trait IdempotencyStore {
    fn claim(&self, key: &str, now: i64, pending_ttl_secs: u64) -> Result<Claim, AgentError>;
    fn get(&self, key: &str) -> Result<Option<IdempotencyRecord>, AgentError>;
    /// Store `record` only if the current record is still the claim made at
    /// `claimed_at`. Returns whether the write happened.
    fn replace(&self, claimed_at: i64, record: IdempotencyRecord) -> Result<bool, AgentError>;
}

impl<T: IdempotencyStore + ?Sized> IdempotencyStore for Arc<T> {
    fn claim(&self, key: &str, now: i64, pending_ttl_secs: u64) -> Result<Claim, AgentError> {
        (**self).claim(key, now, pending_ttl_secs)
    }
    fn get(&self, key: &str) -> Result<Option<IdempotencyRecord>, AgentError> {
        (**self).get(key)
    }
    fn replace(&self, claimed_at: i64, record: IdempotencyRecord) -> Result<bool, AgentError> {
        (**self).replace(claimed_at, record)
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, IdempotencyRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, IdempotencyRecord>>, AgentError> {
        self.records
            .lock()
            .map_err(|_| AgentError::Store("idempotency store lock poisoned".to_string()))
    }
}

impl IdempotencyStore for MemoryStore {
    fn claim(&self, key: &str, now: i64, pending_ttl_secs: u64) -> Result<Claim, AgentError> {
        let mut records = self.lock()?;
        if let Some(existing) = records.get(key) {
            if !existing.is_reclaimable(now, pending_ttl_secs) {
                return Ok(Claim::Existing(existing.clone()));
            }
        }
        records.insert(key.to_string(), IdempotencyRecord::pending(key, now));
        Ok(Claim::Claimed)
    }

    fn get(&self, key: &str) -> Result<Option<IdempotencyRecord>, AgentError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn replace(&self, claimed_at: i64, record: IdempotencyRecord) -> Result<bool, AgentError> {
        let mut records = self.lock()?;
        match records.get(&record.key) {
            Some(current) if current.is_held(claimed_at) => {
                records.insert(record.key.clone(), record);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// Off-chain record written once the ledger transaction is confirmed.
pub trait RecordSink {
    /// Persist a row and return its id.
    fn insert(&self, kind: &str, tx_signature: &str, body: &serde_json::Value) -> Result<String, AgentError>;
}

impl<T: RecordSink + ?Sized> RecordSink for Arc<T> {
    fn insert(&self, kind: &str, tx_signature: &str, body: &serde_json::Value) -> Result<String, AgentError> {
        (**self).insert(kind, tx_signature, body)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredRow {
    pub id: String,
    pub kind: String,
    pub tx_signature: String,
    pub body: serde_json::Value,
}

#[derive(Debug, Default)]
pub struct MemoryRecordSink {
    rows: Mutex<Vec<StoredRow>>,
}

impl MemoryRecordSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> Result<Vec<StoredRow>, AgentError> {
        self.rows
            .lock()
            .map(|rows| rows.clone())
            .map_err(|_| AgentError::Store("record sink lock poisoned".to_string()))
    }
}

impl RecordSink for MemoryRecordSink {
    fn insert(&self, kind: &str, tx_signature: &str, body: &serde_json::Value) -> Result<String, AgentError> {
        let mut rows = self
            .rows
            .lock()
            .map_err(|_| AgentError::Store("record sink lock poisoned".to_string()))?;
        let id = format!("{}-{}", kind, rows.len() + 1);
        rows.push(StoredRow {
            id: id.clone(),
            kind: kind.to_string(),
            tx_signature: tx_signature.to_string(),
            body: body.clone(),
        });
        Ok(id)
    }
}

/// Server-side key when the client supplies none:
/// base58(sha256(operation || 0x00 || payload)).
pub fn derive_key(operation: &str, payload: &[u8]) -> String {
    hashv(&[operation.as_bytes(), &[0u8], payload]).to_string()
}

#[derive(Debug, Clone, PartialEq)]
pub enum Begin {
    /// Key claimed at `claimed_at`; pass it to every later write
    Proceed { claimed_at: i64 },
    /// Already completed: return the stored result, do nothing
    Replay { tx_signature: String, db_record_id: String, result: Option<Value> },
}

/// What the guarded ledger step did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission<T> {
    Landed { tx_signature: String, value: T },
    /// Nothing was written to the ledger; the key is released
    NoEffect(T),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Executed<T> {
    Completed { tx_signature: String, db_record_id: String, value: T },
    /// `result` is the first run's value as stored JSON
    Replayed { tx_signature: String, db_record_id: String, result: Option<Value> },
    NoEffect(T),
}

pub struct IdempotencyCoordinator<S: IdempotencyStore, C: Clock> {
    store: S,
    clock: C,
    pending_ttl_secs: u64,
}

impl<S: IdempotencyStore, C: Clock> IdempotencyCoordinator<S, C> {
    pub fn new(store: S, clock: C, pending_ttl_secs: u64) -> Self {
        Self { store, clock, pending_ttl_secs }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// # Errors
    /// * `IdempotencyConflict` when the key is `Pending` and not yet reclaimable
    pub fn begin(&self, key: &str) -> Result<Begin, AgentError> {
        let now = self.clock.unix_timestamp();
        match self.store.claim(key, now, self.pending_ttl_secs)? {
            Claim::Claimed => Ok(Begin::Proceed { claimed_at: now }),
            Claim::Existing(record) => match record.status {
                IdempotencyStatus::Completed => Ok(Begin::Replay {
                    tx_signature: record.tx_signature.unwrap_or_default(),
                    db_record_id: record.db_record_id.unwrap_or_default(),
                    result: record.result,
                }),
                _ => Err(AgentError::IdempotencyConflict { key: key.to_string() }),
            },
        }
    }

    /// Load the record under a live claim.
    ///
    /// # Errors
    /// * `IdempotencyConflict` when the claim was reclaimed by another caller
    fn held(&self, key: &str, claimed_at: i64) -> Result<IdempotencyRecord, AgentError> {
        match self.store.get(key)? {
            Some(record) if record.is_held(claimed_at) => Ok(record),
            _ => Err(AgentError::IdempotencyConflict { key: key.to_string() }),
        }
    }

    fn write(&self, key: &str, claimed_at: i64, mut record: IdempotencyRecord) -> Result<(), AgentError> {
        record.updated_at = self.clock.unix_timestamp();
        if self.store.replace(claimed_at, record)? {
            Ok(())
        } else {
            Err(AgentError::IdempotencyConflict { key: key.to_string() })
        }
    }

    /// Note that the ledger transaction confirmed. The record stays `Pending`
    /// until the off-chain write commits.
    pub fn checkpoint(&self, key: &str, claimed_at: i64, tx_signature: &str) -> Result<(), AgentError> {
        let mut record = self.held(key, claimed_at)?;
        record.tx_signature = Some(tx_signature.to_string());
        self.write(key, claimed_at, record)
    }

    pub fn complete(
        &self,
        key: &str,
        claimed_at: i64,
        tx_signature: &str,
        db_record_id: &str,
        result: Option<Value>,
    ) -> Result<(), AgentError> {
        let mut record = self.held(key, claimed_at)?;
        record.status = IdempotencyStatus::Completed;
        record.tx_signature = Some(tx_signature.to_string());
        record.db_record_id = Some(db_record_id.to_string());
        record.result = result;
        self.write(key, claimed_at, record)
    }

    pub fn fail(&self, key: &str, claimed_at: i64) -> Result<(), AgentError> {
        let mut record = self.held(key, claimed_at)?;
        record.status = IdempotencyStatus::Failed;
        self.write(key, claimed_at, record)
    }

    /// Run `submit` then `record` under `key`.
    ///
    /// A confirmation timeout leaves the key `Pending` (outcome unknown). A
    /// failed `record` after a landed transaction leaves it `Pending` with the
    /// signature attached, for manual reconciliation.
    pub fn execute<T: Serialize>(
        &self,
        key: &str,
        submit: impl FnOnce() -> Result<Submission<T>, AgentError>,
        record: impl FnOnce(&str, &T) -> Result<String, AgentError>,
    ) -> Result<Executed<T>, AgentError> {
        let claimed_at = match self.begin(key)? {
            Begin::Proceed { claimed_at } => claimed_at,
            Begin::Replay { tx_signature, db_record_id, result } => {
                info!("Idempotent replay: key={} signature={}", key, tx_signature);
                return Ok(Executed::Replayed { tx_signature, db_record_id, result });
            }
        };

        let (tx_signature, value) = match submit() {
            Ok(Submission::Landed { tx_signature, value }) => (tx_signature, value),
            Ok(Submission::NoEffect(value)) => {
                self.fail(key, claimed_at)?;
                return Ok(Executed::NoEffect(value));
            }
            Err(e) if e.is_outcome_unknown() => {
                warn!("Outcome unknown, key left pending: key={} error={}", key, e);
                return Err(e);
            }
            Err(e) => {
                if let Err(lost) = self.fail(key, claimed_at) {
                    warn!("Could not release key: key={} error={}", key, lost);
                }
                return Err(e);
            }
        };
        self.checkpoint(key, claimed_at, &tx_signature).map_err(|e| {
            error!("Ledger committed but claim lost: key={} signature={} error={}", key, tx_signature, e);
            e
        })?;

        let db_record_id = record(&tx_signature, &value).map_err(|e| {
            error!(
                "Record write failed after ledger commit: key={} signature={} error={}",
                key, tx_signature, e
            );
            e
        })?;
        let result = serde_json::to_value(&value)
            .map_err(|e| warn!("Result not stored for replay: key={} error={}", key, e))
            .ok();
        self.complete(key, claimed_at, &tx_signature, &db_record_id, result)?;
        Ok(Executed::Completed { tx_signature, db_record_id, value })
    }
}
