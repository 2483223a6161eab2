//! In-process audit store.
//!
//! Thread-safe, append-only record buffer. Records are never removed; once the
//! configured capacity is reached further appends fail with
//! `AuditWriteFailure` and the recorder logs them.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use super::{AuditEntry, AuditRecord, AuditStore};
use crate::error::{ConsoleError, ConsoleResult};

pub struct InMemoryAuditStore {
    records: RwLock<Vec<AuditRecord>>,
    max_records: usize,
    next_id: AtomicI64,
}

impl InMemoryAuditStore {
    /// `max_records == 0` keeps everything.
    pub fn new(max_records: usize) -> Self {
        Self {
            records: RwLock::new(Vec::with_capacity(max_records.min(10_000))),
            max_records,
            next_id: AtomicI64::new(1),
        }
    }

    /// Snapshot in insertion order.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.read().clone()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl Default for InMemoryAuditStore {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn append(&self, entry: &AuditEntry) -> ConsoleResult<()> {
        let mut records = self.records.write();
        if self.max_records > 0 && records.len() >= self.max_records {
            return Err(ConsoleError::AuditWriteFailure {
                message: format!("in-memory audit store is full ({} records)", self.max_records),
            });
        }
        // Id and timestamp are assigned under the lock so both follow write order.
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        records.push(AuditRecord::from_entry(id, entry.clone(), Utc::now()));
        Ok(())
    }

    async fn recent(&self, limit: usize) -> ConsoleResult<Vec<AuditRecord>> {
        let records = self.records.read();
        Ok(records.iter().rev().take(limit).cloned().collect())
    }
}
