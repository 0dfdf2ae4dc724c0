// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded key database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `keys`: key_id → serialized KeyRecord
//! - `organizations`: organization_id → serialized OrganizationRecord
//! - `revoked_certificates`: composite key (organization_id|serial) → serialized row
//! - `key_providers`: provider_id → serialized KeyProviderRecord
//! - `audit_events`: composite key (timestamp|event_id) → serialized AuditEvent
//! - `sequences`: sequence name → last allocated id

use std::path::Path;

use redb::{Database, ReadTransaction, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};

// =============================================================================
// Table Definitions
// =============================================================================

/// Primary key table: key_id → KeyRecord (JSON bytes).
pub(crate) const KEYS: TableDefinition<u64, &[u8]> = TableDefinition::new("keys");

/// Owning entities: organization_id → OrganizationRecord (JSON bytes).
pub(crate) const ORGANIZATIONS: TableDefinition<u64, &[u8]> = TableDefinition::new("organizations");

/// Revocations: `organization_id(20 digits)|serial_hex` → RevokedCertificateRecord.
/// The composite key doubles as the (organization, serial) uniqueness constraint.
pub(crate) const REVOKED_CERTIFICATES: TableDefinition<&str, &[u8]> =
    TableDefinition::new("revoked_certificates");

/// Provider registry: provider_id → KeyProviderRecord (JSON bytes).
pub(crate) const KEY_PROVIDERS: TableDefinition<u64, &[u8]> = TableDefinition::new("key_providers");

/// Audit trail: `rfc3339_timestamp|event_id` → AuditEvent (JSON bytes).
pub(crate) const AUDIT_EVENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("audit_events");

/// Id allocation: sequence name → last issued id.
const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// KeyDatabase
// =============================================================================

/// Embedded ACID database holding keys, organizations and revocations.
pub struct KeyDatabase {
    db: Database,
}

impl KeyDatabase {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(KEYS)?;
            let _ = write_txn.open_table(ORGANIZATIONS)?;
            let _ = write_txn.open_table(REVOKED_CERTIFICATES)?;
            let _ = write_txn.open_table(KEY_PROVIDERS)?;
            let _ = write_txn.open_table(AUDIT_EVENTS)?;
            let _ = write_txn.open_table(SEQUENCES)?;
        }
        write_txn.commit()?;

        tracing::debug!(path = %path.display(), "Key database opened");
        Ok(Self { db })
    }

    pub(crate) fn begin_write(&self) -> StoreResult<WriteTransaction> {
        Ok(self.db.begin_write()?)
    }

    pub(crate) fn begin_read(&self) -> StoreResult<ReadTransaction> {
        Ok(self.db.begin_read()?)
    }
}

// =============================================================================
// Helpers shared by the repositories
// =============================================================================

/// Allocate the next id of a named sequence inside an open write transaction.
///
/// Ids start at 1 and are never reused, even after deletes.
pub(crate) fn next_id(txn: &WriteTransaction, sequence: &str) -> StoreResult<u64> {
    let mut table = txn.open_table(SEQUENCES)?;
    let current = table.get(sequence)?.map(|v| v.value()).unwrap_or(0);
    let next = current + 1;
    table.insert(sequence, next)?;
    Ok(next)
}

/// Composite key for the revocation table.
///
/// The organization id is zero-padded so that a prefix range scan returns
/// exactly one organization's rows, ordered by serial.
pub(crate) fn revocation_key(organization_id: u64, serial_hex: &str) -> String {
    format!("{organization_id:020}|{serial_hex}")
}

/// Half-open range `[start, end)` covering every revocation of an organization.
pub(crate) fn revocation_range(organization_id: u64) -> (String, String) {
    // '}' sorts directly after '|'
    (
        format!("{organization_id:020}|"),
        format!("{organization_id:020}}}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_db() -> (KeyDatabase, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = KeyDatabase::open(&dir.path().join("keys.redb")).unwrap();
        (db, dir)
    }

    #[test]
    fn open_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("keys.redb");
        KeyDatabase::open(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn sequences_are_monotonic_and_independent() {
        let (db, _dir) = temp_db();
        let txn = db.begin_write().unwrap();
        assert_eq!(next_id(&txn, "keys").unwrap(), 1);
        assert_eq!(next_id(&txn, "keys").unwrap(), 2);
        assert_eq!(next_id(&txn, "organizations").unwrap(), 1);
        txn.commit().unwrap();

        let txn = db.begin_write().unwrap();
        assert_eq!(next_id(&txn, "keys").unwrap(), 3);
        txn.commit().unwrap();
    }

    #[test]
    fn aborted_transaction_does_not_consume_ids() {
        let (db, _dir) = temp_db();
        {
            let txn = db.begin_write().unwrap();
            assert_eq!(next_id(&txn, "keys").unwrap(), 1);
            // dropped without commit
        }
        let txn = db.begin_write().unwrap();
        assert_eq!(next_id(&txn, "keys").unwrap(), 1);
    }

    #[test]
    fn revocation_range_isolates_organizations() {
        let (start, end) = revocation_range(4);
        let own = revocation_key(4, "ffff");
        let other = revocation_key(40, "01");
        assert!(own.as_str() >= start.as_str() && own.as_str() < end.as_str());
        assert!(!(other.as_str() >= start.as_str() && other.as_str() < end.as_str()));
    }
}
