// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Key provider registry.

use chrono::{DateTime, Utc};
use redb::ReadableTable;
use serde::{Deserialize, Serialize};

use crate::storage::database::{next_id, KeyDatabase, StoreResult, KEY_PROVIDERS};

const PROVIDER_SEQUENCE: &str = "key_providers";

/// Persisted provider row. `provider_type` holds the factory tag
/// (`DATABASE`, `HSM`, `HASHICORP_VAULT`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyProviderRecord {
    pub id: u64,
    /// Unique registration name.
    pub name: String,
    /// `ProviderType` tag, e.g. `DATABASE`.
    pub provider_type: String,
    /// At most one record is the default.
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

/// Repository for registered key providers.
pub struct ProviderRepository<'a> {
    db: &'a KeyDatabase,
}

impl<'a> ProviderRepository<'a> {
    /// Bind the repository to an open database.
    pub fn new(db: &'a KeyDatabase) -> Self {
        Self { db }
    }

    /// Register a provider. Registering a new default clears the flag on
    /// every other row in the same transaction.
    pub fn insert(
        &self,
        name: &str,
        provider_type: &str,
        is_default: bool,
    ) -> StoreResult<KeyProviderRecord> {
        let write_txn = self.db.begin_write()?;
        let record = {
            let record = KeyProviderRecord {
                id: next_id(&write_txn, PROVIDER_SEQUENCE)?,
                name: name.to_string(),
                provider_type: provider_type.to_string(),
                is_default,
                created_at: Utc::now(),
            };

            let mut table = write_txn.open_table(KEY_PROVIDERS)?;
            if is_default {
                let mut demoted = Vec::new();
                for entry in table.iter()? {
                    let (_, value) = entry?;
                    let mut existing: KeyProviderRecord = serde_json::from_slice(value.value())?;
                    if existing.is_default {
                        existing.is_default = false;
                        demoted.push(existing);
                    }
                }
                for existing in demoted {
                    let json = serde_json::to_vec(&existing)?;
                    table.insert(existing.id, json.as_slice())?;
                }
            }

            let json = serde_json::to_vec(&record)?;
            table.insert(record.id, json.as_slice())?;
            record
        };
        write_txn.commit()?;
        Ok(record)
    }

    /// Fetch a provider record by id.
    pub fn get(&self, provider_id: u64) -> StoreResult<Option<KeyProviderRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(KEY_PROVIDERS)?;
        match table.get(provider_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Like [`get`](Self::get) but a missing row is `StoreError::NotFound`.
    #[cfg(test)]
    pub(crate) fn require(&self, provider_id: u64) -> StoreResult<KeyProviderRecord> {
        self.get(provider_id)?
            .ok_or_else(|| crate::storage::StoreError::NotFound(format!("key provider {provider_id}")))
    }

    /// All provider records in id order.
    pub fn list(&self) -> StoreResult<Vec<KeyProviderRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(KEY_PROVIDERS)?;
        let mut records = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            records.push(serde_json::from_slice(value.value())?);
        }
        Ok(records)
    }

    /// The provider record flagged as default, if any.
    pub fn get_default(&self) -> StoreResult<Option<KeyProviderRecord>> {
        Ok(self.list()?.into_iter().find(|p| p.is_default))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StoreError;

    fn temp_db() -> (KeyDatabase, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = KeyDatabase::open(&dir.path().join("keys.redb")).unwrap();
        (db, dir)
    }

    #[test]
    fn insert_get_and_list() {
        let (db, _dir) = temp_db();
        let repo = ProviderRepository::new(&db);
        let p = repo.insert("local", "DATABASE", false).unwrap();
        assert_eq!(repo.require(p.id).unwrap(), p);
        assert_eq!(repo.list().unwrap().len(), 1);
        assert!(repo.get_default().unwrap().is_none());
        assert!(matches!(repo.require(99), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn only_one_default() {
        let (db, _dir) = temp_db();
        let repo = ProviderRepository::new(&db);
        let first = repo.insert("first", "DATABASE", true).unwrap();
        let second = repo.insert("second", "HSM", true).unwrap();

        assert_eq!(repo.get_default().unwrap().unwrap().id, second.id);
        assert!(!repo.require(first.id).unwrap().is_default);
    }
}
