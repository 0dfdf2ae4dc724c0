// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Organization repository.
//!
//! An organization owns a fixed role set of keys plus its CRL state. Keys
//! are referenced by id only; deleting an organization does not delete its
//! keys (the service layer does that explicitly).

use chrono::{DateTime, Utc};
use redb::{ReadableTable, WriteTransaction};
use serde::{Deserialize, Serialize};

use super::revocations;
use crate::storage::database::{next_id, KeyDatabase, StoreError, StoreResult, ORGANIZATIONS};

const ORGANIZATION_SEQUENCE: &str = "organizations";

/// Persisted organization row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationRecord {
    pub id: u64,
    /// Membership service provider id, unique across organizations.
    pub msp_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Signing CA; also signs the CRL.
    pub sign_key_id: Option<u64>,
    /// Self-signed TLS root CA key.
    pub tls_root_key_id: Option<u64>,
    pub admin_sign_key_id: Option<u64>,
    pub client_sign_key_id: Option<u64>,
    /// Key that authenticated the latest CRL state change.
    pub crl_key_id: Option<u64>,
    /// `None` until the CRL is initialized.
    pub crl_last_update: Option<DateTime<Utc>>,
    /// Number of the last CRL issued; 0 before the first.
    #[serde(default)]
    pub crl_number: u64,
    /// Provider holding the organization's keys.
    pub provider_id: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrganizationRecord {
    /// Key ids referenced by this organization, without duplicates.
    pub fn key_ids(&self) -> Vec<u64> {
        let mut ids = Vec::new();
        for id in [
            self.sign_key_id,
            self.tls_root_key_id,
            self.admin_sign_key_id,
            self.client_sign_key_id,
        ]
        .into_iter()
        .flatten()
        {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }
}

/// Repository for organization rows and the msp_id index.
pub struct OrganizationRepository<'a> {
    db: &'a KeyDatabase,
}

impl<'a> OrganizationRepository<'a> {
    /// Bind the repository to an open database.
    pub fn new(db: &'a KeyDatabase) -> Self {
        Self { db }
    }

    /// Persist a new organization. The MSP id must be unused.
    pub fn insert(&self, mut record: OrganizationRecord) -> StoreResult<OrganizationRecord> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(ORGANIZATIONS)?;
            for entry in table.iter()? {
                let (_, value) = entry?;
                let existing: OrganizationRecord = serde_json::from_slice(value.value())?;
                if existing.msp_id == record.msp_id {
                    return Err(StoreError::AlreadyExists(format!(
                        "organization with MSP id {}",
                        record.msp_id
                    )));
                }
            }
            drop(table);

            record.id = next_id(&write_txn, ORGANIZATION_SEQUENCE)?;
            let json = serde_json::to_vec(&record)?;
            let mut table = write_txn.open_table(ORGANIZATIONS)?;
            table.insert(record.id, json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(record)
    }

    /// Fetch an organization by id.
    pub fn get(&self, organization_id: u64) -> StoreResult<Option<OrganizationRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ORGANIZATIONS)?;
        match table.get(organization_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Like [`get`](Self::get) but a missing row is `StoreError::NotFound`.
    #[cfg(test)]
    pub(crate) fn require(&self, organization_id: u64) -> StoreResult<OrganizationRecord> {
        self.get(organization_id)?
            .ok_or_else(|| StoreError::NotFound(format!("organization {organization_id}")))
    }

    /// Look an organization up by its MSP identifier.
    pub fn get_by_msp_id(&self, msp_id: &str) -> StoreResult<Option<OrganizationRecord>> {
        Ok(self.list()?.into_iter().find(|org| org.msp_id == msp_id))
    }

    /// All organizations in id order.
    pub fn list(&self) -> StoreResult<Vec<OrganizationRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ORGANIZATIONS)?;
        let mut records = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            records.push(serde_json::from_slice(value.value())?);
        }
        Ok(records)
    }

    /// Move the organization's CRL into the initialized state.
    ///
    /// Only the first call stamps `crl_last_update`; later calls return the
    /// stored row untouched.
    pub fn initialize_crl(
        &self,
        organization_id: u64,
        crl_key_id: u64,
        at: DateTime<Utc>,
    ) -> StoreResult<OrganizationRecord> {
        let write_txn = self.db.begin_write()?;
        let record = update_in(&write_txn, organization_id, |org| {
            if org.crl_last_update.is_none() {
                org.crl_last_update = Some(at);
                org.crl_key_id = Some(crl_key_id);
                org.updated_at = at;
            }
        })?;
        write_txn.commit()?;
        Ok(record)
    }

    /// Allocate the next CRL number for an organization.
    pub fn next_crl_number(&self, organization_id: u64) -> StoreResult<u64> {
        let write_txn = self.db.begin_write()?;
        let record = update_in(&write_txn, organization_id, |org| {
            org.crl_number += 1;
        })?;
        write_txn.commit()?;
        Ok(record.crl_number)
    }

    /// Delete an organization and its revocation rows in one transaction.
    ///
    /// Returns the removed row, or `None` if it did not exist.
    pub fn delete_cascade(&self, organization_id: u64) -> StoreResult<Option<OrganizationRecord>> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(ORGANIZATIONS)?;
            let removed = match table.remove(organization_id)? {
                Some(value) => Some(serde_json::from_slice::<OrganizationRecord>(value.value())?),
                None => None,
            };
            removed
        };
        if removed.is_some() {
            let count = revocations::remove_all_in(&write_txn, organization_id)?;
            tracing::debug!(organization_id, revocations = count, "Cascaded revocation rows");
        }
        write_txn.commit()?;
        Ok(removed)
    }
}

/// Read-modify-write an organization row inside an open transaction.
pub(crate) fn update_in(
    write_txn: &WriteTransaction,
    organization_id: u64,
    mutate: impl FnOnce(&mut OrganizationRecord),
) -> StoreResult<OrganizationRecord> {
    let mut table = write_txn.open_table(ORGANIZATIONS)?;
    let existing_bytes = {
        let existing = table
            .get(organization_id)?
            .ok_or_else(|| StoreError::NotFound(format!("organization {organization_id}")))?;
        existing.value().to_vec()
    };

    let mut record: OrganizationRecord = serde_json::from_slice(&existing_bytes)?;
    mutate(&mut record);

    let json = serde_json::to_vec(&record)?;
    table.insert(organization_id, json.as_slice())?;
    Ok(record)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_org(msp_id: &str) -> OrganizationRecord {
        let now = Utc::now();
        OrganizationRecord {
            id: 0,
            msp_id: msp_id.to_string(),
            description: None,
            sign_key_id: Some(1),
            tls_root_key_id: Some(2),
            admin_sign_key_id: Some(3),
            client_sign_key_id: Some(3),
            crl_key_id: None,
            crl_last_update: None,
            crl_number: 0,
            provider_id: 1,
            created_at: now,
            updated_at: now,
        }
    }

    fn temp_db() -> (KeyDatabase, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = KeyDatabase::open(&dir.path().join("keys.redb")).unwrap();
        (db, dir)
    }

    #[test]
    fn insert_and_lookup_by_msp_id() {
        let (db, _dir) = temp_db();
        let repo = OrganizationRepository::new(&db);
        let org = repo.insert(sample_org("Org1MSP")).unwrap();
        assert_eq!(org.id, 1);
        assert_eq!(repo.require(1).unwrap().msp_id, "Org1MSP");
        assert_eq!(repo.get_by_msp_id("Org1MSP").unwrap().unwrap().id, 1);
        assert!(repo.get_by_msp_id("Org2MSP").unwrap().is_none());
    }

    #[test]
    fn duplicate_msp_id_is_rejected() {
        let (db, _dir) = temp_db();
        let repo = OrganizationRepository::new(&db);
        repo.insert(sample_org("Org1MSP")).unwrap();
        assert!(matches!(
            repo.insert(sample_org("Org1MSP")),
            Err(StoreError::AlreadyExists(_))
        ));
        assert_eq!(repo.list().unwrap().len(), 1);
    }

    #[test]
    fn key_ids_are_deduplicated() {
        assert_eq!(sample_org("x").key_ids(), vec![1, 2, 3]);
    }

    #[test]
    fn crl_initialization_is_stamped_once() {
        let (db, _dir) = temp_db();
        let repo = OrganizationRepository::new(&db);
        let org = repo.insert(sample_org("Org1MSP")).unwrap();

        let first = Utc::now();
        let initialized = repo.initialize_crl(org.id, 1, first).unwrap();
        assert_eq!(initialized.crl_last_update, Some(first));
        assert_eq!(initialized.crl_key_id, Some(1));

        let again = repo
            .initialize_crl(org.id, 1, first + chrono::Duration::hours(1))
            .unwrap();
        assert_eq!(again.crl_last_update, Some(first));
    }

    #[test]
    fn crl_numbers_increase() {
        let (db, _dir) = temp_db();
        let repo = OrganizationRepository::new(&db);
        let org = repo.insert(sample_org("Org1MSP")).unwrap();
        assert_eq!(repo.next_crl_number(org.id).unwrap(), 1);
        assert_eq!(repo.next_crl_number(org.id).unwrap(), 2);
        assert!(matches!(repo.next_crl_number(99), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn delete_missing_organization_returns_none() {
        let (db, _dir) = temp_db();
        let repo = OrganizationRepository::new(&db);
        assert!(repo.delete_cascade(5).unwrap().is_none());
    }
}
