// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Revoked certificate repository.
//!
//! Append-only: rows are never updated, and only removed when their owning
//! organization is deleted.

use chrono::{DateTime, Utc};
use redb::{ReadableTable, WriteTransaction};
use serde::{Deserialize, Serialize};

use super::organizations::{self, OrganizationRecord};
use crate::crypto::RevocationReason;
use crate::storage::database::{
    revocation_key, revocation_range, KeyDatabase, StoreError, StoreResult, REVOKED_CERTIFICATES,
};

/// One revoked serial of one organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevokedCertificateRecord {
    /// Organization whose CRL lists the serial.
    pub organization_id: u64,
    /// Hex serial, normalized by the caller.
    pub serial_number: String,
    /// Revocation time written into the CRL entry.
    pub revoked_at: DateTime<Utc>,
    /// RFC 5280 CRLReason.
    pub reason: RevocationReason,
    /// Key whose certificate issued the revoked certificate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer_certificate_id: Option<u64>,
}

/// Repository for revoked certificate rows.
pub struct RevocationRepository<'a> {
    db: &'a KeyDatabase,
}

impl<'a> RevocationRepository<'a> {
    /// Bind the repository to an open database.
    pub fn new(db: &'a KeyDatabase) -> Self {
        Self { db }
    }

    /// Append a revocation and refresh the organization's CRL state in one
    /// transaction.
    ///
    /// Fails with `AlreadyExists` if the serial is already revoked for this
    /// organization, and `NotFound` if the organization does not exist.
    pub fn revoke(
        &self,
        record: &RevokedCertificateRecord,
        crl_key_id: u64,
    ) -> StoreResult<OrganizationRecord> {
        let key = revocation_key(record.organization_id, &record.serial_number);
        let json = serde_json::to_vec(record)?;

        let write_txn = self.db.begin_write()?;
        let organization = organizations::update_in(&write_txn, record.organization_id, |org| {
            org.crl_last_update = Some(record.revoked_at);
            org.crl_key_id = Some(crl_key_id);
            org.updated_at = record.revoked_at;
        })?;
        {
            let mut table = write_txn.open_table(REVOKED_CERTIFICATES)?;
            if table.get(key.as_str())?.is_some() {
                return Err(StoreError::AlreadyExists(format!(
                    "revocation of serial {} for organization {}",
                    record.serial_number, record.organization_id
                )));
            }
            table.insert(key.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(organization)
    }

    /// Fetch one revocation by organization and normalized serial.
    #[cfg(test)]
    pub(crate) fn get(
        &self,
        organization_id: u64,
        serial_number: &str,
    ) -> StoreResult<Option<RevokedCertificateRecord>> {
        let key = revocation_key(organization_id, serial_number);
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(REVOKED_CERTIFICATES)?;
        match table.get(key.as_str())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Every revocation of an organization, ordered by serial string.
    pub fn list(&self, organization_id: u64) -> StoreResult<Vec<RevokedCertificateRecord>> {
        let (start, end) = revocation_range(organization_id);
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(REVOKED_CERTIFICATES)?;
        let mut records = Vec::new();
        for entry in table.range(start.as_str()..end.as_str())? {
            let (_, value) = entry?;
            records.push(serde_json::from_slice(value.value())?);
        }
        Ok(records)
    }
}

/// Remove every revocation of an organization inside an open transaction.
pub(crate) fn remove_all_in(write_txn: &WriteTransaction, organization_id: u64) -> StoreResult<usize> {
    let (start, end) = revocation_range(organization_id);
    let mut table = write_txn.open_table(REVOKED_CERTIFICATES)?;

    let mut keys = Vec::new();
    for entry in table.range(start.as_str()..end.as_str())? {
        let (key, _) = entry?;
        keys.push(key.value().to_string());
    }
    for key in &keys {
        table.remove(key.as_str())?;
    }
    Ok(keys.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::repository::organizations::tests::sample_org;
    use crate::storage::repository::OrganizationRepository;

    fn temp_db() -> (KeyDatabase, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = KeyDatabase::open(&dir.path().join("keys.redb")).unwrap();
        (db, dir)
    }

    fn revocation(organization_id: u64, serial: &str, reason: RevocationReason) -> RevokedCertificateRecord {
        RevokedCertificateRecord {
            organization_id,
            serial_number: serial.to_string(),
            revoked_at: Utc::now(),
            reason,
            issuer_certificate_id: None,
        }
    }

    #[test]
    fn revoke_appends_and_refreshes_organization() {
        let (db, _dir) = temp_db();
        let org = OrganizationRepository::new(&db)
            .insert(sample_org("Org1MSP"))
            .unwrap();
        let repo = RevocationRepository::new(&db);

        let row = revocation(org.id, "abc", RevocationReason::KeyCompromise);
        let updated = repo.revoke(&row, 1).unwrap();
        assert_eq!(updated.crl_last_update, Some(row.revoked_at));
        assert_eq!(updated.crl_key_id, Some(1));
        assert_eq!(repo.get(org.id, "abc").unwrap(), Some(row));
    }

    #[test]
    fn duplicate_serial_is_rejected_without_side_effects() {
        let (db, _dir) = temp_db();
        let orgs = OrganizationRepository::new(&db);
        let org = orgs.insert(sample_org("Org1MSP")).unwrap();
        let repo = RevocationRepository::new(&db);

        let first = revocation(org.id, "01", RevocationReason::KeyCompromise);
        repo.revoke(&first, 1).unwrap();

        let mut second = revocation(org.id, "01", RevocationReason::Superseded);
        second.revoked_at = first.revoked_at + chrono::Duration::hours(1);
        assert!(matches!(repo.revoke(&second, 1), Err(StoreError::AlreadyExists(_))));

        // original row and timestamp survive
        let stored = repo.get(org.id, "01").unwrap().unwrap();
        assert_eq!(stored.reason, RevocationReason::KeyCompromise);
        assert_eq!(
            orgs.require(org.id).unwrap().crl_last_update,
            Some(first.revoked_at)
        );
    }

    #[test]
    fn unknown_organization_is_not_found() {
        let (db, _dir) = temp_db();
        let repo = RevocationRepository::new(&db);
        let row = revocation(42, "01", RevocationReason::Unspecified);
        assert!(matches!(repo.revoke(&row, 1), Err(StoreError::NotFound(_))));
        assert!(repo.list(42).unwrap().is_empty());
    }

    #[test]
    fn list_is_scoped_to_organization() {
        let (db, _dir) = temp_db();
        let orgs = OrganizationRepository::new(&db);
        let org1 = orgs.insert(sample_org("Org1MSP")).unwrap();
        let org2 = orgs.insert(sample_org("Org2MSP")).unwrap();
        let repo = RevocationRepository::new(&db);

        repo.revoke(&revocation(org1.id, "0b", RevocationReason::Superseded), 1).unwrap();
        repo.revoke(&revocation(org1.id, "0a", RevocationReason::KeyCompromise), 1).unwrap();
        repo.revoke(&revocation(org2.id, "0a", RevocationReason::KeyCompromise), 1).unwrap();

        let serials: Vec<String> = repo
            .list(org1.id)
            .unwrap()
            .into_iter()
            .map(|r| r.serial_number)
            .collect();
        assert_eq!(serials, vec!["0a", "0b"]);
        assert_eq!(repo.list(org2.id).unwrap().len(), 1);
    }

    #[test]
    fn organization_delete_cascades_revocations() {
        let (db, _dir) = temp_db();
        let orgs = OrganizationRepository::new(&db);
        let org1 = orgs.insert(sample_org("Org1MSP")).unwrap();
        let org2 = orgs.insert(sample_org("Org2MSP")).unwrap();
        let repo = RevocationRepository::new(&db);
        repo.revoke(&revocation(org1.id, "01", RevocationReason::Unspecified), 1).unwrap();
        repo.revoke(&revocation(org1.id, "02", RevocationReason::Unspecified), 1).unwrap();
        repo.revoke(&revocation(org2.id, "01", RevocationReason::Unspecified), 1).unwrap();

        let removed = orgs.delete_cascade(org1.id).unwrap().unwrap();
        assert_eq!(removed.msp_id, "Org1MSP");
        assert!(orgs.get(org1.id).unwrap().is_none());
        assert!(repo.list(org1.id).unwrap().is_empty());
        assert_eq!(repo.list(org2.id).unwrap().len(), 1);
    }
}
