// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Key repository.
//!
//! Rows hold the sealed private key (JSON envelope), never plaintext.

use std::fmt;

use chrono::{DateTime, Utc};
use redb::ReadableTable;
use serde::{Deserialize, Serialize};

use crate::crypto::{EcCurve, KeyAlgorithm, KeyFormat};
use crate::storage::database::{next_id, KeyDatabase, StoreError, StoreResult, KEYS};

const KEY_SEQUENCE: &str = "keys";

/// Key lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    #[default]
    Active,
    /// The key's certificate appears on its organization's CRL.
    Revoked,
    /// Past `expires_at`. Derived on read, see [`KeyRecord::effective_status`].
    Expired,
}

impl fmt::Display for KeyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            KeyStatus::Active => "active",
            KeyStatus::Revoked => "revoked",
            KeyStatus::Expired => "expired",
        })
    }
}

/// Persisted key row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyRecord {
    /// Assigned by [`KeyRepository::insert`]; ignored on input.
    pub id: u64,
    /// Human-readable label, not unique.
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Algorithm family.
    pub algorithm: KeyAlgorithm,
    /// RSA modulus bits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_size: Option<u32>,
    /// EC curve.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub curve: Option<EcCurve>,
    pub format: KeyFormat,
    /// SPKI PEM, or uncompressed hex for secp256k1.
    pub public_key: String,
    /// JSON envelope `{"iv","data","authTag"}`.
    pub encrypted_private_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// PEM certificate, self-signed or CA-signed.
    pub certificate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Set for secp256k1 keys only.
    pub ethereum_address: Option<String>,
    /// Hex SHA-256 of the raw public key bytes.
    pub sha256_fingerprint: String,
    pub sha1_fingerprint: String,
    /// Stored lifecycle status.
    pub status: KeyStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Certificate NotAfter when a certificate is present.
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_rotated_at: Option<DateTime<Utc>>,
    /// Provider that owns the key.
    pub provider_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Whether the certificate is a CA certificate.
    pub is_ca: bool,
    /// CA key that signed this key's certificate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signing_key_id: Option<u64>,
}

impl KeyRecord {
    /// Stored status, with an active key whose expiry has passed reported as
    /// expired.
    pub fn effective_status(&self, now: DateTime<Utc>) -> KeyStatus {
        match (self.status, self.expires_at) {
            (KeyStatus::Active, Some(expires_at)) if expires_at <= now => KeyStatus::Expired,
            (status, _) => status,
        }
    }
}

/// Repository for key rows.
pub struct KeyRepository<'a> {
    db: &'a KeyDatabase,
}

impl<'a> KeyRepository<'a> {
    /// Bind the repository to an open database.
    pub fn new(db: &'a KeyDatabase) -> Self {
        Self { db }
    }

    /// Persist a new key and return it with its allocated id.
    pub fn insert(&self, mut record: KeyRecord) -> StoreResult<KeyRecord> {
        let write_txn = self.db.begin_write()?;
        {
            record.id = next_id(&write_txn, KEY_SEQUENCE)?;
            let json = serde_json::to_vec(&record)?;
            let mut table = write_txn.open_table(KEYS)?;
            table.insert(record.id, json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(record)
    }

    /// Fetch a key by id.
    pub fn get(&self, key_id: u64) -> StoreResult<Option<KeyRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(KEYS)?;
        match table.get(key_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Like [`get`](Self::get) but a missing row is `StoreError::NotFound`.
    #[cfg(test)]
    pub(crate) fn require(&self, key_id: u64) -> StoreResult<KeyRecord> {
        self.get(key_id)?
            .ok_or_else(|| StoreError::NotFound(format!("key {key_id}")))
    }

    /// Change a key's lifecycle status.
    pub fn set_status(&self, key_id: u64, status: KeyStatus) -> StoreResult<KeyRecord> {
        self.modify(key_id, |record| record.status = status)
    }

    /// Attach a CA-signed certificate to a key in a single transaction:
    /// certificate, expiry and issuing CA are written together. Such
    /// certificates are leaves, so the CA flag is cleared.
    pub fn apply_certificate(
        &self,
        key_id: u64,
        certificate: &str,
        expires_at: DateTime<Utc>,
        signing_key_id: Option<u64>,
    ) -> StoreResult<KeyRecord> {
        self.modify(key_id, |record| {
            record.certificate = Some(certificate.to_string());
            record.expires_at = Some(expires_at);
            record.signing_key_id = signing_key_id;
            record.is_ca = false;
        })
    }

    /// Read-modify-write of one row inside a single write transaction.
    fn modify(&self, key_id: u64, change: impl FnOnce(&mut KeyRecord)) -> StoreResult<KeyRecord> {
        let write_txn = self.db.begin_write()?;
        let updated = {
            let mut table = write_txn.open_table(KEYS)?;

            let existing_bytes = {
                let existing = table
                    .get(key_id)?
                    .ok_or_else(|| StoreError::NotFound(format!("key {key_id}")))?;
                existing.value().to_vec()
            };

            let mut record: KeyRecord = serde_json::from_slice(&existing_bytes)?;
            change(&mut record);

            let json = serde_json::to_vec(&record)?;
            table.insert(key_id, json.as_slice())?;
            record
        };
        write_txn.commit()?;
        Ok(updated)
    }

    /// Remove a key. Returns `false` if it did not exist.
    pub fn delete(&self, key_id: u64) -> StoreResult<bool> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(KEYS)?;
            let existed = table.remove(key_id)?.is_some();
            existed
        };
        write_txn.commit()?;
        Ok(removed)
    }

    /// All keys in id order.
    pub fn list(&self) -> StoreResult<Vec<KeyRecord>> {
        self.list_where(|_| true)
    }

    /// Keys owned by one provider, in id order.
    pub fn list_by_provider(&self, provider_id: u64) -> StoreResult<Vec<KeyRecord>> {
        self.list_where(|record| record.provider_id == provider_id)
    }

    fn list_where(&self, keep: impl Fn(&KeyRecord) -> bool) -> StoreResult<Vec<KeyRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(KEYS)?;
        let mut records = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            let record: KeyRecord = serde_json::from_slice(value.value())?;
            if keep(&record) {
                records.push(record);
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_key(name: &str, provider_id: u64) -> KeyRecord {
        KeyRecord {
            id: 0,
            name: name.to_string(),
            description: None,
            algorithm: KeyAlgorithm::Ec,
            key_size: None,
            curve: Some(EcCurve::P256),
            format: KeyFormat::Pem,
            public_key: "-----BEGIN PUBLIC KEY-----".to_string(),
            encrypted_private_key: r#"{"iv":"","data":"","authTag":""}"#.to_string(),
            certificate: None,
            ethereum_address: None,
            sha256_fingerprint: "00".repeat(32),
            sha1_fingerprint: "00".repeat(20),
            status: KeyStatus::Active,
            created_at: Utc::now(),
            expires_at: None,
            last_rotated_at: None,
            provider_id,
            user_id: None,
            is_ca: false,
            signing_key_id: None,
        }
    }

    fn temp_db() -> (KeyDatabase, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = KeyDatabase::open(&dir.path().join("keys.redb")).unwrap();
        (db, dir)
    }

    #[test]
    fn insert_assigns_sequential_ids() {
        let (db, _dir) = temp_db();
        let repo = KeyRepository::new(&db);
        let a = repo.insert(sample_key("a", 1)).unwrap();
        let b = repo.insert(sample_key("b", 1)).unwrap();
        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
        assert_eq!(repo.get(2).unwrap().unwrap().name, "b");
        assert!(repo.get(3).unwrap().is_none());
    }

    #[test]
    fn ids_are_not_reused_after_delete() {
        let (db, _dir) = temp_db();
        let repo = KeyRepository::new(&db);
        let a = repo.insert(sample_key("a", 1)).unwrap();
        assert!(repo.delete(a.id).unwrap());
        assert!(!repo.delete(a.id).unwrap());
        let b = repo.insert(sample_key("b", 1)).unwrap();
        assert_eq!(b.id, 2);
    }

    #[test]
    fn apply_certificate_writes_all_fields() {
        let (db, _dir) = temp_db();
        let repo = KeyRepository::new(&db);
        let mut leaf = sample_key("leaf", 1);
        leaf.is_ca = true;
        let key = repo.insert(leaf).unwrap();
        let expiry = Utc::now();

        let updated = repo
            .apply_certificate(key.id, "-----BEGIN CERTIFICATE-----", expiry, Some(7))
            .unwrap();
        assert_eq!(updated.signing_key_id, Some(7));

        let stored = repo.require(key.id).unwrap();
        assert_eq!(stored.certificate.as_deref(), Some("-----BEGIN CERTIFICATE-----"));
        assert_eq!(stored.expires_at, Some(expiry));
        assert_eq!(stored.signing_key_id, Some(7));
        assert!(!stored.is_ca);
    }

    #[test]
    fn missing_rows_are_not_found() {
        let (db, _dir) = temp_db();
        let repo = KeyRepository::new(&db);
        assert!(matches!(repo.require(9), Err(StoreError::NotFound(_))));
        assert!(matches!(
            repo.apply_certificate(9, "x", Utc::now(), None),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            repo.set_status(9, KeyStatus::Revoked),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn list_filters_by_provider() {
        let (db, _dir) = temp_db();
        let repo = KeyRepository::new(&db);
        repo.insert(sample_key("a", 1)).unwrap();
        repo.insert(sample_key("b", 2)).unwrap();
        repo.insert(sample_key("c", 1)).unwrap();

        assert_eq!(repo.list().unwrap().len(), 3);
        let names: Vec<String> = repo
            .list_by_provider(1)
            .unwrap()
            .into_iter()
            .map(|k| k.name)
            .collect();
        assert_eq!(names, vec!["a", "c"]);
    }

    #[test]
    fn set_status_persists() {
        let (db, _dir) = temp_db();
        let repo = KeyRepository::new(&db);
        let key = repo.insert(sample_key("a", 1)).unwrap();
        let updated = repo.set_status(key.id, KeyStatus::Revoked).unwrap();
        assert_eq!(updated.status, KeyStatus::Revoked);
        assert_eq!(repo.require(key.id).unwrap().status, KeyStatus::Revoked);
    }

    #[test]
    fn expiry_is_reported_as_expired() {
        let now = Utc::now();
        let mut key = sample_key("a", 1);
        assert_eq!(key.effective_status(now), KeyStatus::Active);

        key.expires_at = Some(now + chrono::Duration::days(1));
        assert_eq!(key.effective_status(now), KeyStatus::Active);

        key.expires_at = Some(now - chrono::Duration::seconds(1));
        assert_eq!(key.effective_status(now), KeyStatus::Expired);

        key.status = KeyStatus::Revoked;
        assert_eq!(key.effective_status(now), KeyStatus::Revoked);
    }
}
