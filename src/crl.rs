// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-organization certificate revocation.
//!
//! An organization's CRL is either uninitialized (`crl_last_update` unset)
//! or initialized. [`CrlManager::initialize`] and the first
//! [`CrlManager::revoke`] both move it to initialized; revocations are
//! append-only and a serial can be revoked once per organization.
//!
//! [`CrlManager::get_crl`] signs a fresh CRL on every call with the
//! organization's CRL key, bumping its persisted CRL number.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use crate::crypto::certificate::{self, CertificateAuthority};
use crate::crypto::crl::{build_crl, CrlEntry, RevocationReason};
use crate::error::{KeyError, KeyResult};
use crate::provider::KeyProvider;
use crate::storage::{
    AuditEvent, AuditEventType, AuditRepository, KeyDatabase, KeyRepository, KeyStatus,
    OrganizationRecord, OrganizationRepository, RevocationRepository, RevokedCertificateRecord,
    StoreError,
};

/// Days between ThisUpdate and NextUpdate.
pub const CRL_VALIDITY_DAYS: i64 = 7;

/// Per-organization revocation and CRL issuance.
pub struct CrlManager {
    db: Arc<KeyDatabase>,
    provider: Arc<dyn KeyProvider>,
}

impl CrlManager {
    pub fn new(db: Arc<KeyDatabase>, provider: Arc<dyn KeyProvider>) -> Self {
        Self { db, provider }
    }

    fn organizations(&self) -> OrganizationRepository<'_> {
        OrganizationRepository::new(&self.db)
    }

    fn audit(&self) -> AuditRepository<'_> {
        AuditRepository::new(&self.db)
    }

    fn require_organization(&self, organization_id: u64) -> KeyResult<OrganizationRecord> {
        self.organizations()
            .get(organization_id)?
            .ok_or_else(|| KeyError::NotFound(format!("organization {organization_id}")))
    }

    /// Key that signs the organization's CRL: its signing CA key, else the
    /// last recorded CRL key.
    fn crl_key_id(organization: &OrganizationRecord) -> KeyResult<u64> {
        organization
            .sign_key_id
            .or(organization.crl_key_id)
            .ok_or(KeyError::NoSigningKey(organization.id))
    }

    /// Put the organization's CRL into the initialized state.
    ///
    /// Safe to call repeatedly: later calls leave the row untouched.
    pub fn initialize(&self, organization_id: u64) -> KeyResult<OrganizationRecord> {
        let organization = self.require_organization(organization_id)?;
        let sign_key_id = organization
            .sign_key_id
            .ok_or(KeyError::NoSigningKey(organization_id))?;
        if organization.crl_last_update.is_some() {
            return Ok(organization);
        }

        match self.provider.retrieve_key(sign_key_id) {
            Ok(_) => {}
            Err(KeyError::NotFound(_)) => return Err(KeyError::NoSigningKey(organization_id)),
            Err(e) => return Err(e),
        }

        let now = Utc::now();
        let updated = self
            .organizations()
            .initialize_crl(organization_id, sign_key_id, now)?;

        tracing::info!(organization_id, crl_key_id = sign_key_id, "CRL initialized");
        self.audit().record(
            AuditEvent::new(AuditEventType::CrlInitialized)
                .with_resource("organization", organization_id)
                .with_details(json!({ "crl_key_id": sign_key_id })),
        );
        Ok(updated)
    }

    /// Revoke a certificate serial (hex) for an organization.
    ///
    /// `reason_code` is an RFC 5280 CRLReason value. Revoking on an
    /// uninitialized organization initializes its CRL. A managed key whose
    /// certificate carries the serial and was issued by the issuing key
    /// (`issuer_certificate_id`, else the CRL key) is marked revoked.
    pub fn revoke(
        &self,
        organization_id: u64,
        serial: &str,
        reason_code: u8,
        issuer_certificate_id: Option<u64>,
    ) -> KeyResult<RevokedCertificateRecord> {
        let reason = RevocationReason::from_code(reason_code).ok_or_else(|| {
            KeyError::InvalidParameters(format!("unknown revocation reason code {reason_code}"))
        })?;
        let serial_number = certificate::normalize_serial(serial).ok_or_else(|| {
            KeyError::InvalidParameters(format!("serial {serial:?} is not a hex number"))
        })?;

        let organization = self.require_organization(organization_id)?;
        let crl_key_id = Self::crl_key_id(&organization)?;

        let record = RevokedCertificateRecord {
            organization_id,
            serial_number,
            revoked_at: Utc::now(),
            reason,
            issuer_certificate_id,
        };
        RevocationRepository::new(&self.db)
            .revoke(&record, crl_key_id)
            .map_err(|e| match e {
                StoreError::AlreadyExists(_) => KeyError::AlreadyRevoked {
                    organization_id,
                    serial: record.serial_number.clone(),
                },
                StoreError::NotFound(_) => {
                    KeyError::NotFound(format!("organization {organization_id}"))
                }
                other => KeyError::Persistence(other),
            })?;

        let issuer_key_id = issuer_certificate_id.unwrap_or(crl_key_id);
        let revoked_keys = match self.mark_keys_revoked(issuer_key_id, &record.serial_number) {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(organization_id, error = %e, "Failed to mark revoked keys");
                Vec::new()
            }
        };

        tracing::info!(
            organization_id,
            serial = %record.serial_number,
            reason = %reason,
            revoked_keys = ?revoked_keys,
            "Certificate revoked"
        );
        self.audit().record(
            AuditEvent::new(AuditEventType::CertificateRevoked)
                .with_resource("organization", organization_id)
                .with_details(json!({
                    "serial": record.serial_number,
                    "reason": reason.code(),
                    "issuer_certificate_id": issuer_certificate_id,
                    "revoked_keys": revoked_keys,
                })),
        );
        Ok(record)
    }

    /// Flag stored keys holding the revoked certificate. Returns their ids.
    fn mark_keys_revoked(&self, issuer_key_id: u64, serial: &str) -> KeyResult<Vec<u64>> {
        let keys = KeyRepository::new(&self.db);
        let mut revoked = Vec::new();
        for key in keys.list()? {
            if key.signing_key_id != Some(issuer_key_id) || key.status == KeyStatus::Revoked {
                continue;
            }
            let Some(pem) = key.certificate.as_deref() else {
                continue;
            };
            let holds_serial = certificate::inspect(pem)
                .map(|info| info.serial_hex == serial)
                .unwrap_or(false);
            if holds_serial {
                keys.set_status(key.id, KeyStatus::Revoked)?;
                revoked.push(key.id);
            }
        }
        Ok(revoked)
    }

    /// Revocations of an organization in serial order.
    pub fn list_revoked(&self, organization_id: u64) -> KeyResult<Vec<RevokedCertificateRecord>> {
        self.require_organization(organization_id)?;
        Ok(RevocationRepository::new(&self.db).list(organization_id)?)
    }

    /// Sign and PEM-encode (`X509 CRL`) the organization's current CRL.
    pub fn get_crl(&self, organization_id: u64) -> KeyResult<String> {
        let organization = self.require_organization(organization_id)?;
        let crl_key_id = Self::crl_key_id(&organization)?;

        let entries = RevocationRepository::new(&self.db)
            .list(organization_id)?
            .into_iter()
            .map(|row| {
                let serial = certificate::serial_bytes(&row.serial_number).ok_or_else(|| {
                    KeyError::MalformedSerial {
                        organization_id,
                        serial: row.serial_number.clone(),
                    }
                })?;
                Ok(CrlEntry {
                    serial,
                    revoked_at: row.revoked_at,
                    reason: row.reason,
                })
            })
            .collect::<KeyResult<Vec<_>>>()?;

        let issuer = self.load_issuer(organization_id, crl_key_id)?;

        let crl_number = self.organizations().next_crl_number(organization_id)?;
        let this_update = Utc::now();
        let next_update = this_update + Duration::days(CRL_VALIDITY_DAYS);
        let pem = build_crl(&issuer, crl_number, this_update, next_update, &entries)?;

        tracing::info!(
            organization_id,
            crl_number,
            revoked = entries.len(),
            "CRL issued"
        );
        self.audit().record(
            AuditEvent::new(AuditEventType::CrlIssued)
                .with_resource("organization", organization_id)
                .with_details(json!({
                    "crl_number": crl_number,
                    "revoked": entries.len(),
                    "next_update": next_update,
                })),
        );
        Ok(pem)
    }

    /// Time the organization's CRL state last changed, if initialized.
    pub fn last_update(&self, organization_id: u64) -> KeyResult<Option<DateTime<Utc>>> {
        Ok(self.require_organization(organization_id)?.crl_last_update)
    }

    fn load_issuer(&self, organization_id: u64, key_id: u64) -> KeyResult<CertificateAuthority> {
        let key = match self.provider.retrieve_key(key_id) {
            Ok(key) => key,
            Err(KeyError::NotFound(_)) => return Err(KeyError::NoSigningKey(organization_id)),
            Err(e) => return Err(e),
        };
        let certificate = key
            .certificate
            .ok_or(KeyError::NoSigningKey(organization_id))?;
        let private_key = self.provider.get_decrypted_private_key(key_id)?;
        CertificateAuthority::load(private_key.expose(), &certificate)
    }
}
