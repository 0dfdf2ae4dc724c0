// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Database-backed key provider.
//!
//! Key pairs are generated in-process, sealed with the envelope cipher and
//! written to the `keys` table. Certificates are issued from CA keys stored
//! in the same table.
//!
//! ## Flow
//!
//! ```text
//! generate_key:     KeySpec -> generate -> [certificate] -> seal -> insert -> audit
//! sign_certificate: load CA -> open subject key -> sign leaf -> apply_certificate -> audit
//! ```
//!
//! A request that needs a certificate is fully validated (spec support, CA
//! lookup) before any key material is generated, so a rejected request
//! persists nothing.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use super::{
    GenerateKeyRequest, KeyProvider, KeyResponse, PrivateKeyMaterial, ProviderType,
    SignCertificateRequest, StoreKeyRequest,
};
use crate::crypto::certificate::{self, CertificateAuthority, CertificateTemplate};
use crate::crypto::keygen::{self, KeyFormat, KeySpec};
use crate::crypto::{address, EnvelopeCipher};
use crate::error::{KeyError, KeyResult};
use crate::storage::{
    AuditEvent, AuditEventType, AuditRepository, KeyDatabase, KeyRecord, KeyRepository, KeyStatus,
};

/// Provider that keeps sealed keys in the embedded database.
pub struct DatabaseProvider {
    db: Arc<KeyDatabase>,
    cipher: Arc<EnvelopeCipher>,
    provider_id: u64,
}

impl DatabaseProvider {
    pub fn new(db: Arc<KeyDatabase>, cipher: Arc<EnvelopeCipher>, provider_id: u64) -> Self {
        Self {
            db,
            cipher,
            provider_id,
        }
    }

    /// Keys owned by this provider, in id order.
    pub fn list_keys(&self) -> KeyResult<Vec<KeyResponse>> {
        Ok(self
            .keys()
            .list_by_provider(self.provider_id)?
            .iter()
            .map(KeyResponse::from)
            .collect())
    }

    fn keys(&self) -> KeyRepository<'_> {
        KeyRepository::new(&self.db)
    }

    fn audit(&self) -> AuditRepository<'_> {
        AuditRepository::new(&self.db)
    }

    fn find(&self, key_id: u64) -> KeyResult<KeyRecord> {
        self.keys()
            .get(key_id)?
            .ok_or_else(|| KeyError::NotFound(format!("key {key_id}")))
    }

    fn open_private_key(&self, record: &KeyRecord) -> KeyResult<String> {
        self.cipher
            .decrypt_to_string(&record.encrypted_private_key)
            .map_err(|e| match e {
                KeyError::DecryptionFailure { context } => KeyError::DecryptionFailure {
                    context: format!("key {}: {context}", record.id),
                },
                other => other,
            })
    }

    /// Look up a CA key and check that its certificate is a usable CA
    /// certificate. Returns the row and its certificate PEM; the private key
    /// stays sealed.
    fn ca_record(&self, ca_key_id: u64) -> KeyResult<(KeyRecord, String)> {
        let ca = self
            .keys()
            .get(ca_key_id)?
            .ok_or(KeyError::CaNotFound(ca_key_id))?;
        let status = ca.effective_status(Utc::now());
        if status != KeyStatus::Active {
            return Err(KeyError::NotACertificateAuthority {
                key_id: ca_key_id,
                reason: format!("key is {status}"),
            });
        }

        let pem = ca
            .certificate
            .clone()
            .ok_or_else(|| KeyError::NotACertificateAuthority {
                key_id: ca_key_id,
                reason: "key has no certificate".to_string(),
            })?;
        let info = certificate::inspect(&pem)
            .map_err(|e| KeyError::signing(format!("parse certificate of CA key {ca_key_id}"), e))?;
        if !info.is_ca {
            return Err(KeyError::NotACertificateAuthority {
                key_id: ca_key_id,
                reason: "certificate is not marked as a CA".to_string(),
            });
        }

        let spec = KeySpec::from_metadata(ca.algorithm, ca.key_size, ca.curve)?;
        if !spec.supports_certificates() {
            return Err(KeyError::InvalidParameters(format!(
                "{spec} keys cannot sign certificates"
            )));
        }
        Ok((ca, pem))
    }

    fn load_authority(&self, ca_key_id: u64) -> KeyResult<(KeyRecord, CertificateAuthority)> {
        let (ca, pem) = self.ca_record(ca_key_id)?;
        let private_key = self.open_private_key(&ca)?;
        let authority = CertificateAuthority::load(&private_key, &pem)?;
        Ok((ca, authority))
    }
}

fn require_name(name: &str) -> KeyResult<()> {
    if name.trim().is_empty() {
        return Err(KeyError::InvalidParameters("key name must not be empty".to_string()));
    }
    Ok(())
}

fn unsupported_certificate(spec: KeySpec) -> KeyError {
    KeyError::InvalidParameters(format!("certificates are not supported for {spec} keys"))
}

/// Check an imported private key against its public key and return the
/// Ethereum address for secp256k1 keys.
fn check_imported_pair(spec: KeySpec, request: &StoreKeyRequest) -> KeyResult<Option<String>> {
    match spec.format() {
        KeyFormat::Hex => {
            let from_public = address::address_from_public_key_hex(&request.public_key)?;
            let from_private = address::address_from_private_key_hex(&request.private_key)?;
            if from_public != from_private {
                return Err(KeyError::InvalidParameters(
                    "secp256k1 private key does not match the public key".to_string(),
                ));
            }
            Ok(Some(from_public))
        }
        KeyFormat::Pem => {
            let derived = spec.public_key_der_from_private(&request.private_key)?;
            if derived != keygen::public_key_bytes(&request.public_key, KeyFormat::Pem)? {
                return Err(KeyError::InvalidParameters(format!(
                    "{spec} private key does not match the public key"
                )));
            }
            Ok(None)
        }
    }
}

impl KeyProvider for DatabaseProvider {
    fn provider_type(&self) -> ProviderType {
        ProviderType::Database
    }

    fn provider_id(&self) -> u64 {
        self.provider_id
    }

    fn generate_key(&self, request: &GenerateKeyRequest) -> KeyResult<KeyResponse> {
        let spec = KeySpec::from_parts(&request.algorithm, request.key_size, request.curve.as_deref())?;
        require_name(&request.name)?;

        if request.wants_certificate() && !spec.supports_certificates() {
            return Err(unsupported_certificate(spec));
        }
        if request.is_ca && request.signing_key_id.is_some() {
            return Err(KeyError::InvalidParameters(
                "CA-signed certificates are leaves; is_ca and signing_key_id are exclusive".to_string(),
            ));
        }
        let authority = match request.signing_key_id {
            Some(ca_key_id) => Some(self.load_authority(ca_key_id)?),
            None => None,
        };

        let pair = spec.generate()?;

        let mut template = request
            .certificate
            .clone()
            .unwrap_or_else(|| CertificateTemplate::new(&request.name));
        let issued = match &authority {
            Some((_, ca)) => Some(ca.sign_leaf(&pair.private_key, &template)?),
            None if request.wants_ca_certificate() => {
                template.is_ca |= request.is_ca;
                Some(certificate::issue_self_signed(&pair.private_key, &template)?)
            }
            None => None,
        };

        let encrypted_private_key = self.cipher.encrypt(pair.private_key.as_bytes())?;
        let record = KeyRecord {
            id: 0,
            name: request.name.clone(),
            description: request.description.clone(),
            algorithm: spec.algorithm(),
            key_size: spec.key_size(),
            curve: spec.curve(),
            format: spec.format(),
            public_key: pair.public_key,
            encrypted_private_key,
            certificate: issued.as_ref().map(|c| c.pem.clone()),
            ethereum_address: pair.ethereum_address,
            sha256_fingerprint: pair.fingerprints.sha256,
            sha1_fingerprint: pair.fingerprints.sha1,
            status: KeyStatus::Active,
            created_at: Utc::now(),
            expires_at: issued.as_ref().map(|c| c.info.not_after).or(request.expires_at),
            last_rotated_at: None,
            provider_id: self.provider_id,
            user_id: request.user_id.clone(),
            is_ca: issued.as_ref().is_some_and(|c| c.info.is_ca),
            signing_key_id: authority.as_ref().map(|(ca, _)| ca.id),
        };
        let record = self.keys().insert(record)?;

        tracing::info!(
            key_id = record.id,
            provider_id = self.provider_id,
            spec = %spec,
            is_ca = record.is_ca,
            signing_key_id = ?record.signing_key_id,
            "Key generated"
        );

        let mut event = AuditEvent::new(AuditEventType::KeyGenerated)
            .with_resource("key", record.id)
            .with_details(json!({
                "name": record.name,
                "spec": spec.to_string(),
                "is_ca": record.is_ca,
                "signing_key_id": record.signing_key_id,
                "serial": issued.as_ref().map(|c| c.info.serial_hex.clone()),
            }));
        if let Some(user_id) = &request.user_id {
            event = event.with_user(user_id);
        }
        self.audit().record(event);

        Ok(KeyResponse::from(record))
    }

    fn store_key(&self, request: &StoreKeyRequest) -> KeyResult<KeyResponse> {
        let spec = KeySpec::from_parts(&request.algorithm, request.key_size, request.curve.as_deref())?;
        require_name(&request.name)?;

        let fingerprints = keygen::compute_fingerprints(&request.public_key, spec.format())?;
        let ethereum_address = check_imported_pair(spec, request)?;

        let info = match request.certificate.as_deref() {
            Some(pem) => {
                if spec.format() == KeyFormat::Hex {
                    return Err(unsupported_certificate(spec));
                }
                let info = certificate::inspect(pem)?;
                if !certificate::certifies_public_key(pem, &request.public_key)? {
                    return Err(KeyError::InvalidParameters(
                        "certificate does not certify the supplied public key".to_string(),
                    ));
                }
                if request.is_ca && !info.is_ca {
                    return Err(KeyError::InvalidParameters(
                        "certificate is not a CA certificate".to_string(),
                    ));
                }
                Some(info)
            }
            None if request.is_ca => {
                return Err(KeyError::InvalidParameters(
                    "a CA key must be imported with its certificate".to_string(),
                ));
            }
            None => None,
        };

        if let Some(ca_key_id) = request.signing_key_id {
            let pem = request.certificate.as_deref().ok_or_else(|| {
                KeyError::InvalidParameters("signing_key_id requires a certificate".to_string())
            })?;
            let (_, ca_pem) = self.ca_record(ca_key_id)?;
            if !certificate::is_issued_by(pem, &ca_pem)? {
                return Err(KeyError::InvalidParameters(format!(
                    "certificate was not issued by key {ca_key_id}"
                )));
            }
        }

        let encrypted_private_key = self.cipher.encrypt(request.private_key.trim().as_bytes())?;
        let record = KeyRecord {
            id: 0,
            name: request.name.clone(),
            description: request.description.clone(),
            algorithm: spec.algorithm(),
            key_size: spec.key_size(),
            curve: spec.curve(),
            format: spec.format(),
            public_key: request.public_key.clone(),
            encrypted_private_key,
            certificate: request.certificate.clone(),
            ethereum_address,
            sha256_fingerprint: fingerprints.sha256,
            sha1_fingerprint: fingerprints.sha1,
            status: KeyStatus::Active,
            created_at: Utc::now(),
            expires_at: info.as_ref().map(|i| i.not_after).or(request.expires_at),
            last_rotated_at: None,
            provider_id: self.provider_id,
            user_id: request.user_id.clone(),
            is_ca: info.as_ref().is_some_and(|i| i.is_ca),
            signing_key_id: request.signing_key_id,
        };
        let record = self.keys().insert(record)?;

        tracing::info!(key_id = record.id, spec = %spec, "Key imported");

        let mut event = AuditEvent::new(AuditEventType::KeyImported)
            .with_resource("key", record.id)
            .with_details(json!({ "name": record.name, "spec": spec.to_string() }));
        if let Some(user_id) = &request.user_id {
            event = event.with_user(user_id);
        }
        self.audit().record(event);

        Ok(KeyResponse::from(record))
    }

    fn retrieve_key(&self, key_id: u64) -> KeyResult<KeyResponse> {
        self.find(key_id).map(KeyResponse::from)
    }

    fn delete_key(&self, key_id: u64) -> KeyResult<()> {
        if !self.keys().delete(key_id)? {
            return Err(KeyError::NotFound(format!("key {key_id}")));
        }

        tracing::info!(key_id, "Key deleted");
        self.audit()
            .record(AuditEvent::new(AuditEventType::KeyDeleted).with_resource("key", key_id));
        Ok(())
    }

    fn sign_certificate(&self, request: &SignCertificateRequest) -> KeyResult<KeyResponse> {
        let subject = self.find(request.key_id)?;
        let spec = KeySpec::from_metadata(subject.algorithm, subject.key_size, subject.curve)?;
        if !spec.supports_certificates() {
            return Err(unsupported_certificate(spec));
        }
        if request.template.is_ca {
            return Err(KeyError::InvalidParameters(
                "CA-signed certificates are always leaves".to_string(),
            ));
        }

        let (ca, authority) = self.load_authority(request.ca_key_id)?;

        let mut template = request.template.clone();
        if template.common_name.trim().is_empty() {
            template.common_name = subject.name.clone();
        }
        let private_key = self.open_private_key(&subject)?;
        let issued = authority.sign_leaf(&private_key, &template)?;

        let updated =
            self.keys()
                .apply_certificate(subject.id, &issued.pem, issued.info.not_after, Some(ca.id))?;

        tracing::info!(
            key_id = subject.id,
            ca_key_id = ca.id,
            serial = %issued.info.serial_hex,
            not_after = %issued.info.not_after,
            "Certificate signed"
        );
        self.audit().record(
            AuditEvent::new(AuditEventType::CertificateSigned)
                .with_resource("key", subject.id)
                .with_details(json!({
                    "ca_key_id": ca.id,
                    "serial": issued.info.serial_hex,
                    "not_after": issued.info.not_after,
                })),
        );

        Ok(KeyResponse::from(updated))
    }

    fn get_decrypted_private_key(&self, key_id: u64) -> KeyResult<PrivateKeyMaterial> {
        let record = self.find(key_id)?;
        match self.open_private_key(&record) {
            Ok(private_key) => {
                tracing::debug!(key_id, "Private key accessed");
                self.audit().record(
                    AuditEvent::new(AuditEventType::PrivateKeyAccessed).with_resource("key", key_id),
                );
                Ok(PrivateKeyMaterial::new(private_key))
            }
            Err(e) => {
                tracing::error!(key_id, error = %e, "Private key could not be decrypted");
                self.audit().record(
                    AuditEvent::new(AuditEventType::PrivateKeyAccessed)
                        .with_resource("key", key_id)
                        .failed(e.to_string()),
                );
                Err(e)
            }
        }
    }
}
