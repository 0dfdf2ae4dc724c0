// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Request and response types of the provider interface.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::{CertificateTemplate, EcCurve, KeyAlgorithm, KeyFormat};
use crate::storage::{KeyRecord, KeyStatus};

/// Request to generate a new key pair.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerateKeyRequest {
    pub name: String,
    pub description: Option<String>,
    /// `RSA`, `EC` or `ED25519`.
    pub algorithm: String,
    /// RSA modulus bits (defaults to 2048).
    pub key_size: Option<u32>,
    /// Required for EC keys.
    pub curve: Option<String>,
    /// Issue a self-signed CA certificate for the new key.
    pub is_ca: bool,
    /// Certificate subject and extensions; derived from `name` when absent.
    pub certificate: Option<CertificateTemplate>,
    /// CA key that signs the new key's certificate.
    pub signing_key_id: Option<u64>,
    pub user_id: Option<String>,
    /// Key expiry when no certificate is issued.
    pub expires_at: Option<DateTime<Utc>>,
}

impl GenerateKeyRequest {
    pub fn new(name: impl Into<String>, algorithm: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            algorithm: algorithm.into(),
            ..Default::default()
        }
    }

    pub fn with_curve(mut self, curve: impl Into<String>) -> Self {
        self.curve = Some(curve.into());
        self
    }

    pub fn with_key_size(mut self, bits: u32) -> Self {
        self.key_size = Some(bits);
        self
    }

    pub fn with_certificate(mut self, template: CertificateTemplate) -> Self {
        self.certificate = Some(template);
        self
    }

    pub fn as_ca(mut self) -> Self {
        self.is_ca = true;
        self
    }

    pub fn signed_by(mut self, ca_key_id: u64) -> Self {
        self.signing_key_id = Some(ca_key_id);
        self
    }

    /// Whether this request results in a certificate: a self-signed CA one
    /// when the flag or the template asks for a CA, a leaf when a signing key
    /// is named. A plain template alone issues nothing.
    pub(crate) fn wants_certificate(&self) -> bool {
        self.wants_ca_certificate() || self.signing_key_id.is_some()
    }

    pub(crate) fn wants_ca_certificate(&self) -> bool {
        self.is_ca || self.certificate.as_ref().is_some_and(|t| t.is_ca)
    }
}

/// Request to import externally generated key material.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreKeyRequest {
    pub name: String,
    pub description: Option<String>,
    pub algorithm: String,
    pub key_size: Option<u32>,
    pub curve: Option<String>,
    /// SPKI PEM, or uncompressed hex for secp256k1.
    pub public_key: String,
    /// PKCS#8 PEM, or raw hex for secp256k1. Sealed before persistence.
    pub private_key: String,
    /// PEM certificate; must certify `public_key`.
    pub certificate: Option<String>,
    pub is_ca: bool,
    /// CA key that issued `certificate`.
    pub signing_key_id: Option<u64>,
    pub user_id: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Request to certify an existing key with a stored CA key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignCertificateRequest {
    pub key_id: u64,
    pub ca_key_id: u64,
    #[serde(default)]
    pub template: CertificateTemplate,
}

/// Public view of a stored key. Never carries private material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyResponse {
    pub id: u64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub algorithm: KeyAlgorithm,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub curve: Option<EcCurve>,
    pub format: KeyFormat,
    pub public_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,
    pub status: KeyStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_rotated_at: Option<DateTime<Utc>>,
    pub sha256_fingerprint: String,
    pub sha1_fingerprint: String,
    pub provider_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ethereum_address: Option<String>,
    pub is_ca: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signing_key_id: Option<u64>,
}

impl From<&KeyRecord> for KeyResponse {
    fn from(record: &KeyRecord) -> Self {
        Self {
            id: record.id,
            name: record.name.clone(),
            description: record.description.clone(),
            algorithm: record.algorithm,
            key_size: record.key_size,
            curve: record.curve,
            format: record.format,
            public_key: record.public_key.clone(),
            certificate: record.certificate.clone(),
            status: record.effective_status(Utc::now()),
            created_at: record.created_at,
            expires_at: record.expires_at,
            last_rotated_at: record.last_rotated_at,
            sha256_fingerprint: record.sha256_fingerprint.clone(),
            sha1_fingerprint: record.sha1_fingerprint.clone(),
            provider_id: record.provider_id,
            ethereum_address: record.ethereum_address.clone(),
            is_ca: record.is_ca,
            signing_key_id: record.signing_key_id,
        }
    }
}

impl From<KeyRecord> for KeyResponse {
    fn from(record: KeyRecord) -> Self {
        Self::from(&record)
    }
}

/// Decrypted private key (PEM or hex). `Debug` is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKeyMaterial(String);

impl PrivateKeyMaterial {
    pub(crate) fn new(value: String) -> Self {
        Self(value)
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PrivateKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKeyMaterial(<redacted>)")
    }
}
