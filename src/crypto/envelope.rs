// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Envelope encryption for private keys at rest.
//!
//! Private keys are sealed with AES-256-GCM under the process master key
//! before they are written to the database. The persisted form is a JSON
//! object with three base64 fields:
//!
//! ```text
//! {"iv": "<12-byte nonce>", "data": "<ciphertext without tag>", "authTag": "<16-byte tag>"}
//! ```
//!
//! The tag is stored apart from the ciphertext so the schema stays stable if
//! the cipher ever changes its output layout.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64ct::{Base64, Encoding};
use serde::{Deserialize, Serialize};

use crate::config::MasterKey;
use crate::error::{KeyError, KeyResult};

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Persisted ciphertext envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    /// Base64 nonce.
    pub iv: String,
    /// Base64 ciphertext, authentication tag stripped.
    pub data: String,
    /// Base64 authentication tag.
    #[serde(rename = "authTag")]
    pub auth_tag: String,
}

/// AES-256-GCM cipher bound to the master key for the lifetime of the process.
pub struct EnvelopeCipher {
    cipher: Aes256Gcm,
}

impl EnvelopeCipher {
    pub fn new(master_key: &MasterKey) -> Self {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(master_key.as_bytes()));
        Self { cipher }
    }

    /// Seal `plaintext` and return the structured envelope.
    pub fn seal(&self, plaintext: &[u8]) -> KeyResult<EncryptedEnvelope> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| KeyError::EncryptionFailure {
                context: "seal private key".to_string(),
            })?;

        // aes-gcm appends the tag to the ciphertext
        let (data, tag) = sealed.split_at(sealed.len() - TAG_LEN);

        Ok(EncryptedEnvelope {
            iv: Base64::encode_string(nonce.as_slice()),
            data: Base64::encode_string(data),
            auth_tag: Base64::encode_string(tag),
        })
    }

    /// Open an envelope, failing on any tampering or key mismatch.
    pub fn open(&self, envelope: &EncryptedEnvelope) -> KeyResult<Vec<u8>> {
        let nonce = decode_field(&envelope.iv, "iv")?;
        let data = decode_field(&envelope.data, "data")?;
        let tag = decode_field(&envelope.auth_tag, "authTag")?;

        if nonce.len() != NONCE_LEN || tag.len() != TAG_LEN {
            return Err(KeyError::DecryptionFailure {
                context: "envelope has wrong nonce or tag length".to_string(),
            });
        }

        let mut sealed = Vec::with_capacity(data.len() + TAG_LEN);
        sealed.extend_from_slice(&data);
        sealed.extend_from_slice(&tag);

        self.cipher
            .decrypt(Nonce::from_slice(&nonce), sealed.as_slice())
            .map_err(|_| KeyError::DecryptionFailure {
                context: "authentication tag mismatch".to_string(),
            })
    }

    /// Seal and serialize to the JSON string stored in key records.
    pub fn encrypt(&self, plaintext: &[u8]) -> KeyResult<String> {
        let envelope = self.seal(plaintext)?;
        serde_json::to_string(&envelope).map_err(|e| KeyError::encoding("envelope json", e))
    }

    /// Parse a stored JSON envelope and open it.
    pub fn decrypt(&self, stored: &str) -> KeyResult<Vec<u8>> {
        let envelope: EncryptedEnvelope =
            serde_json::from_str(stored).map_err(|e| KeyError::DecryptionFailure {
                context: format!("malformed envelope: {e}"),
            })?;
        self.open(&envelope)
    }

    /// Convenience for PEM / hex key material, which is always UTF-8.
    pub fn decrypt_to_string(&self, stored: &str) -> KeyResult<String> {
        let plaintext = self.decrypt(stored)?;
        String::from_utf8(plaintext).map_err(|_| KeyError::DecryptionFailure {
            context: "decrypted key material is not UTF-8".to_string(),
        })
    }
}

fn decode_field(value: &str, field: &str) -> KeyResult<Vec<u8>> {
    Base64::decode_vec(value).map_err(|_| KeyError::DecryptionFailure {
        context: format!("envelope field {field} is not valid base64"),
    })
}
