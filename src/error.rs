// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Error taxonomy for the key management core.
//!
//! Every failure a provider, the CRL manager or the organization service can
//! surface is a [`KeyError`]. Callers that sit in front of the core (HTTP
//! handlers, CLI wrappers) use [`KeyError::class`] to pick a status code
//! without re-deriving the cause from the message.

use crate::storage::StoreError;

/// Coarse classification used by outer layers to map errors to responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The request itself is malformed or violates a precondition.
    BadInput,
    /// A referenced key, organization or provider does not exist.
    NotFound,
    /// The request conflicts with existing state (e.g. duplicate revocation).
    Conflict,
    /// Cryptographic, encoding or persistence failure inside the core.
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("invalid algorithm: {0}")]
    InvalidAlgorithm(String),

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("decryption failed ({context}): ciphertext rejected")]
    DecryptionFailure { context: String },

    #[error("encryption failed ({context})")]
    EncryptionFailure { context: String },

    #[error("CA key {0} not found")]
    CaNotFound(u64),

    #[error("key {key_id} is not a certificate authority: {reason}")]
    NotACertificateAuthority { key_id: u64, reason: String },

    #[error("certificate signing failed ({context}): {message}")]
    SigningFailure { context: String, message: String },

    #[error("key generation failed for {algorithm}: {message}")]
    KeyGeneration { algorithm: String, message: String },

    #[error("encoding error ({context}): {message}")]
    Encoding { context: String, message: String },

    #[error("organization {0} has no usable signing key")]
    NoSigningKey(u64),

    #[error("malformed serial number {serial:?} for organization {organization_id}")]
    MalformedSerial { organization_id: u64, serial: String },

    #[error("serial {serial} is already revoked for organization {organization_id}")]
    AlreadyRevoked { organization_id: u64, serial: String },

    #[error("unsupported provider type: {0}")]
    UnsupportedProviderType(String),

    #[error("{operation} is not supported by the {provider} provider")]
    UnsupportedOperation {
        provider: &'static str,
        operation: &'static str,
    },

    #[error("persistence error: {0}")]
    Persistence(#[from] StoreError),
}

pub type KeyResult<T> = Result<T, KeyError>;

impl KeyError {
    pub fn class(&self) -> ErrorClass {
        match self {
            KeyError::InvalidAlgorithm(_)
            | KeyError::InvalidParameters(_)
            | KeyError::NotACertificateAuthority { .. }
            | KeyError::NoSigningKey(_)
            | KeyError::UnsupportedProviderType(_)
            | KeyError::UnsupportedOperation { .. } => ErrorClass::BadInput,
            KeyError::NotFound(_) | KeyError::CaNotFound(_) => ErrorClass::NotFound,
            KeyError::AlreadyRevoked { .. } => ErrorClass::Conflict,
            KeyError::Persistence(StoreError::NotFound(_)) => ErrorClass::NotFound,
            KeyError::Persistence(StoreError::AlreadyExists(_)) => ErrorClass::Conflict,
            KeyError::DecryptionFailure { .. }
            | KeyError::EncryptionFailure { .. }
            | KeyError::SigningFailure { .. }
            | KeyError::KeyGeneration { .. }
            | KeyError::Encoding { .. }
            | KeyError::MalformedSerial { .. }
            | KeyError::Persistence(_) => ErrorClass::Internal,
        }
    }

    pub fn is_client_error(&self) -> bool {
        !matches!(self.class(), ErrorClass::Internal)
    }

    /// Only storage failures may succeed on a retry; crypto failures are
    /// deterministic.
    pub fn is_retryable(&self) -> bool {
        matches!(self, KeyError::Persistence(e) if !matches!(e, StoreError::NotFound(_) | StoreError::AlreadyExists(_)))
    }

    pub(crate) fn encoding(context: impl Into<String>, message: impl ToString) -> Self {
        KeyError::Encoding {
            context: context.into(),
            message: message.to_string(),
        }
    }

    pub(crate) fn signing(context: impl Into<String>, message: impl ToString) -> Self {
        KeyError::SigningFailure {
            context: context.into(),
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_input_and_internal_are_distinguished() {
        assert_eq!(
            KeyError::InvalidAlgorithm("DSA".into()).class(),
            ErrorClass::BadInput
        );
        assert_eq!(KeyError::CaNotFound(7).class(), ErrorClass::NotFound);
        assert_eq!(
            KeyError::DecryptionFailure {
                context: "key 1".into()
            }
            .class(),
            ErrorClass::Internal
        );
        assert!(KeyError::InvalidParameters("curve".into()).is_client_error());
        assert!(!KeyError::signing("leaf", "boom").is_client_error());
    }

    #[test]
    fn duplicate_revocation_is_a_conflict() {
        let err = KeyError::AlreadyRevoked {
            organization_id: 3,
            serial: "abcd".into(),
        };
        assert_eq!(err.class(), ErrorClass::Conflict);
        assert!(!err.is_retryable());
    }

    #[test]
    fn only_storage_failures_are_retryable() {
        let io = StoreError::Io(std::io::Error::other("disk"));
        assert!(KeyError::Persistence(io).is_retryable());
        assert!(!KeyError::Persistence(StoreError::NotFound("key 1".into())).is_retryable());
        assert!(!KeyError::DecryptionFailure {
            context: "x".into()
        }
        .is_retryable());
    }

    #[test]
    fn messages_carry_context() {
        let err = KeyError::NotACertificateAuthority {
            key_id: 12,
            reason: "certificate has CA=false".into(),
        };
        assert_eq!(
            err.to_string(),
            "key 12 is not a certificate authority: certificate has CA=false"
        );
    }
}
