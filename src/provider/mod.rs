// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Key Providers
//!
//! A provider owns key material for its backend and exposes one contract to
//! the organization and CRL layers:
//!
//! ```text
//! generate_key(req)            -> KeyResponse
//! store_key(req)               -> KeyResponse
//! retrieve_key(id)             -> KeyResponse
//! delete_key(id)               -> ()
//! sign_certificate(req)        -> KeyResponse
//! get_decrypted_private_key(id) -> PrivateKeyMaterial
//! ```
//!
//! Only [`DatabaseProvider`] is functional. [`HsmProvider`] and
//! [`VaultProvider`] satisfy the trait and reject every operation.
//! [`ProviderFactory`] picks the implementation from a [`ProviderType`].

pub mod database;
pub mod factory;
pub mod hsm;
pub mod types;
pub mod vault;

pub use database::DatabaseProvider;
pub use factory::{ProviderFactory, ProviderType};
pub use hsm::HsmProvider;
pub use types::{
    GenerateKeyRequest, KeyResponse, PrivateKeyMaterial, SignCertificateRequest, StoreKeyRequest,
};
pub use vault::VaultProvider;

use crate::error::KeyResult;

/// Key storage backend.
///
/// Implementations are shared across threads behind `Arc<dyn KeyProvider>`.
/// Every call is synchronous and may block on storage I/O or key generation.
pub trait KeyProvider: Send + Sync {
    fn provider_type(&self) -> ProviderType;

    /// Id of the `key_providers` row this instance serves.
    fn provider_id(&self) -> u64;

    /// Generate, seal and persist a key pair, issuing a certificate when the
    /// request asks for one.
    fn generate_key(&self, request: &GenerateKeyRequest) -> KeyResult<KeyResponse>;

    /// Import externally generated key material.
    fn store_key(&self, request: &StoreKeyRequest) -> KeyResult<KeyResponse>;

    fn retrieve_key(&self, key_id: u64) -> KeyResult<KeyResponse>;

    fn delete_key(&self, key_id: u64) -> KeyResult<()>;

    /// Certify an existing key with a stored CA key and write the certificate
    /// back onto the subject key.
    fn sign_certificate(&self, request: &SignCertificateRequest) -> KeyResult<KeyResponse>;

    /// The only path that returns private key material. Internal callers only.
    fn get_decrypted_private_key(&self, key_id: u64) -> KeyResult<PrivateKeyMaterial>;
}
