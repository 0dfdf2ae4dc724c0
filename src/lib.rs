// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Relational KMS - Key Management and PKI Core
//!
//! Generates asymmetric key pairs, seals private keys with AES-256-GCM,
//! issues self-signed CA and CA-signed leaf certificates, and maintains
//! per-organization certificate revocation lists.
//!
//! ## Modules
//!
//! - `config` - Environment configuration and the master key
//! - `crypto` - Key generation, envelope encryption, X.509 certificates and CRLs
//! - `storage` - Embedded redb database and repositories
//! - `provider` - Key provider trait, database provider, factory
//! - `crl` - Per-organization revocation state machine
//! - `organization` - Organization provisioning and cleanup
//! - `state` - Composition root

pub mod config;
pub mod crl;
pub mod crypto;
pub mod error;
pub mod logging;
pub mod organization;
pub mod provider;
pub mod state;
pub mod storage;

pub use config::{ConfigError, KmsConfig, LogFormat, MasterKey};
pub use crl::CrlManager;
pub use error::{ErrorClass, KeyError, KeyResult};
pub use organization::{OrganizationService, ProvisionOrganizationRequest};
pub use provider::{
    DatabaseProvider, GenerateKeyRequest, KeyProvider, KeyResponse, PrivateKeyMaterial,
    ProviderFactory, ProviderType, SignCertificateRequest, StoreKeyRequest,
};
pub use state::KmsState;
