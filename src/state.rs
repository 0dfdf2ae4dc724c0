// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Composition root.
//!
//! [`KmsState`] is built once at startup from a [`KmsConfig`] and cloned
//! into whatever front end (HTTP handlers, CLI) drives the core. The master
//! key lives only inside the shared [`EnvelopeCipher`].

use std::sync::Arc;

use crate::config::KmsConfig;
use crate::crl::CrlManager;
use crate::crypto::EnvelopeCipher;
use crate::error::KeyResult;
use crate::organization::OrganizationService;
use crate::provider::{KeyProvider, ProviderFactory};
use crate::storage::{AuditRepository, KeyDatabase, KeyProviderRecord};

#[derive(Clone)]
/// Shared handles to the database, provider factory and default provider.
pub struct KmsState {
    db: Arc<KeyDatabase>,
    factory: ProviderFactory,
    provider: Arc<dyn KeyProvider>,
    default_provider: KeyProviderRecord,
}

impl KmsState {
    /// Open the database under `DATA_DIR`, build the cipher and make sure a
    /// default provider row exists.
    pub fn open(config: &KmsConfig) -> KeyResult<Self> {
        let db = Arc::new(KeyDatabase::open(&config.database_path())?);
        let cipher = Arc::new(EnvelopeCipher::new(&config.master_key));
        let factory = ProviderFactory::new(db.clone(), cipher);

        let default_provider = factory.bootstrap_default()?;
        let provider = factory.for_provider_id(default_provider.id)?;

        tracing::info!(
            data_dir = %config.data_dir.display(),
            provider_id = default_provider.id,
            provider_type = %default_provider.provider_type,
            "Key management core ready"
        );

        Ok(Self {
            db,
            factory,
            provider,
            default_provider,
        })
    }

    /// The default provider.
    pub fn provider(&self) -> Arc<dyn KeyProvider> {
        self.provider.clone()
    }

    /// Record of the default provider.
    pub fn default_provider(&self) -> &KeyProviderRecord {
        &self.default_provider
    }

    pub fn factory(&self) -> &ProviderFactory {
        &self.factory
    }

    /// CRL manager backed by the default provider.
    pub fn crl_manager(&self) -> CrlManager {
        CrlManager::new(self.db.clone(), self.provider.clone())
    }

    /// Organization service backed by the default provider.
    pub fn organizations(&self) -> OrganizationService {
        OrganizationService::new(self.db.clone(), self.provider.clone())
    }

    /// Read access to the audit trail.
    pub fn audit(&self) -> AuditRepository<'_> {
        AuditRepository::new(&self.db)
    }
}
