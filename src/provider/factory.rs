// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Provider selection.
//!
//! Provider rows in the `key_providers` table carry a type tag; the factory
//! turns a tag (or a stored row) into a shared [`KeyProvider`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{DatabaseProvider, HsmProvider, KeyProvider, VaultProvider};
use crate::crypto::EnvelopeCipher;
use crate::error::{KeyError, KeyResult};
use crate::storage::{
    AuditEvent, AuditEventType, AuditRepository, KeyDatabase, KeyProviderRecord, ProviderRepository,
};

/// Name given to the provider row created on first start.
pub const DEFAULT_PROVIDER_NAME: &str = "default";

/// Closed set of provider backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderType {
    Database,
    Hsm,
    HashicorpVault,
}

impl ProviderType {
    pub fn as_tag(self) -> &'static str {
        match self {
            ProviderType::Database => "DATABASE",
            ProviderType::Hsm => "HSM",
            ProviderType::HashicorpVault => "HASHICORP_VAULT",
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

impl FromStr for ProviderType {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DATABASE" => Ok(ProviderType::Database),
            "HSM" => Ok(ProviderType::Hsm),
            "HASHICORP_VAULT" => Ok(ProviderType::HashicorpVault),
            _ => Err(KeyError::UnsupportedProviderType(s.to_string())),
        }
    }
}

/// Builds providers over one database and envelope cipher.
#[derive(Clone)]
pub struct ProviderFactory {
    db: Arc<KeyDatabase>,
    cipher: Arc<EnvelopeCipher>,
}

impl ProviderFactory {
    pub fn new(db: Arc<KeyDatabase>, cipher: Arc<EnvelopeCipher>) -> Self {
        Self { db, cipher }
    }

    pub fn create(&self, provider_type: ProviderType, provider_id: u64) -> Arc<dyn KeyProvider> {
        match provider_type {
            ProviderType::Database => Arc::new(self.database(provider_id)),
            ProviderType::Hsm => Arc::new(HsmProvider::new(provider_id)),
            ProviderType::HashicorpVault => Arc::new(VaultProvider::new(provider_id)),
        }
    }

    /// Resolve a provider from its type tag.
    pub fn from_tag(&self, tag: &str, provider_id: u64) -> KeyResult<Arc<dyn KeyProvider>> {
        Ok(self.create(tag.parse()?, provider_id))
    }

    /// Resolve the provider registered under `provider_id`.
    pub fn for_provider_id(&self, provider_id: u64) -> KeyResult<Arc<dyn KeyProvider>> {
        let record = ProviderRepository::new(&self.db)
            .get(provider_id)?
            .ok_or_else(|| KeyError::NotFound(format!("key provider {provider_id}")))?;
        self.from_tag(&record.provider_type, record.id)
    }

    pub(crate) fn database(&self, provider_id: u64) -> DatabaseProvider {
        DatabaseProvider::new(self.db.clone(), self.cipher.clone(), provider_id)
    }

    /// Register a provider row.
    pub fn register(
        &self,
        name: &str,
        provider_type: ProviderType,
        is_default: bool,
    ) -> KeyResult<KeyProviderRecord> {
        if name.trim().is_empty() {
            return Err(KeyError::InvalidParameters(
                "provider name must not be empty".to_string(),
            ));
        }
        let record =
            ProviderRepository::new(&self.db).insert(name, provider_type.as_tag(), is_default)?;

        tracing::info!(
            provider_id = record.id,
            provider_type = %provider_type,
            is_default,
            "Key provider registered"
        );
        AuditRepository::new(&self.db).record(
            AuditEvent::new(AuditEventType::ProviderRegistered)
                .with_resource("provider", record.id)
                .with_details(serde_json::json!({
                    "name": record.name,
                    "provider_type": record.provider_type,
                    "is_default": is_default,
                })),
        );
        Ok(record)
    }

    /// Return the default provider row, creating a DATABASE default on first
    /// use.
    pub fn bootstrap_default(&self) -> KeyResult<KeyProviderRecord> {
        if let Some(existing) = ProviderRepository::new(&self.db).get_default()? {
            return Ok(existing);
        }
        self.register(DEFAULT_PROVIDER_NAME, ProviderType::Database, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MasterKey;

    fn temp_factory() -> (ProviderFactory, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(KeyDatabase::open(&dir.path().join("keys.redb")).unwrap());
        let cipher = Arc::new(EnvelopeCipher::new(&MasterKey::from_bytes([1u8; 32])));
        (ProviderFactory::new(db, cipher), dir)
    }

    #[test]
    fn parses_type_tags() {
        assert_eq!("DATABASE".parse::<ProviderType>().unwrap(), ProviderType::Database);
        assert_eq!("hsm".parse::<ProviderType>().unwrap(), ProviderType::Hsm);
        assert_eq!(
            "HASHICORP_VAULT".parse::<ProviderType>().unwrap(),
            ProviderType::HashicorpVault
        );
        assert!(matches!(
            "AWS_KMS".parse::<ProviderType>(),
            Err(KeyError::UnsupportedProviderType(tag)) if tag == "AWS_KMS"
        ));
        assert_eq!(
            serde_json::to_string(&ProviderType::HashicorpVault).unwrap(),
            r#""HASHICORP_VAULT""#
        );
    }

    #[test]
    fn creates_each_provider_type() {
        let (factory, _dir) = temp_factory();
        for provider_type in [
            ProviderType::Database,
            ProviderType::Hsm,
            ProviderType::HashicorpVault,
        ] {
            assert_eq!(factory.create(provider_type, 1).provider_type(), provider_type);
        }
        assert!(matches!(
            factory.from_tag("PKCS11", 1),
            Err(KeyError::UnsupportedProviderType(_))
        ));
    }

    #[test]
    fn bootstrap_is_idempotent() {
        let (factory, _dir) = temp_factory();
        let first = factory.bootstrap_default().unwrap();
        let second = factory.bootstrap_default().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.provider_type, "DATABASE");
        assert!(first.is_default);
    }

    #[test]
    fn resolves_registered_providers() {
        let (factory, _dir) = temp_factory();
        let hsm = factory.register("hsm-1", ProviderType::Hsm, false).unwrap();
        assert_eq!(
            factory.for_provider_id(hsm.id).unwrap().provider_type(),
            ProviderType::Hsm
        );
        assert!(matches!(factory.for_provider_id(42), Err(KeyError::NotFound(_))));
        assert!(matches!(
            factory.register(" ", ProviderType::Database, false),
            Err(KeyError::InvalidParameters(_))
        ));
    }
}
