// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HashiCorp Vault provider. Registered so deployments can name it; every
//! operation is rejected until a transit backend client exists.

use super::{
    GenerateKeyRequest, KeyProvider, KeyResponse, PrivateKeyMaterial, ProviderType,
    SignCertificateRequest, StoreKeyRequest,
};
use crate::error::{KeyError, KeyResult};

#[derive(Debug, Clone)]
pub struct VaultProvider {
    provider_id: u64,
}

impl VaultProvider {
    pub fn new(provider_id: u64) -> Self {
        Self { provider_id }
    }

    fn reject<T>(&self, operation: &'static str) -> KeyResult<T> {
        tracing::debug!(provider_id = self.provider_id, operation, "Vault provider operation rejected");
        Err(KeyError::UnsupportedOperation {
            provider: "HASHICORP_VAULT",
            operation,
        })
    }
}

impl KeyProvider for VaultProvider {
    fn provider_type(&self) -> ProviderType {
        ProviderType::HashicorpVault
    }

    fn provider_id(&self) -> u64 {
        self.provider_id
    }

    fn generate_key(&self, _request: &GenerateKeyRequest) -> KeyResult<KeyResponse> {
        self.reject("generate_key")
    }

    fn store_key(&self, _request: &StoreKeyRequest) -> KeyResult<KeyResponse> {
        self.reject("store_key")
    }

    fn retrieve_key(&self, _key_id: u64) -> KeyResult<KeyResponse> {
        self.reject("retrieve_key")
    }

    fn delete_key(&self, _key_id: u64) -> KeyResult<()> {
        self.reject("delete_key")
    }

    fn sign_certificate(&self, _request: &SignCertificateRequest) -> KeyResult<KeyResponse> {
        self.reject("sign_certificate")
    }

    fn get_decrypted_private_key(&self, _key_id: u64) -> KeyResult<PrivateKeyMaterial> {
        self.reject("get_decrypted_private_key")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_key_access_is_rejected() {
        let provider = VaultProvider::new(3);
        assert_eq!(provider.provider_type(), ProviderType::HashicorpVault);
        assert!(matches!(
            provider.get_decrypted_private_key(1),
            Err(KeyError::UnsupportedOperation {
                provider: "HASHICORP_VAULT",
                operation: "get_decrypted_private_key"
            })
        ));
    }
}
