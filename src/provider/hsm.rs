// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Hardware security module provider. Not wired to a device yet.

use super::{
    GenerateKeyRequest, KeyProvider, KeyResponse, PrivateKeyMaterial, ProviderType,
    SignCertificateRequest, StoreKeyRequest,
};
use crate::error::{KeyError, KeyResult};

const PROVIDER: &str = "HSM";

#[derive(Debug, Clone)]
pub struct HsmProvider {
    provider_id: u64,
}

impl HsmProvider {
    pub fn new(provider_id: u64) -> Self {
        Self { provider_id }
    }
}

fn unsupported<T>(operation: &'static str) -> KeyResult<T> {
    Err(KeyError::UnsupportedOperation {
        provider: PROVIDER,
        operation,
    })
}

impl KeyProvider for HsmProvider {
    fn provider_type(&self) -> ProviderType {
        ProviderType::Hsm
    }

    fn provider_id(&self) -> u64 {
        self.provider_id
    }

    fn generate_key(&self, _request: &GenerateKeyRequest) -> KeyResult<KeyResponse> {
        unsupported("generate_key")
    }

    fn store_key(&self, _request: &StoreKeyRequest) -> KeyResult<KeyResponse> {
        unsupported("store_key")
    }

    fn retrieve_key(&self, _key_id: u64) -> KeyResult<KeyResponse> {
        unsupported("retrieve_key")
    }

    fn delete_key(&self, _key_id: u64) -> KeyResult<()> {
        unsupported("delete_key")
    }

    fn sign_certificate(&self, _request: &SignCertificateRequest) -> KeyResult<KeyResponse> {
        unsupported("sign_certificate")
    }

    fn get_decrypted_private_key(&self, _key_id: u64) -> KeyResult<PrivateKeyMaterial> {
        unsupported("get_decrypted_private_key")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_operation_is_rejected() {
        let provider = HsmProvider::new(2);
        assert_eq!(provider.provider_type(), ProviderType::Hsm);
        assert!(matches!(
            provider.retrieve_key(1),
            Err(KeyError::UnsupportedOperation { provider: "HSM", operation: "retrieve_key" })
        ));
        assert!(matches!(
            provider.generate_key(&GenerateKeyRequest::new("k", "EC")),
            Err(KeyError::UnsupportedOperation { .. })
        ));
        assert!(provider.delete_key(1).unwrap_err().is_client_error());
    }
}
