// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Organization provisioning and cleanup.
//!
//! Provisioning creates the organization's role keys (all EC P-256):
//!
//! | Role | Certificate |
//! |------|-------------|
//! | signing CA | self-signed CA, `ca.<domain>` |
//! | TLS root CA | self-signed CA, `tlsca.<domain>` |
//! | admin | signed by the signing CA, `Admin@<domain>`, OU `admin` |
//! | client | signed by the signing CA, `Client@<domain>`, OU `client` |
//!
//! Keys are not owned by the organization row: deletion removes the row
//! (and its revocations) first, then deletes each referenced key through
//! the provider.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::crypto::CertificateTemplate;
use crate::error::{KeyError, KeyResult};
use crate::provider::{GenerateKeyRequest, KeyProvider};
use crate::storage::{
    AuditEvent, AuditEventType, AuditRepository, KeyDatabase, OrganizationRecord,
    OrganizationRepository, StoreError,
};

const ROLE_KEY_CURVE: &str = "P-256";

/// Input for [`OrganizationService::provision`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionOrganizationRequest {
    /// Membership service provider identifier, unique across organizations.
    pub msp_id: String,
    pub description: Option<String>,
    /// DNS domain used in certificate names; defaults to the lowercased MSP id.
    pub domain: Option<String>,
    pub country: Option<String>,
    pub province: Option<String>,
    pub locality: Option<String>,
    pub user_id: Option<String>,
}

impl ProvisionOrganizationRequest {
    pub fn new(msp_id: impl Into<String>) -> Self {
        Self {
            msp_id: msp_id.into(),
            ..Default::default()
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    fn domain(&self) -> String {
        self.domain
            .clone()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| self.msp_id.to_lowercase())
    }

    fn template(&self, common_name: String) -> CertificateTemplate {
        let mut template = CertificateTemplate::new(common_name).with_organization(&self.msp_id);
        template.country = self.country.clone();
        template.province = self.province.clone();
        template.locality = self.locality.clone();
        template
    }
}

struct RoleKeys {
    sign: u64,
    tls_root: u64,
    admin: u64,
    client: u64,
}

/// Provisions organizations and their role keys.
pub struct OrganizationService {
    db: Arc<KeyDatabase>,
    provider: Arc<dyn KeyProvider>,
}

impl OrganizationService {
    pub fn new(db: Arc<KeyDatabase>, provider: Arc<dyn KeyProvider>) -> Self {
        Self { db, provider }
    }

    fn organizations(&self) -> OrganizationRepository<'_> {
        OrganizationRepository::new(&self.db)
    }

    /// Create an organization and its four role keys.
    ///
    /// Keys created before a failure are deleted again.
    pub fn provision(&self, request: &ProvisionOrganizationRequest) -> KeyResult<OrganizationRecord> {
        let msp_id = request.msp_id.trim();
        if msp_id.is_empty() {
            return Err(KeyError::InvalidParameters("MSP id must not be empty".to_string()));
        }
        if self.organizations().get_by_msp_id(msp_id)?.is_some() {
            return Err(KeyError::Persistence(StoreError::AlreadyExists(format!(
                "organization with MSP id {msp_id}"
            ))));
        }

        let mut created = Vec::with_capacity(4);
        let result = self
            .generate_role_keys(request, &mut created)
            .and_then(|keys| {
                let now = Utc::now();
                let record = OrganizationRecord {
                    id: 0,
                    msp_id: msp_id.to_string(),
                    description: request.description.clone(),
                    sign_key_id: Some(keys.sign),
                    tls_root_key_id: Some(keys.tls_root),
                    admin_sign_key_id: Some(keys.admin),
                    client_sign_key_id: Some(keys.client),
                    crl_key_id: None,
                    crl_last_update: None,
                    crl_number: 0,
                    provider_id: self.provider.provider_id(),
                    created_at: now,
                    updated_at: now,
                };
                Ok(self.organizations().insert(record)?)
            });

        let organization = match result {
            Ok(organization) => organization,
            Err(e) => {
                tracing::warn!(msp_id, error = %e, keys = created.len(), "Provisioning failed, removing keys");
                for key_id in created {
                    if let Err(cleanup) = self.provider.delete_key(key_id) {
                        tracing::warn!(key_id, error = %cleanup, "Failed to remove key after provisioning error");
                    }
                }
                return Err(e);
            }
        };

        tracing::info!(
            organization_id = organization.id,
            msp_id = %organization.msp_id,
            "Organization provisioned"
        );
        let mut event = AuditEvent::new(AuditEventType::OrganizationProvisioned)
            .with_resource("organization", organization.id)
            .with_details(json!({
                "msp_id": organization.msp_id,
                "key_ids": organization.key_ids(),
            }));
        if let Some(user_id) = &request.user_id {
            event = event.with_user(user_id);
        }
        AuditRepository::new(&self.db).record(event);

        Ok(organization)
    }

    fn generate_role_keys(
        &self,
        request: &ProvisionOrganizationRequest,
        created: &mut Vec<u64>,
    ) -> KeyResult<RoleKeys> {
        let domain = request.domain();
        let msp_id = request.msp_id.trim();

        let mut generate = |name: String, template: CertificateTemplate, signer: Option<u64>| {
            let mut key_request = GenerateKeyRequest::new(name, "EC")
                .with_curve(ROLE_KEY_CURVE)
                .with_certificate(template);
            key_request.user_id = request.user_id.clone();
            key_request = match signer {
                Some(ca_key_id) => key_request.signed_by(ca_key_id),
                None => key_request.as_ca(),
            };
            let key = self.provider.generate_key(&key_request)?;
            created.push(key.id);
            Ok::<u64, KeyError>(key.id)
        };

        let sign = generate(
            format!("{msp_id} signing CA"),
            request.template(format!("ca.{domain}")),
            None,
        )?;
        let tls_root = generate(
            format!("{msp_id} TLS root CA"),
            request.template(format!("tlsca.{domain}")),
            None,
        )?;
        let admin = generate(
            format!("{msp_id} admin"),
            request
                .template(format!("Admin@{domain}"))
                .with_organizational_unit("admin"),
            Some(sign),
        )?;
        let client = generate(
            format!("{msp_id} client"),
            request
                .template(format!("Client@{domain}"))
                .with_organizational_unit("client"),
            Some(sign),
        )?;

        Ok(RoleKeys {
            sign,
            tls_root,
            admin,
            client,
        })
    }

    /// Fetch an organization, `NotFound` if absent.
    pub fn get(&self, organization_id: u64) -> KeyResult<OrganizationRecord> {
        self.organizations()
            .get(organization_id)?
            .ok_or_else(|| KeyError::NotFound(format!("organization {organization_id}")))
    }

    /// Fetch an organization by MSP identifier.
    pub fn get_by_msp_id(&self, msp_id: &str) -> KeyResult<OrganizationRecord> {
        self.organizations()
            .get_by_msp_id(msp_id)?
            .ok_or_else(|| KeyError::NotFound(format!("organization with MSP id {msp_id}")))
    }

    /// All organizations in id order.
    pub fn list(&self) -> KeyResult<Vec<OrganizationRecord>> {
        Ok(self.organizations().list()?)
    }

    /// Delete an organization, its revocations and its role keys.
    ///
    /// Keys already deleted on their own are skipped. Every key is
    /// attempted; the first other failure is returned afterwards.
    pub fn delete(&self, organization_id: u64) -> KeyResult<OrganizationRecord> {
        let organization = self
            .organizations()
            .delete_cascade(organization_id)?
            .ok_or_else(|| KeyError::NotFound(format!("organization {organization_id}")))?;

        let mut first_error = None;
        for key_id in organization.key_ids() {
            match self.provider.delete_key(key_id) {
                Ok(()) => {}
                Err(KeyError::NotFound(_)) => {
                    tracing::debug!(organization_id, key_id, "Organization key already deleted");
                }
                Err(e) => {
                    tracing::warn!(organization_id, key_id, error = %e, "Failed to delete organization key");
                    first_error.get_or_insert(e);
                }
            }
        }

        tracing::info!(organization_id, msp_id = %organization.msp_id, "Organization deleted");
        AuditRepository::new(&self.db).record(
            AuditEvent::new(AuditEventType::OrganizationDeleted)
                .with_resource("organization", organization_id)
                .with_details(json!({ "msp_id": organization.msp_id })),
        );

        match first_error {
            Some(e) => Err(e),
            None => Ok(organization),
        }
    }
}
