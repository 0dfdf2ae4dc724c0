// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Audit logging for security-sensitive operations.
//!
//! Key lifecycle, certificate signing, revocation and organization changes
//! are appended to the `audit_events` table, keyed by timestamp so that
//! iteration order is chronological.

use chrono::{DateTime, SecondsFormat, Utc};
use redb::ReadableTable;
use serde::{Deserialize, Serialize};

use crate::storage::database::{KeyDatabase, StoreResult, AUDIT_EVENTS};

/// Types of auditable events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    // Key events
    KeyGenerated,
    KeyImported,
    KeyDeleted,
    PrivateKeyAccessed,

    // PKI events
    CertificateSigned,
    CrlInitialized,
    CertificateRevoked,
    CrlIssued,

    // Organization events
    OrganizationProvisioned,
    OrganizationDeleted,

    // Admin events
    ProviderRegistered,
}

/// An audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Random UUID.
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub event_type: AuditEventType,
    /// User who triggered the event (if known).
    pub user_id: Option<String>,
    /// Resource affected (key id, organization id, ...).
    pub resource_id: Option<String>,
    /// Resource type (key, organization, provider).
    pub resource_type: Option<String>,
    pub details: Option<serde_json::Value>,
    /// False when the operation failed; see `error`.
    pub success: bool,
    pub error: Option<String>,
}

impl AuditEvent {
    /// Start a successful event of the given type, stamped now.
    pub fn new(event_type: AuditEventType) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type,
            user_id: None,
            resource_id: None,
            resource_type: None,
            details: None,
            success: true,
            error: None,
        }
    }

    /// Attribute the event to a user.
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Name the affected resource.
    pub fn with_resource(
        mut self,
        resource_type: impl Into<String>,
        resource_id: impl ToString,
    ) -> Self {
        self.resource_type = Some(resource_type.into());
        self.resource_id = Some(resource_id.to_string());
        self
    }

    /// Attach structured details.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Mark as failed with error message.
    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self
    }

    fn storage_key(&self) -> String {
        format!(
            "{}|{}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true),
            self.event_id
        )
    }
}

/// Repository for the append-only audit table.
pub struct AuditRepository<'a> {
    db: &'a KeyDatabase,
}

impl<'a> AuditRepository<'a> {
    /// Bind the repository to an open database.
    pub fn new(db: &'a KeyDatabase) -> Self {
        Self { db }
    }

    /// Append an event.
    pub fn log(&self, event: &AuditEvent) -> StoreResult<()> {
        let key = event.storage_key();
        let json = serde_json::to_vec(event)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(AUDIT_EVENTS)?;
            table.insert(key.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Record an event, downgrading storage failures to a warning.
    ///
    /// Callers use this after their own transaction committed; a lost audit
    /// line must not undo a completed key operation.
    pub fn record(&self, event: AuditEvent) {
        if let Err(e) = self.log(&event) {
            tracing::warn!(
                event_type = ?event.event_type,
                resource_id = ?event.resource_id,
                error = %e,
                "Failed to write audit event"
            );
        }
    }

    /// Most recent events first.
    pub fn list_recent(&self, limit: usize) -> StoreResult<Vec<AuditEvent>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(AUDIT_EVENTS)?;
        let mut events = Vec::with_capacity(limit);
        for entry in table.iter()?.rev() {
            if events.len() >= limit {
                break;
            }
            let (_, value) = entry?;
            events.push(serde_json::from_slice(value.value())?);
        }
        Ok(events)
    }

    /// Chronological events for one resource.
    pub fn list_for_resource(
        &self,
        resource_type: &str,
        resource_id: &str,
    ) -> StoreResult<Vec<AuditEvent>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(AUDIT_EVENTS)?;
        let mut events = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            let event: AuditEvent = serde_json::from_slice(value.value())?;
            if event.resource_type.as_deref() == Some(resource_type)
                && event.resource_id.as_deref() == Some(resource_id)
            {
                events.push(event);
            }
        }
        Ok(events)
    }
}
