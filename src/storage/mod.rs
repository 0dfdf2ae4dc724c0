// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Key Storage Module
//!
//! Persistent storage for keys, organizations, revocations, provider
//! registrations and the audit trail, backed by a single redb file under
//! `DATA_DIR`.
//!
//! ## Security Model
//!
//! - Private keys are sealed with AES-256-GCM before they reach this layer
//! - The database never sees plaintext key material or the master key
//! - Multi-row mutations commit atomically or not at all
//!
//! ## Storage Layout
//!
//! ```text
//! /data/
//!   keys.redb
//!     keys                  key_id -> KeyRecord
//!     organizations         organization_id -> OrganizationRecord
//!     revoked_certificates  org_id|serial -> RevokedCertificateRecord
//!     key_providers         provider_id -> KeyProviderRecord
//!     audit_events          timestamp|event_id -> AuditEvent
//!     sequences             name -> last id
//! ```

pub mod database;
pub mod repository;

pub use database::{KeyDatabase, StoreError, StoreResult};
pub use repository::{
    AuditEvent, AuditEventType, AuditRepository, KeyProviderRecord, KeyRecord, KeyRepository,
    KeyStatus, OrganizationRecord, OrganizationRepository, ProviderRepository,
    RevocationRepository, RevokedCertificateRecord,
};
