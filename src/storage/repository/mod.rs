// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Repository layer providing typed access to the key database.
//!
//! Each repository borrows the [`KeyDatabase`](super::KeyDatabase) and
//! offers CRUD for one entity; operations spanning several tables run in a
//! single write transaction inside the repository that owns them.

pub mod audit;
pub mod keys;
pub mod organizations;
pub mod providers;
pub mod revocations;

pub use audit::{AuditEvent, AuditEventType, AuditRepository};
pub use keys::{KeyRecord, KeyRepository, KeyStatus};
pub use organizations::{OrganizationRecord, OrganizationRepository};
pub use providers::{KeyProviderRecord, ProviderRepository};
pub use revocations::{RevocationRepository, RevokedCertificateRecord};
