// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Cryptographic building blocks: key generation, envelope encryption,
//! certificate and CRL issuance, Ethereum address derivation.
//!
//! Nothing in here touches storage; providers compose these pieces.

pub mod address;
pub mod certificate;
pub mod crl;
pub mod envelope;
pub mod keygen;

pub use certificate::{
    CertificateAuthority, CertificateInfo, CertificateTemplate, ExtKeyUsage, IssuedCertificate,
    KeyUsage,
};
pub use crl::{CrlEntry, RevocationReason};
pub use envelope::{EncryptedEnvelope, EnvelopeCipher};
pub use keygen::{EcCurve, Fingerprints, GeneratedKeyPair, KeyAlgorithm, KeyFormat, KeySpec};
