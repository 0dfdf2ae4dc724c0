// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Certificate revocation list encoding.

use std::fmt;

use chrono::{DateTime, Utc};
use rcgen::{CertificateRevocationListParams, KeyIdMethod, RevokedCertParams, SerialNumber};
use serde::{Deserialize, Serialize};

use super::certificate::{to_offset, CertificateAuthority};
use crate::error::{KeyError, KeyResult};

/// RFC 5280 CRLReason. Code 7 is unassigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum RevocationReason {
    Unspecified,
    KeyCompromise,
    CaCompromise,
    AffiliationChanged,
    Superseded,
    CessationOfOperation,
    CertificateHold,
    RemoveFromCrl,
    PrivilegeWithdrawn,
    AaCompromise,
}

impl RevocationReason {
    pub fn code(self) -> u8 {
        match self {
            RevocationReason::Unspecified => 0,
            RevocationReason::KeyCompromise => 1,
            RevocationReason::CaCompromise => 2,
            RevocationReason::AffiliationChanged => 3,
            RevocationReason::Superseded => 4,
            RevocationReason::CessationOfOperation => 5,
            RevocationReason::CertificateHold => 6,
            RevocationReason::RemoveFromCrl => 8,
            RevocationReason::PrivilegeWithdrawn => 9,
            RevocationReason::AaCompromise => 10,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => RevocationReason::Unspecified,
            1 => RevocationReason::KeyCompromise,
            2 => RevocationReason::CaCompromise,
            3 => RevocationReason::AffiliationChanged,
            4 => RevocationReason::Superseded,
            5 => RevocationReason::CessationOfOperation,
            6 => RevocationReason::CertificateHold,
            8 => RevocationReason::RemoveFromCrl,
            9 => RevocationReason::PrivilegeWithdrawn,
            10 => RevocationReason::AaCompromise,
            _ => return None,
        })
    }
}

impl TryFrom<u8> for RevocationReason {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::from_code(code).ok_or_else(|| format!("unknown CRL reason code {code}"))
    }
}

impl From<RevocationReason> for u8 {
    fn from(reason: RevocationReason) -> Self {
        reason.code()
    }
}

impl fmt::Display for RevocationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}

impl From<RevocationReason> for rcgen::RevocationReason {
    fn from(reason: RevocationReason) -> Self {
        match reason {
            RevocationReason::Unspecified => rcgen::RevocationReason::Unspecified,
            RevocationReason::KeyCompromise => rcgen::RevocationReason::KeyCompromise,
            RevocationReason::CaCompromise => rcgen::RevocationReason::CaCompromise,
            RevocationReason::AffiliationChanged => rcgen::RevocationReason::AffiliationChanged,
            RevocationReason::Superseded => rcgen::RevocationReason::Superseded,
            RevocationReason::CessationOfOperation => {
                rcgen::RevocationReason::CessationOfOperation
            }
            RevocationReason::CertificateHold => rcgen::RevocationReason::CertificateHold,
            RevocationReason::RemoveFromCrl => rcgen::RevocationReason::RemoveFromCrl,
            RevocationReason::PrivilegeWithdrawn => rcgen::RevocationReason::PrivilegeWithdrawn,
            RevocationReason::AaCompromise => rcgen::RevocationReason::AaCompromise,
        }
    }
}

/// One revoked serial as it appears in the list.
#[derive(Debug, Clone)]
pub struct CrlEntry {
    /// Big-endian serial bytes.
    pub serial: Vec<u8>,
    pub revoked_at: DateTime<Utc>,
    pub reason: RevocationReason,
}

/// Sign a CRL with `issuer` and return it PEM encoded (`X509 CRL`).
pub fn build_crl(
    issuer: &CertificateAuthority,
    crl_number: u64,
    this_update: DateTime<Utc>,
    next_update: DateTime<Utc>,
    entries: &[CrlEntry],
) -> KeyResult<String> {
    let revoked_certs = entries
        .iter()
        .map(|entry| {
            Ok(RevokedCertParams {
                serial_number: SerialNumber::from_slice(&entry.serial),
                revocation_time: to_offset(entry.revoked_at)?,
                reason_code: Some(entry.reason.into()),
                invalidity_date: None,
            })
        })
        .collect::<KeyResult<Vec<_>>>()?;

    let params = CertificateRevocationListParams {
        this_update: to_offset(this_update)?,
        next_update: to_offset(next_update)?,
        crl_number: SerialNumber::from_slice(minimal_be_bytes(&crl_number.to_be_bytes())),
        issuing_distribution_point: None,
        revoked_certs,
        key_identifier_method: KeyIdMethod::Sha256,
    };

    let crl = params
        .signed_by(issuer.certificate(), issuer.key())
        .map_err(|e| KeyError::signing("sign CRL", e))?;
    crl.pem().map_err(|e| KeyError::encoding("CRL PEM", e))
}

fn minimal_be_bytes(bytes: &[u8]) -> &[u8] {
    let first = bytes
        .iter()
        .position(|b| *b != 0)
        .unwrap_or(bytes.len().saturating_sub(1));
    &bytes[first..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::certificate::{issue_self_signed, normalize_serial, CertificateTemplate};
    use crate::crypto::keygen::KeySpec;
    use chrono::Duration;

    #[test]
    fn reason_codes_skip_seven() {
        for code in (0..=6).chain(8..=10) {
            assert_eq!(RevocationReason::from_code(code).unwrap().code(), code);
        }
        assert!(RevocationReason::from_code(7).is_none());
        assert!(RevocationReason::from_code(11).is_none());
        assert!(serde_json::from_str::<RevocationReason>("7").is_err());
        assert_eq!(
            serde_json::to_string(&RevocationReason::Superseded).unwrap(),
            "4"
        );
    }

    #[test]
    fn crl_lists_entries_with_reasons() {
        let pair = KeySpec::EcP256.generate().unwrap();
        let template = CertificateTemplate::new("Org1 CA").as_ca();
        let ca = issue_self_signed(&pair.private_key, &template).unwrap();
        let issuer = CertificateAuthority::load(&pair.private_key, &ca.pem).unwrap();

        let now = DateTime::from_timestamp(Utc::now().timestamp(), 0).unwrap();
        let entries = vec![
            CrlEntry {
                serial: vec![0x01, 0x23],
                revoked_at: now,
                reason: RevocationReason::KeyCompromise,
            },
            CrlEntry {
                serial: vec![0xab],
                revoked_at: now,
                reason: RevocationReason::Superseded,
            },
        ];
        let pem_crl = build_crl(&issuer, 5, now, now + Duration::days(7), &entries).unwrap();
        assert!(pem_crl.contains("BEGIN X509 CRL"));

        let der = pem::parse(&pem_crl).unwrap().contents().to_vec();
        let (_, crl) = x509_parser::parse_x509_crl(&der).unwrap();
        assert_eq!(crl.next_update().unwrap().timestamp(), (now + Duration::days(7)).timestamp());

        let listed: Vec<(String, u8)> = crl
            .iter_revoked_certificates()
            .map(|revoked| {
                let reason = revoked.reason_code().map(|(_, code)| code.0).unwrap();
                let serial = normalize_serial(&alloy::hex::encode(revoked.raw_serial())).unwrap();
                (serial, reason)
            })
            .collect();
        assert_eq!(
            listed,
            vec![("123".to_string(), 1), ("ab".to_string(), 4)]
        );
    }
}
