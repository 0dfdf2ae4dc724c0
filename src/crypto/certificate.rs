// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! X.509 certificate issuance and inspection.
//!
//! Two shapes are issued:
//!
//! - **Self-signed**: subject and issuer are the same key. When the template
//!   asks for a CA, basic constraints mark it as one and key usage always
//!   includes certificate and CRL signing.
//! - **CA-signed leaf**: subject key certified by a stored CA key.
//!
//! Serial numbers are 128 random bits. NotBefore is backdated one minute to
//! absorb clock skew between issuer and relying parties.

use std::net::IpAddr;

use chrono::{DateTime, Duration, Months, Utc};
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType,
    ExtendedKeyUsagePurpose, Ia5String, IsCa, KeyPair, KeyUsagePurpose, SanType, SerialNumber,
};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{KeyError, KeyResult};

/// Default CA lifetime.
pub const CA_VALIDITY_MONTHS: u32 = 120;

/// Default leaf lifetime.
pub const LEAF_VALIDITY_MONTHS: u32 = 12;

const CLOCK_SKEW_MINUTES: i64 = 1;
const SERIAL_LEN: usize = 16;

// X.520 attribute types rcgen has no named variant for
const OID_STREET_ADDRESS: [u64; 4] = [2, 5, 4, 9];
const OID_POSTAL_CODE: [u64; 4] = [2, 5, 4, 17];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyUsage {
    DigitalSignature,
    ContentCommitment,
    KeyEncipherment,
    DataEncipherment,
    KeyAgreement,
    CertSign,
    CrlSign,
    EncipherOnly,
    DecipherOnly,
}

impl From<KeyUsage> for KeyUsagePurpose {
    fn from(usage: KeyUsage) -> Self {
        match usage {
            KeyUsage::DigitalSignature => KeyUsagePurpose::DigitalSignature,
            KeyUsage::ContentCommitment => KeyUsagePurpose::ContentCommitment,
            KeyUsage::KeyEncipherment => KeyUsagePurpose::KeyEncipherment,
            KeyUsage::DataEncipherment => KeyUsagePurpose::DataEncipherment,
            KeyUsage::KeyAgreement => KeyUsagePurpose::KeyAgreement,
            KeyUsage::CertSign => KeyUsagePurpose::KeyCertSign,
            KeyUsage::CrlSign => KeyUsagePurpose::CrlSign,
            KeyUsage::EncipherOnly => KeyUsagePurpose::EncipherOnly,
            KeyUsage::DecipherOnly => KeyUsagePurpose::DecipherOnly,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtKeyUsage {
    Any,
    ServerAuth,
    ClientAuth,
    CodeSigning,
    EmailProtection,
    TimeStamping,
    OcspSigning,
}

impl From<ExtKeyUsage> for ExtendedKeyUsagePurpose {
    fn from(usage: ExtKeyUsage) -> Self {
        match usage {
            ExtKeyUsage::Any => ExtendedKeyUsagePurpose::Any,
            ExtKeyUsage::ServerAuth => ExtendedKeyUsagePurpose::ServerAuth,
            ExtKeyUsage::ClientAuth => ExtendedKeyUsagePurpose::ClientAuth,
            ExtKeyUsage::CodeSigning => ExtendedKeyUsagePurpose::CodeSigning,
            ExtKeyUsage::EmailProtection => ExtendedKeyUsagePurpose::EmailProtection,
            ExtKeyUsage::TimeStamping => ExtendedKeyUsagePurpose::TimeStamping,
            ExtKeyUsage::OcspSigning => ExtendedKeyUsagePurpose::OcspSigning,
        }
    }
}

/// Subject, extensions and validity for a certificate to be issued.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CertificateTemplate {
    pub common_name: String,
    pub organization: Option<String>,
    pub organizational_unit: Option<String>,
    pub country: Option<String>,
    pub province: Option<String>,
    pub locality: Option<String>,
    pub street_address: Option<String>,
    pub postal_code: Option<String>,
    pub dns_names: Vec<String>,
    pub email_addresses: Vec<String>,
    pub ip_addresses: Vec<IpAddr>,
    pub uris: Vec<String>,
    /// Start of validity; defaults to now.
    pub not_before: Option<DateTime<Utc>>,
    /// End of validity; defaults to +10 years for CAs, +1 year for leaves.
    pub not_after: Option<DateTime<Utc>>,
    pub key_usage: Vec<KeyUsage>,
    pub ext_key_usage: Vec<ExtKeyUsage>,
    pub is_ca: bool,
}

impl CertificateTemplate {
    pub fn new(common_name: impl Into<String>) -> Self {
        Self {
            common_name: common_name.into(),
            ..Default::default()
        }
    }

    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }

    pub fn with_organizational_unit(mut self, unit: impl Into<String>) -> Self {
        self.organizational_unit = Some(unit.into());
        self
    }

    pub fn as_ca(mut self) -> Self {
        self.is_ca = true;
        self
    }

    fn distinguished_name(&self) -> KeyResult<DistinguishedName> {
        if self.common_name.trim().is_empty() {
            return Err(KeyError::InvalidParameters(
                "certificate common name must not be empty".to_string(),
            ));
        }

        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, self.common_name.as_str());
        let optional = [
            (DnType::OrganizationName, &self.organization),
            (DnType::OrganizationalUnitName, &self.organizational_unit),
            (DnType::CountryName, &self.country),
            (DnType::StateOrProvinceName, &self.province),
            (DnType::LocalityName, &self.locality),
            (DnType::CustomDnType(OID_STREET_ADDRESS.to_vec()), &self.street_address),
            (DnType::CustomDnType(OID_POSTAL_CODE.to_vec()), &self.postal_code),
        ];
        for (ty, value) in optional {
            if let Some(value) = value {
                dn.push(ty, value.as_str());
            }
        }
        Ok(dn)
    }

    fn subject_alt_names(&self) -> KeyResult<Vec<SanType>> {
        let ia5 = |value: &String, kind: &str| -> KeyResult<Ia5String> {
            value
                .clone()
                .try_into()
                .map_err(|_| KeyError::InvalidParameters(format!("{kind} {value:?} is not IA5")))
        };

        let mut sans = Vec::new();
        for name in &self.dns_names {
            sans.push(SanType::DnsName(ia5(name, "DNS name")?));
        }
        for email in &self.email_addresses {
            sans.push(SanType::Rfc822Name(ia5(email, "email address")?));
        }
        for ip in &self.ip_addresses {
            sans.push(SanType::IpAddress(*ip));
        }
        for uri in &self.uris {
            sans.push(SanType::URI(ia5(uri, "URI")?));
        }
        Ok(sans)
    }

    /// Resolve the validity window, backdating NotBefore.
    fn validity(&self, default_months: u32) -> KeyResult<(DateTime<Utc>, DateTime<Utc>)> {
        let start = self.not_before.unwrap_or_else(Utc::now);
        let not_before = start - Duration::minutes(CLOCK_SKEW_MINUTES);
        let not_after = match self.not_after {
            Some(end) => end,
            None => start
                .checked_add_months(Months::new(default_months))
                .ok_or_else(|| KeyError::InvalidParameters("validity overflows".to_string()))?,
        };
        if not_after <= not_before {
            return Err(KeyError::InvalidParameters(
                "certificate NotAfter must be later than NotBefore".to_string(),
            ));
        }
        Ok((not_before, not_after))
    }

    fn to_params(&self, is_ca: bool) -> KeyResult<CertificateParams> {
        let default_months = if is_ca { CA_VALIDITY_MONTHS } else { LEAF_VALIDITY_MONTHS };
        let (not_before, not_after) = self.validity(default_months)?;

        let mut params = CertificateParams::default();
        params.distinguished_name = self.distinguished_name()?;
        params.subject_alt_names = self.subject_alt_names()?;
        params.serial_number = Some(random_serial()?);
        params.not_before = to_offset(not_before)?;
        params.not_after = to_offset(not_after)?;
        params.extended_key_usages = self.ext_key_usage.iter().map(|u| (*u).into()).collect();

        if is_ca {
            params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
            let mut usages = self.key_usage.clone();
            if usages.is_empty() {
                usages.push(KeyUsage::DigitalSignature);
            }
            for required in [KeyUsage::CertSign, KeyUsage::CrlSign] {
                if !usages.contains(&required) {
                    usages.push(required);
                }
            }
            params.key_usages = usages.into_iter().map(Into::into).collect();
        } else {
            params.is_ca = IsCa::ExplicitNoCa;
            params.use_authority_key_identifier_extension = true;
            params.key_usages = if self.key_usage.is_empty() {
                vec![KeyUsagePurpose::DigitalSignature]
            } else {
                self.key_usage.iter().map(|u| (*u).into()).collect()
            };
        }
        Ok(params)
    }
}

/// Parsed facts about a PEM certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    /// Normalized serial (lowercase hex, no leading zeros).
    pub serial_hex: String,
    pub is_ca: bool,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub subject_common_name: Option<String>,
    /// DER SubjectPublicKeyInfo.
    pub public_key_der: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct IssuedCertificate {
    pub pem: String,
    pub info: CertificateInfo,
}

/// A CA key and certificate loaded for signing.
pub struct CertificateAuthority {
    key: KeyPair,
    certificate: Certificate,
}

impl CertificateAuthority {
    /// Load a stored CA.
    ///
    /// The issuer certificate is rebuilt from the stored PEM so that issued
    /// certificates carry its exact subject name.
    pub fn load(private_key_pem: &str, certificate_pem: &str) -> KeyResult<Self> {
        let key = load_key_pair(private_key_pem)?;
        let params = CertificateParams::from_ca_cert_pem(certificate_pem)
            .map_err(|e| KeyError::signing("load CA certificate", e))?;
        let certificate = params
            .self_signed(&key)
            .map_err(|e| KeyError::signing("load CA certificate", e))?;
        Ok(Self { key, certificate })
    }

    /// Issue a leaf certificate for `subject_private_key_pem`.
    pub fn sign_leaf(
        &self,
        subject_private_key_pem: &str,
        template: &CertificateTemplate,
    ) -> KeyResult<IssuedCertificate> {
        let subject_key = load_key_pair(subject_private_key_pem)?;
        let params = template.to_params(false)?;
        let certificate = params
            .signed_by(&subject_key, &self.certificate, &self.key)
            .map_err(|e| KeyError::signing("sign leaf certificate", e))?;
        issued(certificate.pem())
    }

    pub(crate) fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    pub(crate) fn key(&self) -> &KeyPair {
        &self.key
    }
}

/// Issue a self-signed certificate for `private_key_pem`; a CA when the
/// template says so.
pub fn issue_self_signed(
    private_key_pem: &str,
    template: &CertificateTemplate,
) -> KeyResult<IssuedCertificate> {
    let key = load_key_pair(private_key_pem)?;
    let params = template.to_params(template.is_ca)?;
    let certificate = params
        .self_signed(&key)
        .map_err(|e| KeyError::signing("self-sign certificate", e))?;
    issued(certificate.pem())
}

/// Parse a PEM certificate.
pub fn inspect(certificate_pem: &str) -> KeyResult<CertificateInfo> {
    let der = decode_pem(certificate_pem, "CERTIFICATE")?;
    let (_, cert) = x509_parser::parse_x509_certificate(&der)
        .map_err(|e| KeyError::InvalidParameters(format!("certificate is not valid DER: {e}")))?;

    let is_ca = cert
        .basic_constraints()
        .ok()
        .flatten()
        .map(|bc| bc.value.ca)
        .unwrap_or(false);

    let validity = cert.validity();
    let timestamp = |secs: i64| {
        DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| KeyError::InvalidParameters("certificate validity out of range".to_string()))
    };

    let subject_common_name = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(str::to_string);

    let serial_hex = normalize_serial(&alloy::hex::encode(cert.raw_serial()))
        .unwrap_or_else(|| "0".to_string());

    Ok(CertificateInfo {
        serial_hex,
        is_ca,
        not_before: timestamp(validity.not_before.timestamp())?,
        not_after: timestamp(validity.not_after.timestamp())?,
        subject_common_name,
        public_key_der: cert.public_key().raw.to_vec(),
    })
}

/// Whether a certificate certifies the given SPKI PEM public key.
pub fn certifies_public_key(certificate_pem: &str, public_key_pem: &str) -> KeyResult<bool> {
    let info = inspect(certificate_pem)?;
    let public_key = decode_pem(public_key_pem, "PUBLIC KEY")?;
    Ok(info.public_key_der == public_key)
}

/// Whether `certificate_pem` carries a valid signature by the key of
/// `issuer_pem`.
pub fn is_issued_by(certificate_pem: &str, issuer_pem: &str) -> KeyResult<bool> {
    let der = decode_pem(certificate_pem, "CERTIFICATE")?;
    let issuer_der = decode_pem(issuer_pem, "CERTIFICATE")?;
    let (_, cert) = x509_parser::parse_x509_certificate(&der)
        .map_err(|e| KeyError::InvalidParameters(format!("certificate is not valid DER: {e}")))?;
    let (_, issuer) = x509_parser::parse_x509_certificate(&issuer_der)
        .map_err(|e| KeyError::InvalidParameters(format!("issuer certificate is not valid DER: {e}")))?;
    Ok(cert.issuer().as_raw() == issuer.subject().as_raw()
        && cert.verify_signature(Some(issuer.public_key())).is_ok())
}

/// Canonical serial form: optional `0x` stripped, lowercase, no leading
/// zeros. `None` when the input is empty or not hex.
pub fn normalize_serial(serial: &str) -> Option<String> {
    let trimmed = serial.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let stripped = digits.trim_start_matches('0').to_ascii_lowercase();
    Some(if stripped.is_empty() { "0".to_string() } else { stripped })
}

/// Big-endian bytes of a hex serial, or `None` when it is not hex.
pub fn serial_bytes(serial: &str) -> Option<Vec<u8>> {
    let normalized = normalize_serial(serial)?;
    let padded = if normalized.len() % 2 == 1 {
        format!("0{normalized}")
    } else {
        normalized
    };
    alloy::hex::decode(padded).ok()
}

pub(crate) fn to_offset(timestamp: DateTime<Utc>) -> KeyResult<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(timestamp.timestamp())
        .map_err(|e| KeyError::InvalidParameters(format!("timestamp out of range: {e}")))
}

fn random_serial() -> KeyResult<SerialNumber> {
    let mut bytes = [0u8; SERIAL_LEN];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| KeyError::signing("serial number", "system random source failed"))?;
    if bytes.iter().all(|b| *b == 0) {
        bytes[SERIAL_LEN - 1] = 1;
    }
    Ok(SerialNumber::from_slice(&bytes))
}

fn load_key_pair(private_key_pem: &str) -> KeyResult<KeyPair> {
    KeyPair::from_pem(private_key_pem).map_err(|e| {
        KeyError::InvalidParameters(format!("key type cannot be used for certificates: {e}"))
    })
}

fn decode_pem(input: &str, expected_tag: &str) -> KeyResult<Vec<u8>> {
    let block = pem::parse(input)
        .map_err(|e| KeyError::InvalidParameters(format!("invalid PEM: {e}")))?;
    if block.tag() != expected_tag {
        return Err(KeyError::InvalidParameters(format!(
            "expected PEM block {expected_tag:?}, found {:?}",
            block.tag()
        )));
    }
    Ok(block.contents().to_vec())
}

fn issued(pem: String) -> KeyResult<IssuedCertificate> {
    let info = inspect(&pem)?;
    Ok(IssuedCertificate { pem, info })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keygen::KeySpec;

    fn parse(pem: &str) -> Vec<u8> {
        pem::parse(pem).unwrap().contents().to_vec()
    }

    fn ca_template() -> CertificateTemplate {
        CertificateTemplate::new("Org1 Root CA")
            .with_organization("Org1")
            .as_ca()
    }

    #[test]
    fn self_signed_ca_has_ca_flag_and_defaults() {
        let pair = KeySpec::EcP256.generate().unwrap();
        let ca = issue_self_signed(&pair.private_key, &ca_template()).unwrap();

        assert!(ca.pem.starts_with("-----BEGIN CERTIFICATE-----"));
        assert!(ca.info.is_ca);
        assert_eq!(ca.info.subject_common_name.as_deref(), Some("Org1 Root CA"));
        assert!(ca.info.not_before <= Utc::now() - Duration::seconds(30));
        let lifetime = ca.info.not_after - ca.info.not_before;
        assert!(lifetime > Duration::days(3650 - 1));
        assert!(certifies_public_key(&ca.pem, &pair.public_key).unwrap());
    }

    #[test]
    fn leaf_chains_to_ca() {
        for spec in [KeySpec::EcP256, KeySpec::EcP384, KeySpec::Ed25519] {
            let ca_pair = spec.generate().unwrap();
            let ca = issue_self_signed(&ca_pair.private_key, &ca_template()).unwrap();
            let authority = CertificateAuthority::load(&ca_pair.private_key, &ca.pem).unwrap();

            let leaf_pair = KeySpec::EcP256.generate().unwrap();
            let mut template = CertificateTemplate::new("peer0.org1");
            template.dns_names = vec!["peer0.org1.example.com".to_string()];
            template.ip_addresses = vec!["127.0.0.1".parse().unwrap()];
            template.ext_key_usage = vec![ExtKeyUsage::ServerAuth, ExtKeyUsage::ClientAuth];
            let leaf = authority.sign_leaf(&leaf_pair.private_key, &template).unwrap();

            assert!(!leaf.info.is_ca, "{spec}");
            assert!(certifies_public_key(&leaf.pem, &leaf_pair.public_key).unwrap());
            let lifetime = leaf.info.not_after - leaf.info.not_before;
            assert!(lifetime < Duration::days(367) && lifetime > Duration::days(364));

            let ca_der = parse(&ca.pem);
            let leaf_der = parse(&leaf.pem);
            let (_, ca_cert) = x509_parser::parse_x509_certificate(&ca_der).unwrap();
            let (_, leaf_cert) = x509_parser::parse_x509_certificate(&leaf_der).unwrap();
            assert_eq!(leaf_cert.issuer().to_string(), ca_cert.subject().to_string());
            leaf_cert
                .verify_signature(Some(ca_cert.public_key()))
                .unwrap();
        }
    }

    #[test]
    fn rsa_ca_signs_leaf() {
        let ca_pair = KeySpec::Rsa { bits: 2048 }.generate().unwrap();
        let ca = issue_self_signed(&ca_pair.private_key, &ca_template()).unwrap();
        let authority = CertificateAuthority::load(&ca_pair.private_key, &ca.pem).unwrap();
        let leaf_pair = KeySpec::Rsa { bits: 2048 }.generate().unwrap();
        let leaf = authority
            .sign_leaf(&leaf_pair.private_key, &CertificateTemplate::new("rsa leaf"))
            .unwrap();

        let ca_der = parse(&ca.pem);
        let leaf_der = parse(&leaf.pem);
        let (_, ca_cert) = x509_parser::parse_x509_certificate(&ca_der).unwrap();
        let (_, leaf_cert) = x509_parser::parse_x509_certificate(&leaf_der).unwrap();
        leaf_cert
            .verify_signature(Some(ca_cert.public_key()))
            .unwrap();
    }

    #[test]
    fn serials_are_random_and_positive() {
        let pair = KeySpec::EcP256.generate().unwrap();
        let a = issue_self_signed(&pair.private_key, &ca_template()).unwrap();
        let b = issue_self_signed(&pair.private_key, &ca_template()).unwrap();
        assert_ne!(a.info.serial_hex, b.info.serial_hex);
        assert!(a.info.serial_hex.len() <= 32);
    }

    #[test]
    fn explicit_validity_is_respected() {
        let pair = KeySpec::EcP256.generate().unwrap();
        let start = DateTime::from_timestamp(1_900_000_000, 0).unwrap();
        let end = DateTime::from_timestamp(1_950_000_000, 0).unwrap();
        let mut template = ca_template();
        template.not_before = Some(start);
        template.not_after = Some(end);
        let ca = issue_self_signed(&pair.private_key, &template).unwrap();
        assert_eq!(ca.info.not_before, start - Duration::minutes(1));
        assert_eq!(ca.info.not_after, end);
    }

    #[test]
    fn inverted_validity_is_rejected() {
        let pair = KeySpec::EcP256.generate().unwrap();
        let mut template = ca_template();
        template.not_before = Some(Utc::now());
        template.not_after = Some(Utc::now() - Duration::days(1));
        assert!(matches!(
            issue_self_signed(&pair.private_key, &template),
            Err(KeyError::InvalidParameters(_))
        ));
    }

    #[test]
    fn self_signed_without_ca_flag_is_a_leaf() {
        let pair = KeySpec::Ed25519.generate().unwrap();
        let cert = issue_self_signed(&pair.private_key, &CertificateTemplate::new("standalone")).unwrap();
        assert!(!cert.info.is_ca);
    }

    #[test]
    fn empty_common_name_is_rejected() {
        let pair = KeySpec::EcP256.generate().unwrap();
        assert!(matches!(
            issue_self_signed(&pair.private_key, &CertificateTemplate::default()),
            Err(KeyError::InvalidParameters(_))
        ));
    }

    #[test]
    fn unsupported_key_types_are_rejected() {
        let pair = KeySpec::EcP521.generate().unwrap();
        assert!(matches!(
            issue_self_signed(&pair.private_key, &ca_template()),
            Err(KeyError::InvalidParameters(_))
        ));
    }

    #[test]
    fn mismatched_public_key_is_detected() {
        let pair = KeySpec::EcP256.generate().unwrap();
        let other = KeySpec::EcP256.generate().unwrap();
        let ca = issue_self_signed(&pair.private_key, &ca_template()).unwrap();
        assert!(!certifies_public_key(&ca.pem, &other.public_key).unwrap());
    }

    #[test]
    fn inspect_rejects_non_certificates() {
        let pair = KeySpec::EcP256.generate().unwrap();
        assert!(inspect(&pair.public_key).is_err());
        assert!(inspect("garbage").is_err());
    }

    #[test]
    fn serial_normalization() {
        assert_eq!(normalize_serial("0x00AbC").as_deref(), Some("abc"));
        assert_eq!(normalize_serial("0X1f").as_deref(), Some("1f"));
        assert_eq!(normalize_serial("000").as_deref(), Some("0"));
        assert_eq!(normalize_serial(""), None);
        assert_eq!(normalize_serial("0x"), None);
        assert_eq!(normalize_serial("12g4"), None);

        assert_eq!(serial_bytes("abc").unwrap(), vec![0x0a, 0xbc]);
        assert_eq!(serial_bytes("0x0102").unwrap(), vec![0x01, 0x02]);
        assert!(serial_bytes("zz").is_none());
    }
}
