//! Certificate handling: bootstrap issuance, metadata extraction and trust
//! chain validation.

use chrono::{DateTime, TimeZone, Utc};
use rcgen::{
    CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, Ia5String, IsCa,
    KeyPair, KeyUsagePurpose, SanType, SerialNumber,
};
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::error::DirectError;
use crate::Result;

/// Metadata lifted from a PEM certificate.
#[derive(Debug, Clone)]
pub struct CertificateInfo {
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub issuer_cn: Option<String>,
    pub subject_cn: Option<String>,
}

/// Self-signed certificate for a Direct address: CN and rfc822 SAN set to
/// the address, digital-signature/key-encipherment usage plus email
/// protection, one year of validity.
///
/// Only reachable when the gateway runs with `insecure_bootstrap`; real
/// deployments obtain certificates from their HISP.
pub fn generate_bootstrap_certificate(address: &str) -> Result<(String, String)> {
    let mut params = CertificateParams::default();

    let mut subject = DistinguishedName::new();
    subject.push(DnType::CommonName, address);
    params.distinguished_name = subject;
    params.is_ca = IsCa::NoCa;

    let san = Ia5String::try_from(address.to_string())
        .map_err(|e| DirectError::Crypto(format!("address is not a valid SAN: {e}")))?;
    params.subject_alt_names.push(SanType::Rfc822Name(san));

    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
    ];
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::EmailProtection];

    let now = time::OffsetDateTime::now_utc();
    params.not_before = now;
    params.not_after = now + time::Duration::days(365);
    params.serial_number = Some(SerialNumber::from(
        uuid::Uuid::new_v4().as_bytes().to_vec(),
    ));

    let key_pair =
        KeyPair::generate().map_err(|e| DirectError::Crypto(format!("key generation: {e}")))?;
    let cert = params
        .self_signed(&key_pair)
        .map_err(|e| DirectError::Crypto(format!("certificate generation: {e}")))?;

    Ok((cert.pem(), key_pair.serialize_pem()))
}

pub fn certificate_info(cert_pem: &str) -> Result<CertificateInfo> {
    let der = pem::parse(cert_pem)
        .map_err(|e| DirectError::Crypto(format!("certificate PEM: {e}")))?;
    let (_, cert) = X509Certificate::from_der(der.contents())
        .map_err(|e| DirectError::Crypto(format!("certificate DER: {e}")))?;

    let validity = cert.validity();
    Ok(CertificateInfo {
        not_before: timestamp(validity.not_before.timestamp()),
        not_after: timestamp(validity.not_after.timestamp()),
        issuer_cn: common_name(cert.issuer()),
        subject_cn: common_name(cert.subject()),
    })
}

/// Verify `cert_pem` against the trust anchors: it must be inside its
/// validity window and carry a signature verifiable by at least one anchor
/// key. Any parse failure, and an empty anchor set, fail closed.
pub fn validate_trust_chain(cert_pem: &str, anchors: &[String]) -> bool {
    let Ok(der) = pem::parse(cert_pem) else {
        return false;
    };
    let der = der.contents().to_vec();
    let Ok((_, cert)) = X509Certificate::from_der(&der) else {
        return false;
    };

    if !cert.validity().is_valid() {
        tracing::warn!("certificate outside validity period");
        return false;
    }

    anchors.iter().any(|anchor_pem| {
        let Ok(anchor_der) = pem::parse(anchor_pem) else {
            return false;
        };
        let anchor_der = anchor_der.contents().to_vec();
        let Ok((_, anchor)) = X509Certificate::from_der(&anchor_der) else {
            return false;
        };
        cert.verify_signature(Some(anchor.public_key())).is_ok()
    })
}

fn timestamp(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
}

fn common_name(name: &x509_parser::x509::X509Name) -> Option<String> {
    name.iter_common_name()
        .next()
        .and_then(|attr| attr.as_str().ok())
        .map(str::to_string)
}
