//! S/MIME wrapping. Payloads travel as `application/pkcs7-mime` entities
//! with 76-column base64 bodies.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::crypto::{EncryptedPayload, SignedPayload};
use crate::error::DirectError;
use crate::Result;

const BASE64_LINE_WIDTH: usize = 76;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmimeType {
    SignedData,
    EnvelopedData,
}

impl SmimeType {
    pub fn label(self) -> &'static str {
        match self {
            SmimeType::SignedData => "signed-data",
            SmimeType::EnvelopedData => "enveloped-data",
        }
    }

    fn from_label(label: &str) -> Option<Self> {
        match label {
            "signed-data" => Some(SmimeType::SignedData),
            "enveloped-data" => Some(SmimeType::EnvelopedData),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SmimeEntity {
    pub smime_type: SmimeType,
    pub payload: Vec<u8>,
}

/// Wrap raw payload bytes in an S/MIME entity with CRLF line endings.
pub fn wrap_smime(payload: &[u8], smime_type: SmimeType) -> String {
    let encoded = BASE64.encode(payload);
    let mut lines = vec![
        format!(
            "Content-Type: application/pkcs7-mime; smime-type={}; name=\"smime.p7m\"",
            smime_type.label()
        ),
        "Content-Transfer-Encoding: base64".to_string(),
        "Content-Disposition: attachment; filename=\"smime.p7m\"".to_string(),
        String::new(),
    ];
    let bytes = encoded.as_bytes();
    for chunk in bytes.chunks(BASE64_LINE_WIDTH) {
        // Chunks of a base64 string are valid UTF-8.
        lines.push(String::from_utf8_lossy(chunk).into_owned());
    }
    lines.join("\r\n")
}

/// Parse an S/MIME entity: read the smime-type from the headers and decode
/// the base64 body after the first blank line.
pub fn parse_smime(message: &str) -> Result<SmimeEntity> {
    let mut smime_type = None;
    let mut body_lines = Vec::new();
    let mut in_body = false;

    for line in message.lines() {
        let line = line.trim_end_matches('\r');
        if in_body {
            body_lines.push(line.trim());
            continue;
        }
        if line.is_empty() {
            in_body = true;
            continue;
        }
        let lowered = line.to_ascii_lowercase();
        if lowered.starts_with("content-type:") {
            smime_type = lowered
                .split(';')
                .filter_map(|part| part.trim().strip_prefix("smime-type="))
                .find_map(SmimeType::from_label);
        }
    }

    let smime_type = smime_type
        .ok_or_else(|| DirectError::Mime("missing or unknown smime-type".to_string()))?;
    let payload = BASE64
        .decode(body_lines.concat())
        .map_err(|e| DirectError::Mime(format!("S/MIME body is not base64: {e}")))?;

    Ok(SmimeEntity {
        smime_type,
        payload,
    })
}

pub fn wrap_signed(payload: &SignedPayload) -> Result<String> {
    let json = serde_json::to_vec(payload)
        .map_err(|e| DirectError::Mime(format!("signed payload encoding: {e}")))?;
    Ok(wrap_smime(&json, SmimeType::SignedData))
}

pub fn wrap_enveloped(payload: &EncryptedPayload) -> Result<String> {
    let json = serde_json::to_vec(payload)
        .map_err(|e| DirectError::Mime(format!("enveloped payload encoding: {e}")))?;
    Ok(wrap_smime(&json, SmimeType::EnvelopedData))
}

pub fn unwrap_signed(message: &str) -> Result<SignedPayload> {
    let entity = parse_smime(message)?;
    if entity.smime_type != SmimeType::SignedData {
        return Err(DirectError::Mime("expected signed-data entity".to_string()));
    }
    serde_json::from_slice(&entity.payload)
        .map_err(|e| DirectError::Mime(format!("signed payload decoding: {e}")))
}

pub fn unwrap_enveloped(message: &str) -> Result<EncryptedPayload> {
    let entity = parse_smime(message)?;
    if entity.smime_type != SmimeType::EnvelopedData {
        return Err(DirectError::Mime(
            "expected enveloped-data entity".to_string(),
        ));
    }
    serde_json::from_slice(&entity.payload)
        .map_err(|e| DirectError::Mime(format!("enveloped payload decoding: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_entities_round_trip() {
        let payload = vec![0u8; 200];
        let wrapped = wrap_smime(&payload, SmimeType::EnvelopedData);
        assert!(wrapped.contains("smime-type=enveloped-data"));

        // The body is folded to 76 columns.
        let body = wrapped.split("\r\n\r\n").nth(1).unwrap();
        assert!(body.lines().all(|l| l.len() <= 76));

        let entity = parse_smime(&wrapped).unwrap();
        assert_eq!(entity.smime_type, SmimeType::EnvelopedData);
        assert_eq!(entity.payload, payload);
    }

    #[test]
    fn unknown_smime_type_is_rejected() {
        let message = "Content-Type: application/pkcs7-mime; smime-type=compressed-data\r\n\r\nAAAA";
        assert!(parse_smime(message).is_err());
    }

    #[test]
    fn entity_kind_mismatch_is_rejected() {
        let wrapped = wrap_smime(b"{}", SmimeType::SignedData);
        assert!(unwrap_enveloped(&wrapped).is_err());
    }
}
