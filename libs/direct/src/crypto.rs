//! Message cryptography: P-256 detached signatures and per-recipient
//! ECDH + AES-256-GCM content encryption.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use p256::ecdh::EphemeralSecret;
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::pkcs8::DecodePrivateKey;
use p256::{PublicKey, SecretKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::error::DirectError;
use crate::Result;

/// Detached signature over a message. The signing time is part of the
/// signed bytes, so it cannot be altered after the fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedPayload {
    pub content: String,
    /// Base64 DER-encoded ECDSA signature.
    pub signature: String,
    /// RFC 3339 signing time, covered by the signature.
    pub signing_time: String,
    /// PEM certificate of the signer.
    pub signer_certificate: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientKey {
    pub address: String,
    /// Base64 SEC1 ephemeral public key for this recipient.
    pub ephemeral_public: String,
    /// Content key wrapped with the ECDH-derived key.
    pub wrapped_key: String,
    pub wrap_nonce: String,
}

/// Content encrypted once under a random key, with that key wrapped
/// separately for every recipient.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedPayload {
    pub nonce: String,
    pub ciphertext: String,
    pub recipients: Vec<RecipientKey>,
}

fn signed_bytes(signing_time: &str, content: &str) -> Vec<u8> {
    format!("{signing_time}\n{content}").into_bytes()
}

pub fn sign_detached(
    content: &str,
    private_key_pem: &str,
    signer_certificate: &str,
) -> Result<SignedPayload> {
    let key = SigningKey::from_pkcs8_pem(private_key_pem)
        .map_err(|e| DirectError::Crypto(format!("signing key: {e}")))?;
    let signing_time = Utc::now().to_rfc3339();
    let signature: Signature = key.sign(&signed_bytes(&signing_time, content));

    Ok(SignedPayload {
        content: content.to_string(),
        signature: BASE64.encode(signature.to_der().as_bytes()),
        signing_time,
        signer_certificate: signer_certificate.to_string(),
    })
}

/// Check the payload's signature against its embedded certificate.
/// Returns `Ok(false)` for a well-formed but wrong signature; malformed
/// material is an error.
pub fn verify_detached(payload: &SignedPayload) -> Result<bool> {
    let verifying_key = verifying_key_from_cert(&payload.signer_certificate)?;
    let der = BASE64
        .decode(&payload.signature)
        .map_err(|e| DirectError::Crypto(format!("signature encoding: {e}")))?;
    let signature = Signature::from_der(&der)
        .map_err(|e| DirectError::Crypto(format!("signature DER: {e}")))?;

    Ok(verifying_key
        .verify(&signed_bytes(&payload.signing_time, &payload.content), &signature)
        .is_ok())
}

/// Encrypt `content` once and wrap the content key for each
/// `(address, certificate)` pair.
pub fn encrypt_for_recipients(
    content: &str,
    recipients: &[(String, String)],
) -> Result<EncryptedPayload> {
    let content_key = Aes256Gcm::generate_key(&mut OsRng);
    let cipher = Aes256Gcm::new(&content_key);
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, content.as_bytes())
        .map_err(|e| DirectError::Crypto(format!("content encryption: {e}")))?;

    let mut wrapped_keys = Vec::with_capacity(recipients.len());
    for (address, cert_pem) in recipients {
        let recipient_public = public_key_from_cert(cert_pem)?;
        let ephemeral = EphemeralSecret::random(&mut OsRng);
        let ephemeral_public = ephemeral.public_key();
        let shared = ephemeral.diffie_hellman(&recipient_public);
        let kek_bytes = Sha256::digest(shared.raw_secret_bytes());

        let kek = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&kek_bytes));
        let wrap_nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let wrapped = kek
            .encrypt(&wrap_nonce, content_key.as_slice())
            .map_err(|e| DirectError::Crypto(format!("key wrap: {e}")))?;

        wrapped_keys.push(RecipientKey {
            address: address.clone(),
            ephemeral_public: BASE64.encode(ephemeral_public.to_sec1_bytes()),
            wrapped_key: BASE64.encode(wrapped),
            wrap_nonce: BASE64.encode(wrap_nonce),
        });
    }

    Ok(EncryptedPayload {
        nonce: BASE64.encode(nonce),
        ciphertext: BASE64.encode(ciphertext),
        recipients: wrapped_keys,
    })
}

/// Unwrap the content key for `address` and decrypt.
pub fn decrypt(payload: &EncryptedPayload, address: &str, private_key_pem: &str) -> Result<String> {
    let entry = payload
        .recipients
        .iter()
        .find(|r| r.address == address)
        .ok_or_else(|| DirectError::Crypto(format!("no wrapped key for {address}")))?;

    let secret = SecretKey::from_pkcs8_pem(private_key_pem)
        .map_err(|e| DirectError::Crypto(format!("recipient key: {e}")))?;
    let ephemeral_public = PublicKey::from_sec1_bytes(&decode(&entry.ephemeral_public)?)
        .map_err(|e| DirectError::Crypto(format!("ephemeral key: {e}")))?;
    let shared = p256::ecdh::diffie_hellman(secret.to_nonzero_scalar(), ephemeral_public.as_affine());
    let kek_bytes = Sha256::digest(shared.raw_secret_bytes());

    let kek = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&kek_bytes));
    let wrap_nonce = decode(&entry.wrap_nonce)?;
    let content_key = kek
        .decrypt(Nonce::from_slice(&wrap_nonce), decode(&entry.wrapped_key)?.as_slice())
        .map_err(|e| DirectError::Crypto(format!("key unwrap: {e}")))?;

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&content_key));
    let nonce = decode(&payload.nonce)?;
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&nonce), decode(&payload.ciphertext)?.as_slice())
        .map_err(|e| DirectError::Crypto(format!("content decryption: {e}")))?;

    String::from_utf8(plaintext).map_err(|e| DirectError::Crypto(format!("plaintext: {e}")))
}

fn decode(value: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(value)
        .map_err(|e| DirectError::Crypto(format!("base64: {e}")))
}

fn spki_bytes(cert_pem: &str) -> Result<Vec<u8>> {
    let der = pem::parse(cert_pem)
        .map_err(|e| DirectError::Crypto(format!("certificate PEM: {e}")))?;
    let (_, cert) = X509Certificate::from_der(der.contents())
        .map_err(|e| DirectError::Crypto(format!("certificate DER: {e}")))?;
    Ok(cert.public_key().subject_public_key.data.to_vec())
}

fn verifying_key_from_cert(cert_pem: &str) -> Result<VerifyingKey> {
    VerifyingKey::from_sec1_bytes(&spki_bytes(cert_pem)?)
        .map_err(|e| DirectError::Crypto(format!("certificate public key: {e}")))
}

fn public_key_from_cert(cert_pem: &str) -> Result<PublicKey> {
    PublicKey::from_sec1_bytes(&spki_bytes(cert_pem)?)
        .map_err(|e| DirectError::Crypto(format!("certificate public key: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::generate_bootstrap_certificate;

    #[test]
    fn sign_and_verify_round_trip() {
        let (cert, key) = generate_bootstrap_certificate("a@direct.example.org").unwrap();
        let payload = sign_detached("hello", &key, &cert).unwrap();
        assert!(verify_detached(&payload).unwrap());
    }

    #[test]
    fn tampering_breaks_the_signature() {
        let (cert, key) = generate_bootstrap_certificate("a@direct.example.org").unwrap();
        let mut payload = sign_detached("hello", &key, &cert).unwrap();

        payload.content = "hell0".into();
        assert!(!verify_detached(&payload).unwrap());

        // Rewriting the signing time also invalidates the signature.
        let mut payload = sign_detached("hello", &key, &cert).unwrap();
        payload.signing_time = "2020-01-01T00:00:00Z".into();
        assert!(!verify_detached(&payload).unwrap());
    }

    #[test]
    fn each_recipient_can_decrypt_and_nobody_else() {
        let (cert_a, key_a) = generate_bootstrap_certificate("a@direct.example.org").unwrap();
        let (cert_b, key_b) = generate_bootstrap_certificate("b@direct.example.org").unwrap();
        let (_, key_c) = generate_bootstrap_certificate("c@direct.example.org").unwrap();

        let payload = encrypt_for_recipients(
            "confidential",
            &[
                ("a@direct.example.org".to_string(), cert_a),
                ("b@direct.example.org".to_string(), cert_b),
            ],
        )
        .unwrap();
        assert_eq!(payload.recipients.len(), 2);

        assert_eq!(decrypt(&payload, "a@direct.example.org", &key_a).unwrap(), "confidential");
        assert_eq!(decrypt(&payload, "b@direct.example.org", &key_b).unwrap(), "confidential");

        // c has no wrapped key; a's entry cannot be opened with c's key.
        assert!(decrypt(&payload, "c@direct.example.org", &key_c).is_err());
        assert!(decrypt(&payload, "a@direct.example.org", &key_c).is_err());
    }
}
