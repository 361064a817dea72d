//! Direct messaging service: address lifecycle, certificate discovery,
//! and the send/receive pipelines.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use hie_ledger::{Direction, Ledger, ProtocolKind, TransactionOutcome};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::address::{AddressStatus, AddressStore, DirectAddress, OwnerType};
use crate::cert::{certificate_info, generate_bootstrap_certificate, validate_trust_chain};
use crate::crypto::{decrypt, encrypt_for_recipients, sign_detached, verify_detached};
use crate::error::DirectError;
use crate::mime::{build_mdn, build_mime_message, parse_mime_message, Attachment, MimeMessage,
    ParsedMessage};
use crate::smime::{unwrap_enveloped, unwrap_signed, wrap_enveloped, wrap_signed};
use crate::transport::MessageTransport;
use crate::Result;

/// Certificate discovery beyond the local registry. Production backends
/// query DNS CERT records and HISP directories.
#[async_trait]
pub trait CertificateResolver: Send + Sync {
    async fn resolve_dns(&self, address: &str) -> Result<Option<String>>;
    async fn resolve_hisp(&self, address: &str) -> Result<Option<String>>;
}

/// Resolver for deployments without external discovery configured.
pub struct NullResolver;

#[async_trait]
impl CertificateResolver for NullResolver {
    async fn resolve_dns(&self, _address: &str) -> Result<Option<String>> {
        Ok(None)
    }

    async fn resolve_hisp(&self, _address: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterAddressRequest {
    pub address: String,
    pub owner_id: String,
    pub owner_type: OwnerType,
    pub owner_name: Option<String>,
    /// Ask the gateway to mint a self-signed certificate. Honored only
    /// when the service runs with `insecure_bootstrap`.
    #[serde(default)]
    pub generate_certificate: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivateAddressRequest {
    pub certificate: Option<String>,
    pub trust_anchor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub attachments: Vec<AttachmentRequest>,
    #[serde(default)]
    pub request_mdn: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentRequest {
    pub filename: String,
    pub content_type: String,
    /// Base64 attachment bytes.
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResult {
    pub success: bool,
    pub message_id: String,
    pub ledger_id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mdn_status: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiveResult {
    pub message: ParsedMessage,
    pub signature_valid: bool,
    pub mdn_sent: bool,
    pub ledger_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CertificateSource {
    Local,
    Dns,
    Hisp,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateLookup {
    pub address: String,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trust_anchor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<CertificateSource>,
}

impl CertificateLookup {
    fn invalid(address: &str) -> Self {
        Self {
            address: address.to_string(),
            valid: false,
            certificate: None,
            trust_anchor: None,
            source: None,
        }
    }
}

pub struct DirectService {
    addresses: Arc<dyn AddressStore>,
    transport: Arc<dyn MessageTransport>,
    resolver: Arc<dyn CertificateResolver>,
    ledger: Ledger,
    trust_anchors: Vec<String>,
    insecure_bootstrap: bool,
}

impl DirectService {
    pub fn new(
        addresses: Arc<dyn AddressStore>,
        transport: Arc<dyn MessageTransport>,
        ledger: Ledger,
    ) -> Self {
        Self {
            addresses,
            transport,
            resolver: Arc::new(NullResolver),
            ledger,
            trust_anchors: Vec::new(),
            insecure_bootstrap: false,
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn CertificateResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_trust_anchors(mut self, anchors: Vec<String>) -> Self {
        self.trust_anchors = anchors;
        self
    }

    /// Allow self-signed bootstrap certificates at registration time.
    /// Intended for development and test environments only.
    pub fn with_insecure_bootstrap(mut self, enabled: bool) -> Self {
        self.insecure_bootstrap = enabled;
        self
    }

    /// Register a new address in `pending` state. The address becomes
    /// usable only after activation with a certificate.
    pub async fn register_address(
        &self,
        request: &RegisterAddressRequest,
    ) -> Result<DirectAddress> {
        let (local, domain) = request
            .address
            .split_once('@')
            .ok_or_else(|| DirectError::InvalidAddress(request.address.clone()))?;
        if local.is_empty() || domain.is_empty() {
            return Err(DirectError::InvalidAddress(request.address.clone()));
        }
        if self.addresses.get(&request.address).await.is_some() {
            return Err(DirectError::InvalidAddress(format!(
                "{} is already registered",
                request.address
            )));
        }

        let mut certificate = None;
        let mut private_key = None;
        if request.generate_certificate {
            if self.insecure_bootstrap {
                let (cert_pem, key_pem) = generate_bootstrap_certificate(&request.address)?;
                certificate = Some(cert_pem);
                private_key = Some(key_pem);
            } else {
                tracing::warn!(
                    address = %request.address,
                    "certificate generation requested but insecure_bootstrap is disabled"
                );
            }
        }

        let entry = DirectAddress {
            address: request.address.clone(),
            domain: domain.to_string(),
            owner_id: request.owner_id.clone(),
            owner_type: request.owner_type,
            owner_name: request.owner_name.clone(),
            certificate,
            private_key,
            trust_anchor: None,
            status: AddressStatus::Pending,
            certificate_expiry: None,
            issuer_dn: None,
            subject_dn: None,
            messages_sent: 0,
            messages_received: 0,
            last_activity: None,
            created_at: Utc::now(),
        };
        self.addresses.insert(entry.clone()).await;

        tracing::info!(address = %entry.address, owner = %entry.owner_id, "Direct address registered");
        Ok(entry)
    }

    /// Activate an address, optionally installing a certificate. Installed
    /// certificates have their validity window and DNs recorded.
    pub async fn activate_address(
        &self,
        address: &str,
        request: &ActivateAddressRequest,
    ) -> Result<DirectAddress> {
        let mut entry = self
            .addresses
            .get(address)
            .await
            .ok_or_else(|| DirectError::AddressNotFound(address.to_string()))?;

        if let Some(cert_pem) = &request.certificate {
            let info = certificate_info(cert_pem)?;
            entry.certificate = Some(cert_pem.clone());
            entry.certificate_expiry = Some(info.not_after);
            entry.issuer_dn = info.issuer_cn;
            entry.subject_dn = info.subject_cn;
        } else if let Some(cert_pem) = &entry.certificate {
            let info = certificate_info(cert_pem)?;
            entry.certificate_expiry = Some(info.not_after);
            entry.issuer_dn = info.issuer_cn;
            entry.subject_dn = info.subject_cn;
        }
        if request.trust_anchor.is_some() {
            entry.trust_anchor = request.trust_anchor.clone();
        }
        entry.status = AddressStatus::Active;
        self.addresses.update(entry.clone()).await;

        tracing::info!(address = %entry.address, "Direct address activated");
        Ok(entry)
    }

    pub async fn get_address(&self, address: &str) -> Result<DirectAddress> {
        self.addresses
            .get(address)
            .await
            .ok_or_else(|| DirectError::AddressNotFound(address.to_string()))
    }

    pub async fn list_addresses(&self, owner_id: &str) -> Vec<DirectAddress> {
        self.addresses.list_by_owner(owner_id).await
    }

    /// Find a certificate for an address: local registry first, then DNS,
    /// then HISP directory. Discovery failures degrade to an invalid
    /// lookup instead of erroring.
    pub async fn lookup_certificate(&self, address: &str) -> CertificateLookup {
        if let Some(entry) = self.addresses.get(address).await {
            if entry.is_usable() {
                return CertificateLookup {
                    address: address.to_string(),
                    valid: true,
                    certificate: entry.certificate,
                    trust_anchor: entry.trust_anchor,
                    source: Some(CertificateSource::Local),
                };
            }
        }

        match self.resolver.resolve_dns(address).await {
            Ok(Some(certificate)) => {
                return CertificateLookup {
                    address: address.to_string(),
                    valid: true,
                    certificate: Some(certificate),
                    trust_anchor: None,
                    source: Some(CertificateSource::Dns),
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(address, error = %e, "DNS certificate discovery failed");
                return CertificateLookup::invalid(address);
            }
        }

        match self.resolver.resolve_hisp(address).await {
            Ok(Some(certificate)) => CertificateLookup {
                address: address.to_string(),
                valid: true,
                certificate: Some(certificate),
                trust_anchor: None,
                source: Some(CertificateSource::Hisp),
            },
            Ok(None) => CertificateLookup::invalid(address),
            Err(e) => {
                tracing::warn!(address, error = %e, "HISP certificate discovery failed");
                CertificateLookup::invalid(address)
            }
        }
    }

    /// Validate a certificate against the configured trust bundle.
    pub fn validate_trust_chain(&self, cert_pem: &str) -> bool {
        validate_trust_chain(cert_pem, &self.trust_anchors)
    }

    /// Sign, encrypt and deliver a message. Every recipient certificate is
    /// resolved before anything is sent, so a missing certificate fails
    /// the whole message rather than delivering to a subset.
    pub async fn send_message(&self, request: &SendMessageRequest) -> Result<SendResult> {
        let sender = self.get_address(&request.from).await?;
        if !sender.is_usable() || sender.private_key.is_none() {
            return Err(DirectError::CertificateUnavailable(request.from.clone()));
        }

        let mut attachments = Vec::with_capacity(request.attachments.len());
        for attachment in &request.attachments {
            attachments.push(Attachment {
                filename: attachment.filename.clone(),
                content_type: attachment.content_type.clone(),
                content: BASE64.decode(&attachment.content).map_err(|e| {
                    DirectError::Mime(format!(
                        "attachment {} is not base64: {e}",
                        attachment.filename
                    ))
                })?,
            });
        }

        let record = self
            .ledger
            .begin(
                ProtocolKind::Direct,
                "message-send",
                Direction::Outbound,
                Some(request.to.join(",")),
                json!({
                    "from": request.from,
                    "to": request.to,
                    "subject": request.subject,
                    "attachments": request.attachments.len(),
                    "mdnRequested": request.request_mdn,
                }),
            )
            .await?;

        let mut errors = Vec::new();
        let mut recipient_certs = Vec::with_capacity(request.to.len());
        for recipient in &request.to {
            let lookup = self.lookup_certificate(recipient).await;
            match lookup.certificate.filter(|_| lookup.valid) {
                Some(cert) => recipient_certs.push((recipient.clone(), cert)),
                None => errors.push(format!("Recipient certificate not found: {recipient}")),
            }
        }

        let message_id = Uuid::new_v4().to_string();
        if !errors.is_empty() {
            let joined = errors.join("; ");
            tracing::warn!(message_id = %message_id, error = %joined, "Direct send aborted");
            self.ledger
                .complete(
                    &record.id,
                    TransactionOutcome::failed_with(joined, json!({ "errors": errors })),
                )
                .await?;
            return Ok(SendResult {
                success: false,
                message_id,
                ledger_id: record.id,
                errors,
                mdn_status: None,
            });
        }

        let mime = build_mime_message(&MimeMessage {
            message_id: message_id.clone(),
            from: request.from.clone(),
            to: request.to.clone(),
            subject: request.subject.clone(),
            body: request.body.clone(),
            attachments,
            request_mdn: request.request_mdn,
        });

        // These were checked above.
        let sender_key = sender.private_key.as_deref().unwrap_or_default();
        let sender_cert = sender.certificate.as_deref().unwrap_or_default();
        let signed = sign_detached(&mime, sender_key, sender_cert)?;
        let encrypted = encrypt_for_recipients(&wrap_signed(&signed)?, &recipient_certs)?;
        let wrapped = wrap_enveloped(&encrypted)?;

        for recipient in &request.to {
            if let Err(e) = self
                .transport
                .deliver(&request.from, recipient, &wrapped, &message_id)
                .await
            {
                errors.push(format!("Delivery to {recipient} failed: {e}"));
            }
        }

        let mut sender = sender;
        sender.messages_sent += 1;
        sender.last_activity = Some(Utc::now());
        self.addresses.update(sender).await;

        let success = errors.is_empty();
        if success {
            self.ledger
                .complete(
                    &record.id,
                    TransactionOutcome::completed_with(json!({
                        "messageId": message_id,
                        "recipients": request.to.len(),
                    })),
                )
                .await?;
        } else {
            self.ledger
                .complete(
                    &record.id,
                    TransactionOutcome::failed_with(
                        errors.join("; "),
                        json!({ "messageId": message_id, "errors": errors }),
                    ),
                )
                .await?;
        }

        tracing::info!(
            message_id = %message_id,
            recipients = request.to.len(),
            success,
            "Direct message sent"
        );
        Ok(SendResult {
            success,
            message_id,
            ledger_id: record.id,
            errors,
            mdn_status: if success && request.request_mdn {
                Some("pending".to_string())
            } else {
                None
            },
        })
    }

    /// Decrypt and verify an inbound wrapped message. A failed signature
    /// check is recorded but does not reject the message; a missing
    /// decryption key does.
    pub async fn receive_message(&self, wrapped: &str) -> Result<ReceiveResult> {
        let envelope = unwrap_enveloped(wrapped)?;

        let mut local_recipient = None;
        for key in &envelope.recipients {
            if let Some(entry) = self.addresses.get(&key.address).await {
                if entry.private_key.is_some() {
                    local_recipient = Some(entry);
                    break;
                }
            }
        }
        let recipient = local_recipient.ok_or_else(|| {
            DirectError::CertificateUnavailable("no local recipient can decrypt".to_string())
        })?;
        let recipient_key = recipient.private_key.as_deref().unwrap_or_default();

        let signed_entity = decrypt(&envelope, &recipient.address, recipient_key)?;
        let signed = unwrap_signed(&signed_entity)?;

        let signature_valid = match verify_detached(&signed) {
            Ok(valid) => valid,
            Err(e) => {
                tracing::warn!(error = %e, "signature verification failed");
                false
            }
        };
        if !signature_valid {
            tracing::warn!(recipient = %recipient.address, "accepting message with invalid signature");
        }

        let message = parse_mime_message(&signed.content)?;

        let record = self
            .ledger
            .begin(
                ProtocolKind::Direct,
                "message-receive",
                Direction::Inbound,
                Some(message.from.clone()),
                json!({
                    "from": message.from,
                    "to": message.to,
                    "subject": message.subject,
                    "signatureValid": signature_valid,
                }),
            )
            .await?;

        for to in &message.to {
            if let Some(mut entry) = self.addresses.get(to).await {
                entry.messages_received += 1;
                entry.last_activity = Some(Utc::now());
                self.addresses.update(entry).await;
            }
        }

        let mut mdn_sent = false;
        if message.mdn_requested {
            let mdn = build_mdn(&message, &recipient.address, "displayed");
            let mdn_id = Uuid::new_v4().to_string();
            match self
                .transport
                .deliver(&recipient.address, &message.from, &mdn, &mdn_id)
                .await
            {
                Ok(()) => mdn_sent = true,
                Err(e) => tracing::warn!(error = %e, "MDN delivery failed"),
            }
        }

        self.ledger
            .complete(
                &record.id,
                TransactionOutcome::completed_with(json!({
                    "messageId": message.message_id,
                    "signatureValid": signature_valid,
                    "mdnSent": mdn_sent,
                })),
            )
            .await?;

        tracing::info!(
            from = %message.from,
            recipient = %recipient.address,
            signature_valid,
            "Direct message received"
        );
        Ok(ReceiveResult {
            message,
            signature_valid,
            mdn_sent,
            ledger_id: record.id,
        })
    }
}
