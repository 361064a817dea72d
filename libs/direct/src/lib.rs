//! Direct secure messaging.
//!
//! Provisions Direct addresses with their certificate material, wraps
//! clinical messages in signed and encrypted S/MIME entities, delivers
//! them through the [`MessageTransport`] seam and returns message
//! disposition notifications for inbound mail that asks for them.

pub mod address;
pub mod cert;
pub mod crypto;
pub mod error;
pub mod mime;
pub mod service;
pub mod smime;
pub mod transport;

pub use address::{AddressStatus, AddressStore, DirectAddress, MemoryAddressStore, OwnerType};
pub use cert::{certificate_info, generate_bootstrap_certificate, validate_trust_chain,
    CertificateInfo};
pub use crypto::{EncryptedPayload, SignedPayload};
pub use error::DirectError;
pub use mime::{Attachment, MimeMessage, ParsedMessage};
pub use service::{
    ActivateAddressRequest, AttachmentRequest, CertificateLookup, CertificateResolver,
    CertificateSource, DirectService, NullResolver, ReceiveResult, RegisterAddressRequest,
    SendMessageRequest, SendResult,
};
pub use smime::{parse_smime, wrap_smime, SmimeEntity, SmimeType};
pub use transport::{Delivery, MemoryTransport, MessageTransport};

pub type Result<T> = std::result::Result<T, DirectError>;
