//! X12 EDI codec.
//!
//! Covers the HIPAA transaction families the gateway exchanges with trading
//! partners: 270/271 eligibility, 276/277 claim status, 278 prior
//! authorization, 835 remittance, 837 claims and 997/999 acknowledgments.
//!
//! The split between fatal and recoverable problems matters here: content
//! whose delimiter structure cannot be read at all is a hard
//! [`X12Error::Malformed`] (nothing is persisted), while a parseable
//! interchange that violates envelope rules is stored as rejected together
//! with a negative 999; that path is a successful gateway operation.

pub mod envelope;
pub mod error;
pub mod generate;
pub mod interpret;
pub mod parse;
pub mod partner;
pub mod segment;
pub mod service;
pub mod types;
pub mod validate;

pub use envelope::InterchangeEnvelope;
pub use error::X12Error;
pub use generate::{generate, generate_999, OutboundData, OutboundKind};
pub use interpret::{interpret, InterpretedTransaction};
pub use parse::{parse, ParsedInterchange};
pub use partner::{MemoryPartnerDirectory, PartnerDirectory, TradingPartner};
pub use segment::{Delimiters, Segment};
pub use service::{MemoryX12Store, X12ProcessingResult, X12Service, X12Store, X12Transaction};
pub use types::{TransactionSetKind, X12TransactionStatus};

pub type Result<T> = std::result::Result<T, X12Error>;
