//! C-CDA document codec and exchange service.
//!
//! Reads clinical documents with `roxmltree`, writes them with `quick-xml`,
//! validates the US Realm Header requirements, converts to FHIR document
//! Bundles and persists document metadata behind the [`DocumentStore`] port.

pub mod error;
pub mod fhir;
pub mod generate;
pub mod parse;
pub mod service;
pub mod store;
pub mod types;
pub mod validate;

pub use error::CcdaError;
pub use fhir::to_fhir;
pub use generate::{
    generate, AuthorInfo, EntryInput, GenerateRequest, PatientInfo, PostalAddress, SectionInput,
};
pub use parse::parse;
pub use service::CcdaService;
pub use store::{
    DocumentQuery, DocumentStore, ExchangeStatus, MemoryDocumentStore, StoredDocument, QUERY_LIMIT,
};
pub use types::{
    format_hl7_datetime, parse_hl7_datetime, CcdaDocument, DocumentAuthor, DocumentSection,
    DocumentType,
};
pub use validate::{validate, ValidationReport};

pub type Result<T> = std::result::Result<T, CcdaError>;
