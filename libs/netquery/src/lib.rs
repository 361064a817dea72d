//! Cross-network query federation.
//!
//! Speaks three dialects behind one query surface: TEFCA JSON over REST,
//! Carequality XCPD/XCA SOAP, and the CommonWell alliance REST API. Fans
//! queries out over the participant directory, merges and deduplicates
//! the tagged results, and records one ledger row per federated call.

pub mod commonwell;
pub mod dedup;
pub mod error;
pub mod participant;
pub mod service;
pub mod types;
pub mod xca;
pub mod xcpd;

pub use commonwell::{CommonWellAuth, CommonWellClient};
pub use dedup::dedupe_patients;
pub use error::NetqueryError;
pub use participant::{
    DirectoryFilters, MemoryParticipantDirectory, NetworkParticipant, ParticipantDirectory,
    ParticipantStatus, RegisterParticipant, TefcaRole,
};
pub use service::{NetworkQueryService, DEFAULT_FANOUT_TIMEOUT};
pub use types::{
    DocumentEntry, DocumentQueryParams, DocumentRetrieveParams, Network, NetworkQuery,
    NetworkResponse, PatientDemographics, PatientMatch, PurposeOfUse, QueryResult, QueryType,
    RequestingOrganization, RetrievedDocument,
};

pub type Result<T> = std::result::Result<T, NetqueryError>;
