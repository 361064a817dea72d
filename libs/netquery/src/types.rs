//! Query and result types shared by the three network adapters.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Tefca,
    Carequality,
    Commonwell,
}

impl Network {
    pub fn as_str(self) -> &'static str {
        match self {
            Network::Tefca => "tefca",
            Network::Carequality => "carequality",
            Network::Commonwell => "commonwell",
        }
    }
}

/// Permitted purposes of use. Anything outside this list is rejected at
/// the deserialization boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PurposeOfUse {
    Treatment,
    Payment,
    Operations,
    PublicHealth,
    IndividualAccess,
}

impl PurposeOfUse {
    pub fn as_str(self) -> &'static str {
        match self {
            PurposeOfUse::Treatment => "TREATMENT",
            PurposeOfUse::Payment => "PAYMENT",
            PurposeOfUse::Operations => "OPERATIONS",
            PurposeOfUse::PublicHealth => "PUBLIC_HEALTH",
            PurposeOfUse::IndividualAccess => "INDIVIDUAL_ACCESS",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueryType {
    PatientDiscovery,
    DocumentQuery,
    DocumentRetrieve,
}

impl QueryType {
    pub fn as_str(self) -> &'static str {
        match self {
            QueryType::PatientDiscovery => "patient-discovery",
            QueryType::DocumentQuery => "document-query",
            QueryType::DocumentRetrieve => "document-retrieve",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PatientDemographics {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// ISO date, e.g. `1980-01-01`.
    pub date_of_birth: Option<String>,
    pub gender: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub mrn: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentQueryParams {
    pub patient_id: String,
    /// Carequality routes document queries by home community.
    pub home_community_id: Option<String>,
    #[serde(default)]
    pub document_type: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRetrieveParams {
    pub document_unique_id: String,
    pub repository_unique_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestingOrganization {
    pub name: String,
    pub oid: String,
    pub npi: Option<String>,
    pub home_community_id: Option<String>,
}

/// One federated query against a network.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkQuery {
    pub query_type: QueryType,
    pub patient: Option<PatientDemographics>,
    pub document_query: Option<DocumentQueryParams>,
    pub document_retrieve: Option<DocumentRetrieveParams>,
    pub purpose_of_use: PurposeOfUse,
    pub requesting_organization: RequestingOrganization,
    /// Restrict the fan-out to these participant ids. Empty means all
    /// active participants with the capability.
    #[serde(default)]
    pub target_participants: Vec<String>,
}

/// One candidate patient from discovery. `sources` accumulates during
/// deduplication.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientMatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    pub match_score: f64,
    pub source: String,
    pub source_participant: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_unique_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository_unique_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    pub source: String,
    pub source_participant: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedDocument {
    pub document_unique_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository_unique_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home_community_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Base64 document bytes.
    pub content: String,
    pub source: String,
    pub source_participant: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum QueryResult {
    Patient(PatientMatch),
    Document(DocumentEntry),
    Retrieved(RetrievedDocument),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkResponse {
    pub success: bool,
    pub query_id: String,
    pub results: Vec<QueryResult>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    pub response_time_ms: u64,
}
