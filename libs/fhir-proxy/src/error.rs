use thiserror::Error;

#[derive(Debug, Error)]
pub enum FhirProxyError {
    #[error("FHIR endpoint not found: {0}")]
    EndpointNotFound(String),

    #[error("no active FHIR endpoint configured")]
    NoDefaultEndpoint,

    #[error("token request failed: {0}")]
    Token(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("ledger error: {0}")]
    Ledger(#[from] hie_ledger::LedgerError),
}
