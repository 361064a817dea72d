use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetqueryError {
    #[error("missing query parameters: {0}")]
    MissingParameters(String),

    #[error("participant not found: {0}")]
    ParticipantNotFound(String),

    #[error("participant already registered: {0}")]
    AlreadyRegistered(String),

    #[error("no participant hosts repository {0}")]
    RepositoryNotFound(String),

    #[error("XML error: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("XML write error: {0}")]
    XmlWrite(#[from] quick_xml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("ledger error: {0}")]
    Ledger(#[from] hie_ledger::LedgerError),
}
