use thiserror::Error;

#[derive(Debug, Error)]
pub enum CcdaError {
    /// Structurally unusable content, e.g. a missing ClinicalDocument root.
    #[error("invalid C-CDA document: {0}")]
    InvalidDocument(String),

    #[error("document not found: {0}")]
    NotFound(String),

    #[error("XML parse error: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("XML write error: {0}")]
    XmlWrite(#[from] quick_xml::Error),

    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("ledger error: {0}")]
    Ledger(#[from] hie_ledger::LedgerError),
}
