use thiserror::Error;

#[derive(Debug, Error)]
pub enum DirectError {
    #[error("Direct address not found: {0}")]
    AddressNotFound(String),

    #[error("invalid Direct address: {0}")]
    InvalidAddress(String),

    #[error("certificate unavailable for {0}")]
    CertificateUnavailable(String),

    #[error("cryptographic failure: {0}")]
    Crypto(String),

    #[error("malformed message: {0}")]
    Mime(String),

    #[error("ledger error: {0}")]
    Ledger(#[from] hie_ledger::LedgerError),
}
