use thiserror::Error;

#[derive(Debug, Error)]
pub enum X12Error {
    /// Delimiter structure cannot be read. The only fatal parse outcome:
    /// nothing is persisted for these.
    #[error("malformed X12 content: {0}")]
    Malformed(String),

    #[error("unknown transaction type: {0}")]
    UnknownTransactionType(String),

    #[error("trading partner not found: {0}")]
    PartnerNotFound(String),

    #[error("ledger error: {0}")]
    Ledger(#[from] hie_ledger::LedgerError),
}
