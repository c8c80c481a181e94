use remit_core::LedgerError;
use remit_import::ImportError;
use remit_storage::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Import(#[from] ImportError),
    #[error("Order {0} does not exist")]
    OrderNotFound(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ReconcileError {
    /// Broken ledger invariants end the run instead of being reported and
    /// skipped.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ReconcileError::Ledger(LedgerError::OverAllocated { .. })
                | ReconcileError::Store(StoreError::Ledger(LedgerError::OverAllocated { .. }))
        )
    }
}
