use thiserror::Error;

use crate::money::Money;
use crate::transaction::TransactionId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("Invalid amount: {0:?}")]
    InvalidAmount(String),
    #[error("Transaction {transaction} is over-allocated: {allocated} allocated of {amount}")]
    OverAllocated {
        transaction: TransactionId,
        amount: Money,
        allocated: Money,
    },
}
