pub mod association;
pub mod error;
pub mod money;
pub mod order;
pub mod transaction;

pub use association::{associate, AssociationOutcome, Decree, Mode, Notice, WriteOffPolicy};
pub use error::LedgerError;
pub use money::{parse_amount_to_cents, Money};
pub use order::{LineItem, NewOrder, Order, OrderId};
pub use transaction::{Allocation, NewTransaction, Transaction, TransactionId};
