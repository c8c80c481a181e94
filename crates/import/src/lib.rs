pub mod csv;
pub mod error;
pub mod orders;
pub mod reference;

pub use crate::csv::{find_transaction_file, read_bank_csv, BankRow, TRANSACTION_FILE_KEYWORD};
pub use error::ImportError;
pub use orders::{fetch_all, JsonOrderSource, LineItemRecord, OrderPage, OrderRecord, OrderSource};
pub use reference::{canonical_order_nr, extract_order_ids, parse_order_nrs, ORDER_PREFIX};
