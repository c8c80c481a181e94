pub mod db;
pub mod orders;
pub mod transactions;

pub use db::{create_db, get_setting, set_setting, DbPool};
pub use orders::{
    count_orders, get_order_balances, get_order_by_nr, get_orders_by_nrs,
    get_unpaid_order_balances, upsert_order, void_order, OrderBalance, UpsertOutcome,
};
pub use transactions::{
    apply_association, count_allocations, count_transactions, get_transaction,
    get_unresolved_transactions, insert_transaction, set_transaction_associate, InsertOutcome,
    StoreError,
};
