use remit_core::{
    associate, Mode, Money, Notice, Order, Transaction, TransactionId, WriteOffPolicy,
};
use remit_import::extract_order_ids;
use remit_storage::{
    apply_association, get_order_by_nr, get_orders_by_nrs, get_transaction,
    get_unresolved_transactions, DbPool, StoreError,
};
use tracing::{error, info, warn};

use crate::error::ReconcileError;

/// Transactions left with more than this unallocated after the automatic
/// pass are handed to the operator.
pub const PROBLEMATIC_REMAINDER: Money = Money::from_cents(100);

/// Result of one automatic pass.
#[derive(Debug, Default)]
pub struct AutoPass {
    /// Transactions that need an operator: no order number in the reference,
    /// an unknown order number, or a remainder above [`PROBLEMATIC_REMAINDER`].
    pub problematic: Vec<Transaction>,
    /// Notices of stored associations, such as orders left owing, with the
    /// transaction they came from.
    pub notices: Vec<(TransactionId, Notice)>,
}

/// Matches every open transaction to the orders named in its reference.
///
/// Each transaction is committed on its own.
pub async fn auto_reconcile(
    pool: &DbPool,
    policy: &WriteOffPolicy,
) -> Result<AutoPass, ReconcileError> {
    let transactions = get_unresolved_transactions(pool).await?;
    let mut pass = AutoPass::default();

    for mut transaction in transactions {
        let nrs = extract_order_ids(&transaction.reference);
        if nrs.is_empty() {
            info!(%transaction, "no order number found in reference");
            pass.problematic.push(transaction);
            continue;
        }

        let mut orders = get_orders_by_nrs(pool, &nrs).await?;
        if orders.len() != nrs.len() {
            info!(%transaction, referenced = ?nrs, "referenced order not found");
            pass.problematic.push(transaction);
            continue;
        }

        let outcome = associate(&mut transaction, &mut orders, policy, Mode::Automatic)?;
        match apply_association(pool, &outcome).await {
            Ok(()) => {}
            Err(StoreError::Database(e)) => {
                error!(%transaction, "association rolled back: {e}");
                if let Some(stored) = get_transaction(pool, transaction.id).await? {
                    pass.problematic.push(stored);
                }
                continue;
            }
            Err(e) => return Err(e.into()),
        }

        for notice in outcome.operator_notices() {
            warn!(%transaction, "{notice}");
            pass.notices.push((transaction.id, notice.clone()));
        }

        let remaining = transaction.unallocated_amount()?;
        if remaining.is_positive() {
            warn!(%transaction, %remaining, "could not allocate the whole transaction");
            if remaining > PROBLEMATIC_REMAINDER {
                pass.problematic.push(transaction);
            }
        }
    }

    Ok(pass)
}

/// Loads orders by number in the given order, failing on the first unknown
/// number.
pub async fn lookup_orders(pool: &DbPool, nrs: &[String]) -> Result<Vec<Order>, ReconcileError> {
    let mut orders = Vec::with_capacity(nrs.len());
    for nr in nrs {
        match get_order_by_nr(pool, nr).await? {
            Some(order) => orders.push(order),
            None => return Err(ReconcileError::OrderNotFound(nr.clone())),
        }
    }
    Ok(orders)
}
