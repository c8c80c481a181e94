//! Allocation of a bank transaction across the orders it pays for.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::LedgerError;
use crate::money::Money;
use crate::order::{Order, OrderId};
use crate::transaction::{Allocation, Transaction};

/// Shortfalls up to `ignore_missing_payment_max` are written off instead of
/// leaving the order open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOffPolicy {
    pub ignore_missing_payment_max: Money,
}

impl Default for WriteOffPolicy {
    fn default() -> Self {
        Self {
            ignore_missing_payment_max: Money::from_cents(100),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Auto-reconciliation: allocation details go to the log only.
    Automatic,
    /// Operator-driven: every notice is shown.
    Interactive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Allocated { order: String, amount: Money },
    WrittenOff { order: String, amount: Money },
    StillOwing { order: String, missing: Money },
    AlreadyPaid { order: String },
    Overpaid { order: String, surplus: Money },
    Exhausted { order: String, allocated_orders: Vec<String> },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Allocated { order, amount } => {
                write!(f, "INFO: {amount} allocated to order {order}.")
            }
            Notice::WrittenOff { order, amount } => {
                write!(f, "WARNING: {amount} of order {order} written off.")
            }
            Notice::StillOwing { order, missing } => write!(
                f,
                "WARNING: transaction cannot pay order {order} completely. {missing} still missing."
            ),
            Notice::AlreadyPaid { order } => {
                write!(f, "WARNING: order {order} is already paid.")
            }
            Notice::Overpaid { order, surplus } => {
                write!(f, "WARNING: order {order} is overpaid by {surplus}.")
            }
            Notice::Exhausted { order, allocated_orders } => {
                let allocated = if allocated_orders.is_empty() {
                    "<none>".to_string()
                } else {
                    allocated_orders.join(",")
                };
                write!(
                    f,
                    "WARNING: order {order} cannot be paid. The transaction is already used up by: {allocated}."
                )
            }
        }
    }
}

/// New decree value of an order after a write-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decree {
    pub order_id: OrderId,
    pub decree: Money,
}

/// Everything one `associate` call changed, ready to be persisted as a unit.
#[derive(Debug, Clone)]
pub struct AssociationOutcome {
    pub mode: Mode,
    /// Amounts to add per (order, transaction) pair.
    pub allocations: Vec<Allocation>,
    pub decrees: Vec<Decree>,
    pub notices: Vec<Notice>,
}

impl AssociationOutcome {
    fn new(mode: Mode) -> Self {
        Self {
            mode,
            allocations: Vec::new(),
            decrees: Vec::new(),
            notices: Vec::new(),
        }
    }

    pub fn allocated_total(&self) -> Money {
        self.allocations.iter().map(|a| a.amount).sum()
    }

    /// Notices meant for the operator in this outcome's mode.
    pub fn operator_notices(&self) -> impl Iterator<Item = &Notice> {
        let mode = self.mode;
        self.notices
            .iter()
            .filter(move |n| mode == Mode::Interactive || !matches!(n, Notice::Allocated { .. }))
    }
}

/// Allocates the unallocated part of `transaction` to `orders`, in list order.
///
/// Each order receives at most its outstanding amount. A shortfall within
/// the policy's threshold is written off by decree. `transaction` and
/// `orders` are updated in place. An order listed more than once is handled
/// through its first occurrence.
///
/// Fails only when the transaction is already over-allocated.
pub fn associate(
    transaction: &mut Transaction,
    orders: &mut [Order],
    policy: &WriteOffPolicy,
    mode: Mode,
) -> Result<AssociationOutcome, LedgerError> {
    let mut remaining = transaction.unallocated_amount()?;
    let mut outcome = AssociationOutcome::new(mode);

    for i in 0..orders.len() {
        let id = orders[i].id;
        let idx = orders.iter().position(|o| o.id == id).unwrap_or(i);
        let order = &mut orders[idx];
        let outstanding = order.outstanding_amount();

        if remaining.is_positive() && outstanding.is_positive() {
            let paying = outstanding.min(remaining);
            remaining -= paying;

            let allocation = Allocation {
                order_id: order.id,
                order_nr: order.nr.clone(),
                transaction_id: transaction.id,
                amount: paying,
            };
            order.add_allocation(allocation.clone());
            transaction.add_allocation(allocation.clone());
            outcome.allocations.push(allocation);
            tracing::info!(transaction = %transaction, order = %order, %paying, "allocated");
            outcome.notices.push(Notice::Allocated {
                order: order.nr.clone(),
                amount: paying,
            });

            if paying != outstanding {
                let missing = order.outstanding_amount();
                if missing <= policy.ignore_missing_payment_max {
                    order.decree += missing;
                    tracing::warn!(order = %order, %missing, "shortfall written off");
                    outcome.decrees.push(Decree {
                        order_id: order.id,
                        decree: order.decree,
                    });
                    outcome.notices.push(Notice::WrittenOff {
                        order: order.nr.clone(),
                        amount: missing,
                    });
                } else {
                    outcome.notices.push(Notice::StillOwing {
                        order: order.nr.clone(),
                        missing,
                    });
                }
            }
        } else if outstanding.is_zero() {
            outcome.notices.push(Notice::AlreadyPaid {
                order: order.nr.clone(),
            });
        } else if outstanding.is_negative() {
            tracing::warn!(order = %order, surplus = %(-outstanding), "order is overpaid");
            outcome.notices.push(Notice::Overpaid {
                order: order.nr.clone(),
                surplus: -outstanding,
            });
        } else {
            // outstanding > 0 and remaining == 0; remaining never goes negative.
            outcome.notices.push(Notice::Exhausted {
                order: order.nr.clone(),
                allocated_orders: transaction.allocated_order_nrs(),
            });
        }
    }

    transaction.unallocated_amount()?;
    Ok(outcome)
}
