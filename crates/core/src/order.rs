use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::money::Money;
use super::transaction::Allocation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub i64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    /// Unit price.
    pub price: Money,
    pub quantity: i64,
}

impl LineItem {
    pub fn new(price: Money, quantity: i64) -> Self {
        LineItem { price, quantity }
    }

    pub fn total(&self) -> Money {
        self.price * self.quantity
    }

    /// `None` when the total does not fit into an amount.
    pub fn checked_total(&self) -> Option<Money> {
        self.price.checked_mul(self.quantity)
    }
}

/// An order as delivered by the storefront, before it has a database id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub nr: String,
    pub created_at: NaiveDate,
    pub discount: Money,
    pub shipping: Money,
    pub note: Option<String>,
    pub line_items: Vec<LineItem>,
}

/// A stored order with the allocations that pay for it.
///
/// The financial aggregates are plain functions of the loaded fields. The
/// storage crate computes the same figures in SQL for set-level filtering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub nr: String,
    pub created_at: NaiveDate,
    pub discount: Money,
    pub shipping: Money,
    /// Amount written off by decree.
    pub decree: Money,
    pub note: Option<String>,
    pub line_items: Vec<LineItem>,
    pub allocations: Vec<Allocation>,
}

impl Order {
    /// `sum(price * quantity) - discount + shipping`
    pub fn owed_amount(&self) -> Money {
        self.line_items.iter().map(LineItem::total).sum::<Money>() - self.discount + self.shipping
    }

    pub fn allocated_amount(&self) -> Money {
        self.allocations.iter().map(|a| a.amount).sum()
    }

    pub fn paid_amount(&self) -> Money {
        self.allocated_amount() + self.decree
    }

    pub fn is_paid(&self) -> bool {
        self.paid_amount() >= self.owed_amount()
    }

    /// Negative when the order was overpaid.
    pub fn outstanding_amount(&self) -> Money {
        self.owed_amount() - self.paid_amount()
    }

    /// Adds `allocation` to this order, merging with an existing allocation
    /// from the same transaction.
    pub fn add_allocation(&mut self, allocation: Allocation) {
        merge_allocation(&mut self.allocations, allocation);
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.nr)
    }
}

pub(crate) fn merge_allocation(allocations: &mut Vec<Allocation>, allocation: Allocation) {
    match allocations.iter_mut().find(|a| {
        a.order_id == allocation.order_id && a.transaction_id == allocation.transaction_id
    }) {
        Some(existing) => existing.amount += allocation.amount,
        None => allocations.push(allocation),
    }
}
