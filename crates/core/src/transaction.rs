use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::LedgerError;
use super::money::Money;
use super::order::{merge_allocation, OrderId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub i64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The part of a transaction applied to one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub order_id: OrderId,
    pub order_nr: String,
    pub transaction_id: TransactionId,
    pub amount: Money,
}

/// A bank transaction read from an export, before it is stored.
///
/// All five fields together form the natural key used to skip rows that
/// were already imported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub name: String,
    pub iban: String,
    pub reference: String,
    pub value_date: NaiveDate,
    pub amount: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub name: String,
    pub iban: String,
    pub reference: String,
    pub value_date: NaiveDate,
    pub amount: Money,
    /// `false` excludes the transaction from automatic and manual matching.
    pub associate: bool,
    pub allocations: Vec<Allocation>,
}

impl Transaction {
    pub fn allocated_amount(&self) -> Money {
        self.allocations.iter().map(|a| a.amount).sum()
    }

    pub fn unallocated_amount(&self) -> Result<Money, LedgerError> {
        let allocated = self.allocated_amount();
        if allocated > self.amount {
            return Err(LedgerError::OverAllocated {
                transaction: self.id,
                amount: self.amount,
                allocated,
            });
        }
        Ok(self.amount - allocated)
    }

    pub fn is_fully_allocated(&self) -> Result<bool, LedgerError> {
        Ok(self.unallocated_amount()?.is_zero())
    }

    pub fn add_allocation(&mut self, allocation: Allocation) {
        merge_allocation(&mut self.allocations, allocation);
    }

    /// Numbers of the orders this transaction pays for.
    pub fn allocated_order_nrs(&self) -> Vec<String> {
        self.allocations.iter().map(|a| a.order_nr.clone()).collect()
    }

    /// Multi-line summary shown to the operator.
    pub fn description(&self) -> String {
        let mut desc = format!(
            "###################\nTransaction {self}\n\tName: {}\n\tReference: {}\n\tAmount: {}",
            self.name, self.reference, self.amount
        );
        if !self.allocations.is_empty() {
            let details: Vec<String> = self
                .allocations
                .iter()
                .map(|a| format!("{} (allocated: {})", a.order_nr, a.amount))
                .collect();
            desc.push_str("\n\tAllocated orders: ");
            desc.push_str(&details.join(", "));
        }
        desc.push_str("\n###################");
        desc
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{},{})", self.id, self.name, self.value_date)
    }
}
