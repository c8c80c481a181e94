use chrono::NaiveDate;
use remit_core::{
    Allocation, AssociationOutcome, LedgerError, Money, NewTransaction, OrderId, Transaction,
    TransactionId,
};
use std::collections::BTreeSet;
use thiserror::Error;

use crate::db::DbPool;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(TransactionId),
    /// A transaction with the same natural key is already stored.
    Duplicate,
}

type TransactionRow = (i64, String, String, String, NaiveDate, i64, i64);

const TRANSACTION_COLUMNS: &str =
    "t.id, t.name, t.iban, t.reference, t.value_date, t.amount_cents, t.associate";

pub async fn insert_transaction(
    pool: &DbPool,
    tx: &NewTransaction,
) -> Result<InsertOutcome, sqlx::Error> {
    let result = sqlx::query_scalar::<_, i64>(
        "INSERT INTO transactions (name, iban, reference, value_date, amount_cents) VALUES (?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(&tx.name)
    .bind(&tx.iban)
    .bind(&tx.reference)
    .bind(tx.value_date)
    .bind(tx.amount.to_cents())
    .fetch_one(pool)
    .await;

    match result {
        Ok(id) => Ok(InsertOutcome::Inserted(TransactionId(id))),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Ok(InsertOutcome::Duplicate),
        Err(e) => Err(e),
    }
}

pub async fn get_transaction(
    pool: &DbPool,
    id: TransactionId,
) -> Result<Option<Transaction>, sqlx::Error> {
    let row = sqlx::query_as::<_, TransactionRow>(&format!(
        "SELECT {TRANSACTION_COLUMNS} FROM transactions t WHERE t.id = ?"
    ))
    .bind(id.0)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(Some(load_transaction(pool, row).await?)),
        None => Ok(None),
    }
}

/// Transactions still open for matching: flagged for association and with
/// an allocated amount different from their amount, oldest first.
pub async fn get_unresolved_transactions(pool: &DbPool) -> Result<Vec<Transaction>, sqlx::Error> {
    let rows = sqlx::query_as::<_, TransactionRow>(&format!(
        r#"
        SELECT {TRANSACTION_COLUMNS}
        FROM transactions t
        WHERE t.associate = 1
          AND t.amount_cents - COALESCE(
                (SELECT SUM(a.amount_cents) FROM allocations a WHERE a.transaction_id = t.id), 0
              ) != 0
        ORDER BY t.id
        "#
    ))
    .fetch_all(pool)
    .await?;

    let mut transactions = Vec::with_capacity(rows.len());
    for row in rows {
        transactions.push(load_transaction(pool, row).await?);
    }
    Ok(transactions)
}

async fn load_transaction(pool: &DbPool, row: TransactionRow) -> Result<Transaction, sqlx::Error> {
    let (id, name, iban, reference, value_date, amount, associate) = row;

    let allocations = sqlx::query_as::<_, (i64, String, i64)>(
        r#"
        SELECT a.order_id, o.nr, a.amount_cents
        FROM allocations a JOIN orders o ON o.id = a.order_id
        WHERE a.transaction_id = ?
        ORDER BY a.rowid
        "#,
    )
    .bind(id)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|(order_id, order_nr, amount)| Allocation {
        order_id: OrderId(order_id),
        order_nr,
        transaction_id: TransactionId(id),
        amount: Money::from_cents(amount),
    })
    .collect();

    Ok(Transaction {
        id: TransactionId(id),
        name,
        iban,
        reference,
        value_date,
        amount: Money::from_cents(amount),
        associate: associate != 0,
        allocations,
    })
}

pub async fn set_transaction_associate(
    pool: &DbPool,
    id: TransactionId,
    associate: bool,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE transactions SET associate = ? WHERE id = ?")
        .bind(i64::from(associate))
        .bind(id.0)
        .execute(pool)
        .await?;
    Ok(())
}

/// Persists one `associate` call as a single database transaction.
///
/// Allocation amounts are added to any stored amount for the same pair.
/// Nothing is written if a touched transaction would end up over-allocated.
pub async fn apply_association(
    pool: &DbPool,
    outcome: &AssociationOutcome,
) -> Result<(), StoreError> {
    let mut tx = pool.begin().await?;

    for allocation in &outcome.allocations {
        sqlx::query(
            r#"
            INSERT INTO allocations (order_id, transaction_id, amount_cents) VALUES (?, ?, ?)
            ON CONFLICT(order_id, transaction_id) DO UPDATE SET amount_cents = amount_cents + excluded.amount_cents
            "#,
        )
        .bind(allocation.order_id.0)
        .bind(allocation.transaction_id.0)
        .bind(allocation.amount.to_cents())
        .execute(&mut *tx)
        .await?;
    }

    for decree in &outcome.decrees {
        sqlx::query("UPDATE orders SET decree_cents = ? WHERE id = ?")
            .bind(decree.decree.to_cents())
            .bind(decree.order_id.0)
            .execute(&mut *tx)
            .await?;
    }

    let touched: BTreeSet<i64> = outcome
        .allocations
        .iter()
        .map(|a| a.transaction_id.0)
        .collect();
    for id in touched {
        let (amount, allocated) = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT t.amount_cents, COALESCE(SUM(a.amount_cents), 0)
            FROM transactions t LEFT JOIN allocations a ON a.transaction_id = t.id
            WHERE t.id = ?
            GROUP BY t.id
            "#,
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        if allocated > amount {
            tracing::error!(transaction = id, amount, allocated, "over-allocation, rolling back");
            return Err(LedgerError::OverAllocated {
                transaction: TransactionId(id),
                amount: Money::from_cents(amount),
                allocated: Money::from_cents(allocated),
            }
            .into());
        }
    }

    tx.commit().await?;
    tracing::debug!(
        allocations = outcome.allocations.len(),
        decrees = outcome.decrees.len(),
        "association stored"
    );
    Ok(())
}

pub async fn count_transactions(pool: &DbPool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM transactions")
        .fetch_one(pool)
        .await
}

pub async fn count_allocations(pool: &DbPool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM allocations")
        .fetch_one(pool)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::test_pool;
    use crate::orders::tests::new_order;
    use crate::orders::{
        get_order_balances, get_order_by_nr, get_unpaid_order_balances, upsert_order, void_order,
    };
    use remit_core::{associate, Mode, WriteOffPolicy};

    fn new_tx(reference: &str, cents: i64) -> NewTransaction {
        NewTransaction {
            name: "Erika Mustermann".to_string(),
            iban: "DE02120300000000202051".to_string(),
            reference: reference.to_string(),
            value_date: NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
            amount: Money::from_cents(cents),
        }
    }

    async fn stored_tx(pool: &DbPool, reference: &str, cents: i64) -> Transaction {
        match insert_transaction(pool, &new_tx(reference, cents)).await.unwrap() {
            InsertOutcome::Inserted(id) => get_transaction(pool, id).await.unwrap().unwrap(),
            InsertOutcome::Duplicate => panic!("fixture transaction already stored"),
        }
    }

    #[tokio::test]
    async fn duplicate_row_is_stored_once() {
        let (_dir, pool) = test_pool().await;
        let row = new_tx("ABI1000", 5000);

        assert!(matches!(
            insert_transaction(&pool, &row).await.unwrap(),
            InsertOutcome::Inserted(_)
        ));
        assert_eq!(insert_transaction(&pool, &row).await.unwrap(), InsertOutcome::Duplicate);
        assert_eq!(count_transactions(&pool).await.unwrap(), 1);

        let other_day = NewTransaction {
            value_date: NaiveDate::from_ymd_opt(2024, 3, 6).unwrap(),
            ..row
        };
        assert!(matches!(
            insert_transaction(&pool, &other_day).await.unwrap(),
            InsertOutcome::Inserted(_)
        ));
    }

    #[tokio::test]
    async fn association_is_persisted_and_resolves_transaction() {
        let (_dir, pool) = test_pool().await;
        upsert_order(&pool, &new_order("ABI1000", &[(10000, 1)])).await.unwrap();
        upsert_order(&pool, &new_order("ABI1001", &[(8000, 1)])).await.unwrap();
        let mut tx = stored_tx(&pool, "ABI1000 ABI1001", 15000).await;
        assert_eq!(get_unresolved_transactions(&pool).await.unwrap().len(), 1);

        let mut orders = vec![
            get_order_by_nr(&pool, "ABI1000").await.unwrap().unwrap(),
            get_order_by_nr(&pool, "ABI1001").await.unwrap().unwrap(),
        ];
        let outcome =
            associate(&mut tx, &mut orders, &WriteOffPolicy::default(), Mode::Automatic).unwrap();
        apply_association(&pool, &outcome).await.unwrap();

        let reloaded = get_transaction(&pool, tx.id).await.unwrap().unwrap();
        assert_eq!(reloaded.allocations, tx.allocations);
        assert!(reloaded.is_fully_allocated().unwrap());
        assert!(get_unresolved_transactions(&pool).await.unwrap().is_empty());
        assert_eq!(count_allocations(&pool).await.unwrap(), 2);

        let second = get_order_by_nr(&pool, "ABI1001").await.unwrap().unwrap();
        assert_eq!(second.outstanding_amount().to_cents(), 3000);
    }

    #[tokio::test]
    async fn decree_is_persisted() {
        let (_dir, pool) = test_pool().await;
        upsert_order(&pool, &new_order("ABI1000", &[(10000, 1)])).await.unwrap();
        let mut tx = stored_tx(&pool, "ABI1000", 9950).await;
        let mut orders = vec![get_order_by_nr(&pool, "ABI1000").await.unwrap().unwrap()];

        let outcome =
            associate(&mut tx, &mut orders, &WriteOffPolicy::default(), Mode::Automatic).unwrap();
        apply_association(&pool, &outcome).await.unwrap();

        let order = get_order_by_nr(&pool, "ABI1000").await.unwrap().unwrap();
        assert_eq!(order.decree.to_cents(), 50);
        assert!(order.is_paid());
        assert!(get_unpaid_order_balances(&pool).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reallocating_a_pair_adds_to_it() {
        let (_dir, pool) = test_pool().await;
        upsert_order(&pool, &new_order("ABI1000", &[(10000, 1)])).await.unwrap();
        let tx = stored_tx(&pool, "", 10000).await;
        let order = get_order_by_nr(&pool, "ABI1000").await.unwrap().unwrap();
        let part = |cents| AssociationOutcome {
            mode: Mode::Interactive,
            allocations: vec![Allocation {
                order_id: order.id,
                order_nr: order.nr.clone(),
                transaction_id: tx.id,
                amount: Money::from_cents(cents),
            }],
            decrees: Vec::new(),
            notices: Vec::new(),
        };

        apply_association(&pool, &part(4000)).await.unwrap();
        apply_association(&pool, &part(1000)).await.unwrap();

        let reloaded = get_transaction(&pool, tx.id).await.unwrap().unwrap();
        assert_eq!(reloaded.allocations.len(), 1);
        assert_eq!(reloaded.allocated_amount().to_cents(), 5000);
    }

    #[tokio::test]
    async fn over_allocation_is_rolled_back() {
        let (_dir, pool) = test_pool().await;
        upsert_order(&pool, &new_order("ABI1000", &[(10000, 1)])).await.unwrap();
        let tx = stored_tx(&pool, "", 1000).await;
        let order = get_order_by_nr(&pool, "ABI1000").await.unwrap().unwrap();
        let outcome = AssociationOutcome {
            mode: Mode::Automatic,
            allocations: vec![Allocation {
                order_id: order.id,
                order_nr: order.nr.clone(),
                transaction_id: tx.id,
                amount: Money::from_cents(1500),
            }],
            decrees: Vec::new(),
            notices: Vec::new(),
        };

        let result = apply_association(&pool, &outcome).await;

        assert!(matches!(result, Err(StoreError::Ledger(LedgerError::OverAllocated { .. }))));
        assert_eq!(count_allocations(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn ignored_transaction_is_not_unresolved() {
        let (_dir, pool) = test_pool().await;
        let tx = stored_tx(&pool, "no ref", 2500).await;
        set_transaction_associate(&pool, tx.id, false).await.unwrap();

        assert!(get_unresolved_transactions(&pool).await.unwrap().is_empty());
        assert!(!get_transaction(&pool, tx.id).await.unwrap().unwrap().associate);
    }

    #[tokio::test]
    async fn voiding_an_order_cascades_to_allocations() {
        let (_dir, pool) = test_pool().await;
        upsert_order(&pool, &new_order("ABI1000", &[(1000, 1)])).await.unwrap();
        let mut tx = stored_tx(&pool, "ABI1000", 1000).await;
        let mut orders = vec![get_order_by_nr(&pool, "ABI1000").await.unwrap().unwrap()];
        let outcome =
            associate(&mut tx, &mut orders, &WriteOffPolicy::default(), Mode::Automatic).unwrap();
        apply_association(&pool, &outcome).await.unwrap();

        void_order(&pool, "ABI1000").await.unwrap();

        assert_eq!(count_allocations(&pool).await.unwrap(), 0);
        assert_eq!(get_unresolved_transactions(&pool).await.unwrap().len(), 1);
    }

    /// The SQL aggregates must agree with the in-memory ones on the same data.
    #[tokio::test]
    async fn sql_and_memory_aggregates_agree() {
        let (_dir, pool) = test_pool().await;
        let mut discounted = new_order("ABI1000", &[(2500, 2), (999, 3)]);
        discounted.discount = Money::from_cents(700);
        discounted.shipping = Money::from_cents(490);
        upsert_order(&pool, &discounted).await.unwrap();
        upsert_order(&pool, &new_order("ABI1001", &[(10000, 1)])).await.unwrap();
        upsert_order(&pool, &new_order("ABI1002", &[(4000, 1)])).await.unwrap();
        upsert_order(&pool, &new_order("ABI1003", &[])).await.unwrap();

        let policy = WriteOffPolicy {
            ignore_missing_payment_max: Money::from_cents(60),
        };
        for (reference, cents, nrs) in [
            ("a", 3000, vec!["ABI1000"]),
            ("b", 9950, vec!["ABI1001"]),
            ("c", 5000, vec!["ABI1002", "ABI1000"]),
        ] {
            let mut tx = stored_tx(&pool, reference, cents).await;
            let mut orders = Vec::new();
            for nr in nrs {
                orders.push(get_order_by_nr(&pool, nr).await.unwrap().unwrap());
            }
            let outcome = associate(&mut tx, &mut orders, &policy, Mode::Automatic).unwrap();
            apply_association(&pool, &outcome).await.unwrap();
        }

        let balances = get_order_balances(&pool).await.unwrap();
        assert_eq!(balances.len(), 4);
        for balance in &balances {
            let order = get_order_by_nr(&pool, &balance.nr).await.unwrap().unwrap();
            assert_eq!(balance.owed, order.owed_amount(), "owed of {}", order.nr);
            assert_eq!(balance.paid, order.paid_amount(), "paid of {}", order.nr);
            assert_eq!(balance.outstanding(), order.outstanding_amount());
        }

        let unpaid: Vec<String> = get_unpaid_order_balances(&pool)
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.nr)
            .collect();
        let mut expected = Vec::new();
        for balance in &balances {
            let order = get_order_by_nr(&pool, &balance.nr).await.unwrap().unwrap();
            if !order.is_paid() {
                expected.push(order.nr);
            }
        }
        assert_eq!(unpaid, expected);
        assert_eq!(unpaid, ["ABI1000"]);

        for tx in get_unresolved_transactions(&pool).await.unwrap() {
            assert!(!tx.is_fully_allocated().unwrap());
        }
    }
}
