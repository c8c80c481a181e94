use chrono::NaiveDate;
use remit_core::{Allocation, LineItem, Money, NewOrder, Order, OrderId, TransactionId};
use serde::Serialize;

use crate::db::DbPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created(OrderId),
    Updated(OrderId),
}

type OrderRow = (i64, String, NaiveDate, i64, i64, i64, Option<String>);

const ORDER_COLUMNS: &str =
    "id, nr, created_at, discount_cents, shipping_cents, decree_cents, note";

/// Creates the order with its line items, or refreshes discount, shipping and
/// note of an existing one. Line items of existing orders are left alone.
pub async fn upsert_order(pool: &DbPool, order: &NewOrder) -> Result<UpsertOutcome, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM orders WHERE nr = ?")
        .bind(&order.nr)
        .fetch_optional(&mut *tx)
        .await?;

    let outcome = match existing {
        Some(id) => {
            sqlx::query(
                "UPDATE orders SET discount_cents = ?, shipping_cents = ?, note = ? WHERE id = ?",
            )
            .bind(order.discount.to_cents())
            .bind(order.shipping.to_cents())
            .bind(&order.note)
            .bind(id)
            .execute(&mut *tx)
            .await?;
            UpsertOutcome::Updated(OrderId(id))
        }
        None => {
            let id: i64 = sqlx::query_scalar(
                "INSERT INTO orders (nr, created_at, discount_cents, shipping_cents, note) VALUES (?, ?, ?, ?, ?) RETURNING id",
            )
            .bind(&order.nr)
            .bind(order.created_at)
            .bind(order.discount.to_cents())
            .bind(order.shipping.to_cents())
            .bind(&order.note)
            .fetch_one(&mut *tx)
            .await?;

            for item in &order.line_items {
                sqlx::query(
                    "INSERT INTO line_items (order_id, price_cents, quantity) VALUES (?, ?, ?)",
                )
                .bind(id)
                .bind(item.price.to_cents())
                .bind(item.quantity)
                .execute(&mut *tx)
                .await?;
            }
            UpsertOutcome::Created(OrderId(id))
        }
    };

    tx.commit().await?;
    Ok(outcome)
}

/// Deletes a cancelled order together with its line items and allocations.
/// Returns whether the order existed.
pub async fn void_order(pool: &DbPool, nr: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM orders WHERE nr = ?")
        .bind(nr)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn get_order_by_nr(pool: &DbPool, nr: &str) -> Result<Option<Order>, sqlx::Error> {
    let row = sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE nr = ?"
    ))
    .bind(nr)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(Some(load_order(pool, row).await?)),
        None => Ok(None),
    }
}

/// Orders with one of the given numbers, oldest first. Unknown numbers are
/// skipped; compare the length with the input to detect them.
pub async fn get_orders_by_nrs<I, S>(pool: &DbPool, nrs: I) -> Result<Vec<Order>, sqlx::Error>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut orders = Vec::new();
    for nr in nrs {
        if let Some(order) = get_order_by_nr(pool, nr.as_ref()).await? {
            if !orders.iter().any(|o: &Order| o.id == order.id) {
                orders.push(order);
            }
        }
    }
    orders.sort_by_key(|o| o.id.0);
    Ok(orders)
}

async fn load_order(pool: &DbPool, row: OrderRow) -> Result<Order, sqlx::Error> {
    let (id, nr, created_at, discount, shipping, decree, note) = row;

    let line_items = sqlx::query_as::<_, (i64, i64)>(
        "SELECT price_cents, quantity FROM line_items WHERE order_id = ? ORDER BY id",
    )
    .bind(id)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|(price, quantity)| LineItem::new(Money::from_cents(price), quantity))
    .collect();

    let allocations = sqlx::query_as::<_, (i64, i64)>(
        "SELECT transaction_id, amount_cents FROM allocations WHERE order_id = ? ORDER BY rowid",
    )
    .bind(id)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|(transaction_id, amount)| Allocation {
        order_id: OrderId(id),
        order_nr: nr.clone(),
        transaction_id: TransactionId(transaction_id),
        amount: Money::from_cents(amount),
    })
    .collect();

    Ok(Order {
        id: OrderId(id),
        nr,
        created_at,
        discount: Money::from_cents(discount),
        shipping: Money::from_cents(shipping),
        decree: Money::from_cents(decree),
        note,
        line_items,
        allocations,
    })
}

/// Owed and paid amount of an order, computed by the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderBalance {
    pub id: OrderId,
    pub nr: String,
    pub created_at: NaiveDate,
    pub owed: Money,
    pub paid: Money,
}

impl OrderBalance {
    pub fn outstanding(&self) -> Money {
        self.owed - self.paid
    }
}

const ORDER_BALANCES: &str = r#"
    SELECT o.id AS id, o.nr AS nr, o.created_at AS created_at,
        COALESCE((SELECT SUM(li.price_cents * li.quantity) FROM line_items li WHERE li.order_id = o.id), 0)
            - o.discount_cents + o.shipping_cents AS owed_cents,
        COALESCE((SELECT SUM(a.amount_cents) FROM allocations a WHERE a.order_id = o.id), 0)
            + o.decree_cents AS paid_cents
    FROM orders o
"#;

type BalanceRow = (i64, String, NaiveDate, i64, i64);

fn to_balance((id, nr, created_at, owed, paid): BalanceRow) -> OrderBalance {
    OrderBalance {
        id: OrderId(id),
        nr,
        created_at,
        owed: Money::from_cents(owed),
        paid: Money::from_cents(paid),
    }
}

pub async fn get_order_balances(pool: &DbPool) -> Result<Vec<OrderBalance>, sqlx::Error> {
    let rows = sqlx::query_as::<_, BalanceRow>(&format!("{ORDER_BALANCES} ORDER BY o.id"))
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(to_balance).collect())
}

/// Orders whose paid amount is below the owed amount, oldest first.
pub async fn get_unpaid_order_balances(pool: &DbPool) -> Result<Vec<OrderBalance>, sqlx::Error> {
    let rows = sqlx::query_as::<_, BalanceRow>(&format!(
        "SELECT id, nr, created_at, owed_cents, paid_cents FROM ({ORDER_BALANCES}) \
         WHERE paid_cents < owed_cents ORDER BY created_at, id"
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(to_balance).collect())
}

pub async fn count_orders(pool: &DbPool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM orders")
        .fetch_one(pool)
        .await
}
