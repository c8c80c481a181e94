//! Orders as exported by the storefront.

use chrono::NaiveDate;
use remit_core::{LineItem, Money, NewOrder};
use serde::Deserialize;
use std::io::Read;
use std::path::Path;

use crate::error::ImportError;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LineItemRecord {
    pub price: String,
    #[serde(default = "one")]
    pub quantity: i64,
}

fn one() -> i64 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OrderRecord {
    /// Order number, e.g. `ABI1000`.
    pub name: String,
    /// ISO 8601 timestamp.
    pub created_at: String,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub cancelled_at: Option<String>,
    #[serde(default)]
    pub total_discounts: Option<String>,
    #[serde(default)]
    pub total_shipping: Option<String>,
    /// Comma separated shop tags.
    #[serde(default)]
    pub tags: String,
    /// Note left by the customer.
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub line_items: Vec<LineItemRecord>,
}

impl OrderRecord {
    pub fn is_cancelled(&self) -> bool {
        self.cancelled_at.is_some()
    }

    fn last_change(&self) -> Result<NaiveDate, ImportError> {
        let stamp = self.updated_at.as_deref().unwrap_or(&self.created_at);
        self.parse_date(stamp)
    }

    fn parse_date(&self, stamp: &str) -> Result<NaiveDate, ImportError> {
        let day = stamp.split('T').next().unwrap_or_default();
        NaiveDate::parse_from_str(day, "%Y-%m-%d").map_err(|_| ImportError::InvalidDate {
            row: self.name.clone(),
            value: stamp.to_string(),
        })
    }

    fn parse_amount(&self, value: Option<&str>) -> Result<Money, ImportError> {
        match value {
            None => Ok(Money::zero()),
            Some(v) => Money::parse(v).map_err(|_| ImportError::InvalidAmount {
                row: self.name.clone(),
                value: v.to_string(),
            }),
        }
    }

    /// A `name: …` tag set by the shop owner wins over the customer note.
    /// With several such tags the last one counts.
    pub fn effective_note(&self) -> Option<String> {
        self.tags
            .split(',')
            .map(str::trim)
            .rev()
            .find_map(|tag| {
                tag.get(..6)
                    .filter(|prefix| prefix.eq_ignore_ascii_case("name: "))
                    .map(|_| tag[6..].to_string())
            })
            .or_else(|| self.note.clone())
    }

    pub fn to_new_order(&self) -> Result<NewOrder, ImportError> {
        let line_items = self
            .line_items
            .iter()
            .map(|li| Ok(LineItem::new(self.parse_amount(Some(&li.price))?, li.quantity)))
            .collect::<Result<Vec<_>, ImportError>>()?;
        let shipping = self.parse_amount(self.total_shipping.as_deref())?;

        // Totals must fit so that order sums never overflow.
        let mut owed = shipping;
        for (item, record) in line_items.iter().zip(&self.line_items) {
            owed = item
                .checked_total()
                .and_then(|total| owed.checked_add(total))
                .ok_or_else(|| ImportError::InvalidAmount {
                    row: self.name.clone(),
                    value: format!("{} x {}", record.price, record.quantity),
                })?;
        }

        Ok(NewOrder {
            nr: self.name.trim().to_string(),
            created_at: self.parse_date(&self.created_at)?,
            discount: self.parse_amount(self.total_discounts.as_deref())?,
            shipping,
            note: self.effective_note(),
            line_items,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct OrderPage {
    pub orders: Vec<OrderRecord>,
    /// Cursor of the following page, `None` on the last page.
    pub next_cursor: Option<String>,
}

/// A paginated provider of storefront orders changed on or after a date.
pub trait OrderSource {
    fn fetch_page(
        &mut self,
        updated_after: NaiveDate,
        cursor: Option<&str>,
    ) -> Result<OrderPage, ImportError>;
}

/// Walks every page of `source`.
pub fn fetch_all<S: OrderSource + ?Sized>(
    source: &mut S,
    updated_after: NaiveDate,
) -> Result<Vec<OrderRecord>, ImportError> {
    let mut orders = Vec::new();
    let mut cursor: Option<String> = None;
    let mut pages = 0usize;
    loop {
        let page = source.fetch_page(updated_after, cursor.as_deref())?;
        pages += 1;
        orders.extend(page.orders);
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }
    tracing::debug!(pages, orders = orders.len(), "fetched storefront orders");
    Ok(orders)
}

/// Serves a JSON array of [`OrderRecord`]s in fixed-size pages.
pub struct JsonOrderSource {
    records: Vec<OrderRecord>,
    page_size: usize,
}

impl JsonOrderSource {
    pub fn new(records: Vec<OrderRecord>, page_size: usize) -> Self {
        Self {
            records,
            page_size: page_size.max(1),
        }
    }

    pub fn from_reader<R: Read>(data: R, page_size: usize) -> Result<Self, ImportError> {
        let records: Vec<OrderRecord> = serde_json::from_reader(data)?;
        Ok(Self::new(records, page_size))
    }

    pub fn from_path(path: &Path, page_size: usize) -> Result<Self, ImportError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(std::io::BufReader::new(file), page_size)
    }
}

impl OrderSource for JsonOrderSource {
    fn fetch_page(
        &mut self,
        updated_after: NaiveDate,
        cursor: Option<&str>,
    ) -> Result<OrderPage, ImportError> {
        let mut changed = Vec::new();
        for record in &self.records {
            if record.last_change()? >= updated_after {
                changed.push(record);
            }
        }

        let start = cursor.and_then(|c| c.parse::<usize>().ok()).unwrap_or(0);
        let end = (start + self.page_size).min(changed.len());
        let orders = changed
            .get(start..end)
            .unwrap_or_default()
            .iter()
            .map(|r| (*r).clone())
            .collect();
        let next_cursor = (end < changed.len()).then(|| end.to_string());

        Ok(OrderPage { orders, next_cursor })
    }
}
