//! The operator-facing runs behind each CLI subcommand.

use chrono::{Days, NaiveDate};
use remit_core::WriteOffPolicy;
use remit_import::{fetch_all, find_transaction_file, read_bank_csv, ImportError, OrderSource};
use remit_storage::{
    count_allocations, get_setting, get_unpaid_order_balances, insert_transaction, set_setting,
    upsert_order, void_order, DbPool, InsertOutcome, UpsertOutcome,
};
use std::io::{BufRead, Write};
use std::path::Path;
use tracing::{info, warn};

use crate::config::Settings;
use crate::error::ReconcileError;
use crate::reconcile::auto_reconcile;
use crate::session::{ManualSession, SessionSummary, Verdict};

pub const UPDATE_AFTER_KEY: &str = "update_after";
const DATE_FORMAT: &str = "%Y-%m-%d";
/// Orders changed shortly before the last run are fetched again.
const UPDATE_OVERLAP_DAYS: u64 = 2;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderImport {
    pub created: usize,
    pub updated: usize,
    pub voided: usize,
    pub rejected: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionImport {
    pub inserted: usize,
    pub duplicates: usize,
    pub outgoing: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateReport {
    pub orders: OrderImport,
    pub transactions: TransactionImport,
    pub allocations_added: i64,
    /// Notices the automatic pass raised, e.g. orders left owing.
    pub notices: usize,
    pub problematic: usize,
    pub session: SessionSummary,
}

/// Date after which storefront orders are fetched on the next run.
pub async fn load_update_after(
    pool: &DbPool,
    settings: &Settings,
) -> Result<NaiveDate, ReconcileError> {
    let stored = get_setting(pool, UPDATE_AFTER_KEY).await?;
    Ok(match stored {
        Some(value) => match NaiveDate::parse_from_str(&value, DATE_FORMAT) {
            Ok(date) => date,
            Err(_) => {
                warn!(%value, "stored update_after is not a date, using the configured start");
                settings.initial_update_after
            }
        },
        None => settings.initial_update_after,
    })
}

/// Pulls changed orders from `source` into the database.
///
/// Cancelled orders are removed together with their allocations. A record
/// that cannot be converted is reported and skipped.
pub async fn import_orders<S, W>(
    pool: &DbPool,
    source: &mut S,
    updated_after: NaiveDate,
    output: &mut W,
) -> Result<OrderImport, ReconcileError>
where
    S: OrderSource + ?Sized,
    W: Write,
{
    let records = fetch_all(source, updated_after)?;
    let mut report = OrderImport::default();

    for record in records {
        if record.is_cancelled() {
            if void_order(pool, record.name.trim()).await? {
                info!(order = %record.name, "cancelled order voided");
                report.voided += 1;
            }
            continue;
        }

        let order = match record.to_new_order() {
            Ok(order) => order,
            Err(e) => {
                warn!(order = %record.name, "skipping order: {e}");
                writeln!(output, "Order {} could not be imported: {e}", record.name)?;
                report.rejected += 1;
                continue;
            }
        };

        match upsert_order(pool, &order).await? {
            UpsertOutcome::Created(_) => report.created += 1,
            UpsertOutcome::Updated(_) => report.updated += 1,
        }
    }

    info!(?report, "orders imported");
    Ok(report)
}

/// Reads the bank export in `dir` and stores its incoming payments.
pub async fn import_transactions(
    pool: &DbPool,
    dir: &Path,
) -> Result<TransactionImport, ReconcileError> {
    let path = find_transaction_file(dir)?;
    let file = std::fs::File::open(&path).map_err(ImportError::from)?;
    let rows = read_bank_csv(std::io::BufReader::new(file))?;
    let mut report = TransactionImport::default();

    for row in rows {
        if !row.is_incoming() {
            report.outgoing += 1;
            continue;
        }
        match insert_transaction(pool, &row.transaction).await? {
            InsertOutcome::Inserted(_) => report.inserted += 1,
            InsertOutcome::Duplicate => {
                info!(row = %row.index, "transaction already imported");
                report.duplicates += 1;
            }
        }
    }

    info!(file = %path.display(), ?report, "transactions imported");
    Ok(report)
}

/// One full update run: import, reconcile automatically, then hand the rest
/// to the operator.
///
/// Import failures are reported and that import is skipped. Errors from the
/// reconciliation itself end the run.
pub async fn update<S, R, W>(
    pool: &DbPool,
    settings: &Settings,
    source: &mut S,
    mut input: R,
    mut output: W,
    today: NaiveDate,
) -> Result<UpdateReport, ReconcileError>
where
    S: OrderSource + ?Sized,
    R: BufRead,
    W: Write,
{
    let policy = settings.write_off_policy();
    let mut report = UpdateReport::default();
    let allocations_before = count_allocations(pool).await?;

    let updated_after = load_update_after(pool, settings).await?;
    writeln!(output, "Importing orders changed since {updated_after}...")?;
    match import_orders(pool, source, updated_after, &mut output).await {
        Ok(orders) => report.orders = orders,
        Err(ReconcileError::Import(e)) => {
            warn!("order import failed: {e}");
            writeln!(output, "Orders could not be imported: {e}")?;
        }
        Err(e) => return Err(e),
    }

    writeln!(output, "Importing transactions...")?;
    match import_transactions(pool, &settings.transactions_dir).await {
        Ok(transactions) => report.transactions = transactions,
        Err(ReconcileError::Import(e)) => {
            warn!("transaction import failed: {e}");
            writeln!(output, "Transactions could not be imported: {e}")?;
        }
        Err(e) => return Err(e),
    }

    writeln!(output, "Matching transactions to orders...")?;
    let pass = auto_reconcile(pool, &policy).await?;
    for (transaction, notice) in &pass.notices {
        writeln!(output, "Transaction {transaction}: {notice}")?;
    }
    report.notices = pass.notices.len();
    report.problematic = pass.problematic.len();

    let mut session = ManualSession::new(pool, &policy, &mut input, &mut output);
    report.session = session.run(pass.problematic).await?;

    let next = today
        .checked_sub_days(Days::new(UPDATE_OVERLAP_DAYS))
        .unwrap_or(today);
    set_setting(pool, UPDATE_AFTER_KEY, &next.format(DATE_FORMAT).to_string()).await?;

    report.allocations_added = count_allocations(pool).await? - allocations_before;
    writeln!(
        output,
        "{} new order(s), {} new transaction(s), {} new allocation(s).",
        report.orders.created, report.transactions.inserted, report.allocations_added
    )?;
    Ok(report)
}

/// Lets the operator pick transactions by id until they stop.
pub async fn associate_manually<R, W>(
    pool: &DbPool,
    policy: &WriteOffPolicy,
    input: R,
    output: W,
) -> Result<SessionSummary, ReconcileError>
where
    R: BufRead,
    W: Write,
{
    let mut session = ManualSession::new(pool, policy, input, output);
    let mut summary = SessionSummary::default();
    while let Some(transaction) = session.pick_transaction().await? {
        match session.handle_transaction(transaction).await? {
            Verdict::Resolved => summary.resolved += 1,
            Verdict::Skipped => summary.skipped += 1,
            Verdict::Ignored => summary.ignored += 1,
            Verdict::Stopped => {
                summary.stopped = true;
                break;
            }
        }
    }
    Ok(summary)
}

/// Prints every order that is not paid in full. Returns how many there are.
pub async fn list_unpaid<W: Write>(pool: &DbPool, mut output: W) -> Result<usize, ReconcileError> {
    let balances = get_unpaid_order_balances(pool).await?;
    if balances.is_empty() {
        writeln!(output, "All orders are paid.")?;
        return Ok(0);
    }
    for balance in &balances {
        writeln!(
            output,
            "{}\t{}\towed {}\tpaid {}\topen {}",
            balance.nr,
            balance.created_at,
            balance.owed,
            balance.paid,
            balance.outstanding()
        )?;
    }
    Ok(balances.len())
}
