//! Operator-driven matching of transactions the automatic pass left open.

use remit_core::{associate, Mode, Transaction, TransactionId, WriteOffPolicy};
use remit_import::parse_order_nrs;
use remit_storage::{apply_association, get_transaction, set_transaction_associate, DbPool};
use std::io::{BufRead, Write};

use crate::error::ReconcileError;
use crate::reconcile::lookup_orders;

/// One line of operator input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Order numbers to allocate the transaction to, in this order.
    Orders(Vec<String>),
    /// Leave the transaction for a later run.
    Skip,
    /// Never ask about this transaction again.
    IgnorePermanently,
    /// End the session.
    Stop,
}

impl Command {
    /// `None` for a blank line.
    pub fn parse(line: &str) -> Option<Command> {
        let line = line.trim();
        match line.to_lowercase().as_str() {
            "" => None,
            "w" | "skip" => Some(Command::Skip),
            "i" | "ignore" => Some(Command::IgnorePermanently),
            "s" | "stop" => Some(Command::Stop),
            _ => Some(Command::Orders(parse_order_nrs(line))),
        }
    }
}

/// How the operator left a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Resolved,
    Skipped,
    Ignored,
    Stopped,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub resolved: usize,
    pub skipped: usize,
    pub ignored: usize,
    pub stopped: bool,
}

pub const HELP: &str = "Enter the order number(s) the transaction pays for, e.g. \"1000\" or \
\"1000 1001\". \"w\" skips the transaction, \"i\" ignores it from now on, \"s\" stops.";

pub struct ManualSession<'a, R, W> {
    pool: &'a DbPool,
    policy: &'a WriteOffPolicy,
    input: R,
    output: W,
}

impl<'a, R: BufRead, W: Write> ManualSession<'a, R, W> {
    pub fn new(pool: &'a DbPool, policy: &'a WriteOffPolicy, input: R, output: W) -> Self {
        Self {
            pool,
            policy,
            input,
            output,
        }
    }

    pub fn into_output(self) -> W {
        self.output
    }

    /// Walks `transactions` until all are handled or the operator stops.
    pub async fn run(
        &mut self,
        transactions: Vec<Transaction>,
    ) -> Result<SessionSummary, ReconcileError> {
        let mut summary = SessionSummary::default();
        if transactions.is_empty() {
            return Ok(summary);
        }
        writeln!(
            self.output,
            "{} transaction(s) could not be matched automatically. {HELP}",
            transactions.len()
        )?;

        for transaction in transactions {
            match self.handle_transaction(transaction).await? {
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

    /// Asks for orders until the transaction is fully allocated or the
    /// operator moves on.
    pub async fn handle_transaction(
        &mut self,
        mut transaction: Transaction,
    ) -> Result<Verdict, ReconcileError> {
        writeln!(self.output, "{}", transaction.description())?;
        writeln!(self.output, "Which orders does this transaction pay for?")?;

        loop {
            let command = match self.read_command("--> ABI")? {
                Some(command) => command,
                None => return Ok(Verdict::Stopped),
            };

            let nrs = match command {
                Command::Skip => {
                    writeln!(self.output, "Next transaction...")?;
                    return Ok(Verdict::Skipped);
                }
                Command::Stop => {
                    writeln!(self.output, "Back to the main menu.")?;
                    return Ok(Verdict::Stopped);
                }
                Command::IgnorePermanently => {
                    set_transaction_associate(self.pool, transaction.id, false).await?;
                    tracing::info!(%transaction, "transaction excluded from matching");
                    writeln!(
                        self.output,
                        "Transaction {transaction} will be ignored from now on."
                    )?;
                    return Ok(Verdict::Ignored);
                }
                Command::Orders(nrs) => nrs,
            };

            let mut orders = match lookup_orders(self.pool, &nrs).await {
                Ok(orders) => orders,
                Err(ReconcileError::OrderNotFound(nr)) => {
                    writeln!(self.output, "Order \"{nr}\" does not exist.")?;
                    continue;
                }
                Err(e) => return Err(e),
            };

            let outcome = associate(&mut transaction, &mut orders, self.policy, Mode::Interactive)?;
            if let Err(e) = apply_association(self.pool, &outcome).await {
                let e = ReconcileError::from(e);
                if e.is_fatal() {
                    return Err(e);
                }
                tracing::error!(%transaction, "association rolled back: {e}");
                writeln!(self.output, "The allocation could not be saved: {e}")?;
                return Ok(Verdict::Skipped);
            }
            for notice in outcome.operator_notices() {
                writeln!(self.output, "{notice}")?;
            }

            if transaction.is_fully_allocated()? {
                return Ok(Verdict::Resolved);
            }
            writeln!(
                self.output,
                "Only {} of the transaction is allocated, {} is still open. \
                 Enter more orders or \"w\" to continue with the next transaction.",
                transaction.allocated_amount(),
                transaction.unallocated_amount()?
            )?;
        }
    }

    /// Asks for a transaction id. `None` when the operator stops.
    pub async fn pick_transaction(&mut self) -> Result<Option<Transaction>, ReconcileError> {
        writeln!(self.output, "Which transaction do you want to allocate?")?;
        loop {
            let Some(line) = self.read_line("--> Id: ")? else {
                return Ok(None);
            };
            let answer = line.trim();
            if answer.is_empty() {
                continue;
            }
            if Command::parse(answer) == Some(Command::Stop) {
                writeln!(self.output, "Back to the main menu.")?;
                return Ok(None);
            }

            let found = match answer.parse::<i64>() {
                Ok(id) => get_transaction(self.pool, TransactionId(id)).await?,
                Err(_) => None,
            };
            match found {
                Some(transaction) if transaction.is_fully_allocated()? => {
                    writeln!(
                        self.output,
                        "The transaction is already fully allocated to other orders."
                    )?;
                }
                Some(transaction) => return Ok(Some(transaction)),
                None => {
                    tracing::debug!(answer, "no such transaction");
                    writeln!(self.output, "\"{answer}\" is not a transaction.")?;
                }
            }
        }
    }

    fn read_command(&mut self, prompt: &str) -> Result<Option<Command>, ReconcileError> {
        loop {
            match self.read_line(prompt)? {
                None => return Ok(None),
                Some(line) => {
                    if let Some(command) = Command::parse(&line) {
                        return Ok(Some(command));
                    }
                }
            }
        }
    }

    /// `None` at end of input.
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>, ReconcileError> {
        write!(self.output, "{prompt}")?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line))
    }
}
