pub mod commands;
pub mod config;
pub mod error;
pub mod reconcile;
pub mod session;

pub use config::Settings;
pub use error::ReconcileError;
pub use reconcile::{auto_reconcile, lookup_orders, AutoPass, PROBLEMATIC_REMAINDER};
pub use session::{Command, ManualSession, SessionSummary, Verdict};
