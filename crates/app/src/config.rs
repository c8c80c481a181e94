use chrono::NaiveDate;
use remit_core::{Money, WriteOffPolicy};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::ReconcileError;

/// Runtime settings, read once at startup from a TOML file.
///
/// ```toml
/// database_path = "/srv/remit/remit.db"
/// transactions_dir = "/srv/remit/transactions"
/// orders_file = "/srv/remit/orders.json"
/// ignore_missing_payment_max = 100
/// initial_update_after = "2024-01-01"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database_path: PathBuf,
    /// Folder the bank exports are dropped into.
    pub transactions_dir: PathBuf,
    /// JSON export of storefront orders.
    pub orders_file: PathBuf,
    /// Largest shortfall, in cents, written off automatically.
    pub ignore_missing_payment_max: i64,
    pub order_page_size: usize,
    /// Orders changed on or after this date are fetched on the first run.
    pub initial_update_after: NaiveDate,
}

impl Default for Settings {
    fn default() -> Self {
        let data_dir = directories::ProjectDirs::from("de", "remit", "Remit")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("remit.db"),
            transactions_dir: data_dir.join("transactions"),
            orders_file: data_dir.join("orders.json"),
            ignore_missing_payment_max: 100,
            order_page_size: 50,
            initial_update_after: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or_default(),
        }
    }
}

impl Settings {
    /// Reads `path` if given and present, otherwise falls back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ReconcileError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            tracing::info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ReconcileError> {
        let settings: Settings = toml::from_str(content)
            .map_err(|e| ReconcileError::Config(format!("Failed to parse TOML: {e}")))?;
        if settings.ignore_missing_payment_max < 0 {
            return Err(ReconcileError::Config(
                "ignore_missing_payment_max must not be negative".to_string(),
            ));
        }
        Ok(settings)
    }

    pub fn write_off_policy(&self) -> WriteOffPolicy {
        WriteOffPolicy {
            ignore_missing_payment_max: Money::from_cents(self.ignore_missing_payment_max),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let settings = Settings::from_toml(
            r#"
            transactions_dir = "/tmp/bank"
            ignore_missing_payment_max = 250
            "#,
        )
        .unwrap();
        assert_eq!(settings.transactions_dir, PathBuf::from("/tmp/bank"));
        assert_eq!(
            settings.write_off_policy().ignore_missing_payment_max.to_cents(),
            250
        );
        assert_eq!(settings.order_page_size, Settings::default().order_page_size);
    }

    #[test]
    fn parses_initial_update_after() {
        let settings = Settings::from_toml(r#"initial_update_after = "2024-02-29""#).unwrap();
        assert_eq!(
            settings.initial_update_after,
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
    }

    #[test]
    fn rejects_malformed_and_negative() {
        assert!(matches!(
            Settings::from_toml("ignore_missing_payment_max = \"lots\""),
            Err(ReconcileError::Config(_))
        ));
        assert!(matches!(
            Settings::from_toml("ignore_missing_payment_max = -1"),
            Err(ReconcileError::Config(_))
        ));
    }

    #[test]
    fn missing_file_means_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(Some(&dir.path().join("remit.toml"))).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(Settings::load(None).unwrap(), Settings::default());
    }
}
