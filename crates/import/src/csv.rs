use chrono::NaiveDate;
use remit_core::{Money, NewTransaction};
use serde::Deserialize;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::ImportError;

/// Bank exports are recognised by this word in the file name.
pub const TRANSACTION_FILE_KEYWORD: &str = "transaction";

const VALUE_DATE_FORMAT: &str = "%d/%m/%Y";

#[derive(Debug, Deserialize)]
struct BankCsvRecord {
    #[serde(rename = "Index")]
    index: String,
    #[serde(rename = "Amount")]
    amount: String,
    #[serde(rename = "Payment reference")]
    reference: String,
    #[serde(rename = "Counterparty")]
    name: String,
    #[serde(rename = "Account number")]
    iban: String,
    #[serde(rename = "Valuta Date")]
    value_date: String,
}

/// One parsed row of a bank export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankRow {
    pub index: String,
    pub transaction: NewTransaction,
}

impl BankRow {
    /// Outgoing payments never pay for an order.
    pub fn is_incoming(&self) -> bool {
        self.transaction.amount.is_positive()
    }
}

/// Reads a bank export with a header row.
///
/// Stops at the first row whose amount or value date cannot be parsed, so a
/// malformed export is never half-imported.
pub fn read_bank_csv<R: Read>(data: R) -> Result<Vec<BankRow>, ImportError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_reader(data);

    let mut rows = Vec::new();
    for result in reader.deserialize::<BankCsvRecord>() {
        let record = result?;

        let amount = Money::parse(&record.amount).map_err(|_| ImportError::InvalidAmount {
            row: record.index.clone(),
            value: record.amount.clone(),
        })?;
        let value_date = NaiveDate::parse_from_str(record.value_date.trim(), VALUE_DATE_FORMAT)
            .map_err(|_| ImportError::InvalidDate {
                row: record.index.clone(),
                value: record.value_date.clone(),
            })?;

        rows.push(BankRow {
            index: record.index,
            transaction: NewTransaction {
                name: record.name,
                iban: record.iban,
                reference: record.reference,
                value_date,
                amount,
            },
        });
    }

    Ok(rows)
}

/// First file in `dir`, by name, whose name contains
/// [`TRANSACTION_FILE_KEYWORD`] in any case.
pub fn find_transaction_file(dir: &Path) -> Result<PathBuf, ImportError> {
    let missing = || ImportError::MissingTransactionFile {
        dir: dir.to_path_buf(),
        keyword: TRANSACTION_FILE_KEYWORD.to_string(),
    };

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(missing()),
        Err(e) => return Err(e.into()),
    };

    let mut candidates = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_lowercase();
        if name.contains(TRANSACTION_FILE_KEYWORD) && entry.file_type()?.is_file() {
            candidates.push(entry.path());
        }
    }
    candidates.sort();
    candidates.into_iter().next().ok_or_else(missing)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "Index,Amount,Payment reference,Counterparty,Account number,Valuta Date\n";

    fn csv(rows: &str) -> String {
        format!("{HEADER}{rows}")
    }

    #[test]
    fn reads_rows() {
        let data = csv(
            "1,\"1,234.56\",ABI1000,Erika Mustermann,DE02120300000000202051,05/03/2024\n\
             2,-12.3,Rent,Landlord,DE02500105170137075030,06/03/2024\n",
        );
        let rows = read_bank_csv(data.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].index, "1");
        assert_eq!(rows[0].transaction.amount.to_cents(), 123456);
        assert_eq!(rows[0].transaction.reference, "ABI1000");
        assert_eq!(rows[0].transaction.name, "Erika Mustermann");
        assert_eq!(
            rows[0].transaction.value_date,
            NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
        );
        assert!(rows[0].is_incoming());
        assert_eq!(rows[1].transaction.amount.to_cents(), -1230);
        assert!(!rows[1].is_incoming());
    }

    #[test]
    fn malformed_amount_aborts() {
        let data = csv(
            "1,10.00,ABI1000,A,DE1,05/03/2024\n\
             2,n/a,ABI1001,B,DE2,05/03/2024\n",
        );
        match read_bank_csv(data.as_bytes()) {
            Err(ImportError::InvalidAmount { row, value }) => {
                assert_eq!(row, "2");
                assert_eq!(value, "n/a");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn malformed_date_aborts() {
        let data = csv("7,10.00,ABI1000,A,DE1,2024-03-05\n");
        assert!(matches!(
            read_bank_csv(data.as_bytes()),
            Err(ImportError::InvalidDate { .. })
        ));
    }

    #[test]
    fn empty_export_has_no_rows() {
        assert!(read_bank_csv(HEADER.as_bytes()).unwrap().is_empty());
    }

    #[test]
    fn finds_transaction_file_by_keyword() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "").unwrap();
        std::fs::write(dir.path().join("Transactions_2024.csv"), HEADER).unwrap();
        std::fs::write(dir.path().join("transactions_2025.csv"), HEADER).unwrap();

        let found = find_transaction_file(dir.path()).unwrap();
        assert_eq!(found.file_name().unwrap(), "Transactions_2024.csv");
    }

    #[test]
    fn missing_transaction_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("orders.json"), "[]").unwrap();
        assert!(matches!(
            find_transaction_file(dir.path()),
            Err(ImportError::MissingTransactionFile { .. })
        ));
        assert!(matches!(
            find_transaction_file(&dir.path().join("absent")),
            Err(ImportError::MissingTransactionFile { .. })
        ));
    }
}
