use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Row {row}: {value:?} is not a valid amount")]
    InvalidAmount { row: String, value: String },
    #[error("Row {row}: {value:?} is not a valid date")]
    InvalidDate { row: String, value: String },
    #[error("No file containing {keyword:?} in its name found in {}", dir.display())]
    MissingTransactionFile { dir: PathBuf, keyword: String },
}
