use serde_json::{json, Value};
use thiserror::Error;

/// Failures that abort an ingestion run. Every variant implies the run's transaction was
/// rolled back.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("unsupported file extension: {0}")]
    UnsupportedFile(String),

    #[error("file is too large: {size} bytes (max {max})")]
    FileTooLarge { size: u64, max: u64 },

    #[error("failed to open workbook: {0:#}")]
    WorkbookOpen(anyhow::Error),

    #[error("required sheet '{expected}' not found")]
    NoGradesSheet {
        expected: String,
        available: Vec<String>,
    },

    #[error("sheet '{sheet}' is missing required column '{column}'")]
    MissingColumn { sheet: String, column: String },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("failed to record import run: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl IngestError {
    pub fn code(&self) -> &'static str {
        match self {
            IngestError::UnsupportedFile(_) => "unsupported_file",
            IngestError::FileTooLarge { .. } => "file_too_large",
            IngestError::WorkbookOpen(_) => "workbook_open_failed",
            IngestError::NoGradesSheet { .. } => "no_grades_sheet",
            IngestError::MissingColumn { .. } => "missing_column",
            IngestError::Database(_) | IngestError::Serialize(_) => "db_failed",
        }
    }

    pub fn details(&self) -> Option<Value> {
        match self {
            IngestError::FileTooLarge { size, max } => Some(json!({ "size": size, "max": max })),
            IngestError::NoGradesSheet {
                expected,
                available,
            } => Some(json!({ "expected": expected, "availableSheets": available })),
            IngestError::MissingColumn { sheet, column } => {
                Some(json!({ "sheet": sheet, "column": column }))
            }
            _ => None,
        }
    }
}

pub type IngestResult<T> = std::result::Result<T, IngestError>;
