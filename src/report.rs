use serde::Serialize;

/// A recoverable problem found while importing. The offending cell or row was skipped.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Warning {
    pub code: &'static str,
    pub sheet: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub message: String,
}

impl Warning {
    pub fn new(code: &'static str, sheet: &str, message: impl Into<String>) -> Self {
        Self {
            code,
            sheet: sheet.to_string(),
            row: None,
            column: None,
            value: None,
            message: message.into(),
        }
    }

    /// `idx` is the zero-based data row; the reported number is the spreadsheet row
    /// (header is row 1).
    pub fn at_row(mut self, idx: usize) -> Self {
        self.row = Some(idx + 2);
        self
    }

    pub fn in_column(mut self, column: &str) -> Self {
        self.column = Some(column.to_string());
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

/// What happened to one of the optional sheets (intelligence, IQ).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetDiagnostic {
    pub found: bool,
    pub detected_sheet: Option<String>,
    pub available_sheets: Vec<String>,
    pub required_columns: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub types_found: Option<Vec<String>>,
    pub valid_records: usize,
    pub dropped_records: usize,
    pub students_with_data: usize,
    pub error_message: Option<String>,
}

impl SheetDiagnostic {
    pub fn not_found(kind: &str, available: &[String]) -> Self {
        Self {
            available_sheets: available.to_vec(),
            error_message: Some(format!(
                "{} sheet not found; available sheets: {}",
                kind,
                available.join(", ")
            )),
            ..Self::default()
        }
    }

    pub fn found(sheet: &str, available: &[String]) -> Self {
        Self {
            found: true,
            detected_sheet: Some(sheet.to_string()),
            available_sheets: available.to_vec(),
            ..Self::default()
        }
    }

    pub fn is_usable(&self) -> bool {
        self.found && self.required_columns && self.error_message.is_none()
    }
}

/// Result of one committed ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestSummary {
    pub run_id: String,
    pub update_existing: bool,
    pub grades_sheet: String,
    pub rows_processed: usize,
    pub students_created: usize,
    pub students_updated: usize,
    pub students_skipped: usize,
    pub competency_columns: usize,
    pub competencies_provisioned: usize,
    pub courses_provisioned: usize,
    pub grades_inserted: usize,
    pub grade_cells_rejected: usize,
    pub iq_values_applied: usize,
    pub intelligence_rows_inserted: usize,
    pub intelligence: SheetDiagnostic,
    pub iq: SheetDiagnostic,
    pub warnings: Vec<Warning>,
}
