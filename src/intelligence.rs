use crate::config::IngestConfig;
use crate::report::{SheetDiagnostic, Warning};
use crate::workbook::{cell_at, Cell, Sheet};
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct IntelligenceRecord {
    pub name: String,
    pub intelligence_type: String,
    pub score: f64,
}

#[derive(Debug, Default)]
pub struct Reshaped {
    pub records: Vec<IntelligenceRecord>,
    pub diagnostic: SheetDiagnostic,
    pub warnings: Vec<Warning>,
}

fn is_value_column(header: &str, cfg: &IngestConfig) -> bool {
    let h = header.trim();
    !h.is_empty() && !h.starts_with("Unnamed") && h != cfg.name_column && h != cfg.group_column
}

fn missing_columns(sheet: &Sheet, required: &[&str]) -> Vec<String> {
    required
        .iter()
        .filter(|c| !sheet.has_column(c))
        .map(|c| c.to_string())
        .collect()
}

/// Turns the wide intelligence sheet (one column per intelligence type) into one record per
/// (student, type) with a finite score. Missing or non-numeric scores are dropped.
pub fn reshape_intelligence(
    sheet: Option<&Sheet>,
    available: &[String],
    cfg: &IngestConfig,
) -> Reshaped {
    let Some(sheet) = sheet else {
        warn!(available = ?available, "no intelligence sheet found");
        return Reshaped {
            diagnostic: SheetDiagnostic::not_found("intelligence", available),
            ..Reshaped::default()
        };
    };

    let mut out = Reshaped {
        diagnostic: SheetDiagnostic::found(&sheet.name, available),
        ..Reshaped::default()
    };

    let missing = missing_columns(sheet, &[cfg.name_column.as_str(), cfg.group_column.as_str()]);
    if !missing.is_empty() {
        let msg = format!(
            "sheet '{}' is missing required columns: {}",
            sheet.name,
            missing.join(", ")
        );
        warn!(sheet = %sheet.name, "{}", msg);
        out.diagnostic.error_message = Some(msg);
        return out;
    }
    out.diagnostic.required_columns = true;

    let name_idx = sheet.column_index(&cfg.name_column).unwrap_or_default();
    let value_cols: Vec<(usize, String)> = sheet
        .headers
        .iter()
        .enumerate()
        .filter(|(_, h)| is_value_column(h, cfg))
        .map(|(i, h)| (i, h.trim().to_string()))
        .collect();
    out.diagnostic.types_found = Some(value_cols.iter().map(|(_, h)| h.clone()).collect());

    if value_cols.is_empty() {
        out.diagnostic.error_message = Some(format!(
            "sheet '{}' has no intelligence type columns",
            sheet.name
        ));
        return out;
    }

    let mut students = HashSet::new();
    for (row_idx, row) in sheet.rows.iter().enumerate() {
        let Some(name) = cell_at(row, name_idx).as_text() else {
            if row.iter().any(|c| !c.is_blank()) {
                out.warnings.push(
                    Warning::new("blank_student_name", &sheet.name, "row has no student name")
                        .at_row(row_idx),
                );
            }
            continue;
        };
        for (col_idx, ty) in &value_cols {
            match cell_at(row, *col_idx).as_finite_f64() {
                Some(score) => {
                    out.records.push(IntelligenceRecord {
                        name: name.clone(),
                        intelligence_type: ty.clone(),
                        score,
                    });
                    students.insert(name.clone());
                }
                None => out.diagnostic.dropped_records += 1,
            }
        }
    }

    out.diagnostic.valid_records = out.records.len();
    out.diagnostic.students_with_data = students.len();
    info!(
        sheet = %sheet.name,
        records = out.records.len(),
        dropped = out.diagnostic.dropped_records,
        students = students.len(),
        "intelligence sheet reshaped"
    );
    out
}

#[derive(Debug, Clone, PartialEq)]
pub enum IqCell {
    Value(i64),
    Missing,
    Invalid(String),
}

#[derive(Debug, Default)]
pub struct IqLookup {
    values: HashMap<String, IqCell>,
    pub diagnostic: SheetDiagnostic,
}

impl IqLookup {
    pub fn get(&self, name: &str) -> Option<&IqCell> {
        self.values.get(name)
    }
}

fn parse_iq(cell: &Cell) -> IqCell {
    if cell.is_blank() {
        return IqCell::Missing;
    }
    match cell.as_finite_f64() {
        Some(v) => IqCell::Value(v.trunc() as i64),
        None => IqCell::Invalid(cell.as_text().unwrap_or_default()),
    }
}

/// Reads the IQ sheet into a name -> IQ lookup. The first row for a name wins.
pub fn extract_iq(sheet: Option<&Sheet>, available: &[String], cfg: &IngestConfig) -> IqLookup {
    let Some(sheet) = sheet else {
        warn!(available = ?available, "no IQ sheet found");
        return IqLookup {
            diagnostic: SheetDiagnostic::not_found("IQ", available),
            ..IqLookup::default()
        };
    };

    let mut out = IqLookup {
        diagnostic: SheetDiagnostic::found(&sheet.name, available),
        ..IqLookup::default()
    };

    let missing = missing_columns(sheet, &[cfg.name_column.as_str(), cfg.iq_column.as_str()]);
    if !missing.is_empty() {
        let msg = format!(
            "sheet '{}' is missing required columns: {}",
            sheet.name,
            missing.join(", ")
        );
        warn!(sheet = %sheet.name, "{}", msg);
        out.diagnostic.error_message = Some(msg);
        return out;
    }
    out.diagnostic.required_columns = true;

    let name_idx = sheet.column_index(&cfg.name_column).unwrap_or_default();
    let iq_idx = sheet.column_index(&cfg.iq_column).unwrap_or_default();
    for row in &sheet.rows {
        let Some(name) = cell_at(row, name_idx).as_text() else {
            continue;
        };
        let parsed = parse_iq(cell_at(row, iq_idx));
        match parsed {
            IqCell::Value(_) => out.diagnostic.valid_records += 1,
            _ => out.diagnostic.dropped_records += 1,
        }
        out.values.entry(name).or_insert(parsed);
    }
    out.diagnostic.students_with_data = out
        .values
        .values()
        .filter(|v| matches!(v, IqCell::Value(_)))
        .count();
    info!(
        sheet = %sheet.name,
        valid = out.diagnostic.valid_records,
        students = out.diagnostic.students_with_data,
        "IQ sheet read"
    );
    out
}
