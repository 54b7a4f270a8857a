use crate::config::IngestConfig;
use crate::error::{IngestError, IngestResult};
use crate::grades::{normalize_grade, GradeCell};
use crate::intelligence::{extract_iq, reshape_intelligence, IntelligenceRecord, IqCell, IqLookup};
use crate::report::{IngestSummary, Warning};
use crate::sheets::locate_sheets;
use crate::taxonomy::{classify_column, ColumnKind, ProvisioningContext};
use crate::workbook::{cell_at, load_workbook, Sheet, Workbook};
use rusqlite::{Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{error, info, warn};
use uuid::Uuid;

const ACCEPTED_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xls"];

/// How rows for students that already exist in the store are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileMode {
    /// Overwrite IQ and notes, replace grades.
    UpdateExisting,
    /// Leave existing students untouched. Their intelligence scores are still replaced when
    /// the intelligence sheet lists them.
    CreateOnly,
}

impl ReconcileMode {
    pub fn from_update_flag(update_existing: bool) -> Self {
        if update_existing {
            ReconcileMode::UpdateExisting
        } else {
            ReconcileMode::CreateOnly
        }
    }
}

/// Identifies the uploaded file an import run came from.
#[derive(Debug, Clone)]
pub struct RunSource {
    pub name: String,
    pub sha256: String,
}

impl RunSource {
    pub fn new(name: impl Into<String>, bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self {
            name: name.into(),
            sha256: format!("{:x}", hasher.finalize()),
        }
    }
}

pub fn validate_upload(path: &Path, cfg: &IngestConfig) -> IngestResult<u64> {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_ascii_lowercase())
        .unwrap_or_default();
    if !ACCEPTED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(IngestError::UnsupportedFile(
            path.to_string_lossy().to_string(),
        ));
    }
    let size = std::fs::metadata(path)
        .map_err(|e| IngestError::WorkbookOpen(e.into()))?
        .len();
    if size > cfg.max_file_bytes {
        return Err(IngestError::FileTooLarge {
            size,
            max: cfg.max_file_bytes,
        });
    }
    Ok(size)
}

pub fn ingest_file(
    conn: &Connection,
    path: &Path,
    mode: ReconcileMode,
    cfg: &IngestConfig,
) -> IngestResult<IngestSummary> {
    validate_upload(path, cfg)?;
    let bytes = std::fs::read(path).map_err(|e| IngestError::WorkbookOpen(e.into()))?;
    let name = path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let source = RunSource::new(name, &bytes);
    let workbook = load_workbook(path).map_err(IngestError::WorkbookOpen)?;
    ingest_workbook(conn, &workbook, &source, mode, cfg)
}

/// Reconciles a loaded workbook into the store inside one transaction. On any error nothing
/// from this run is persisted.
pub fn ingest_workbook(
    conn: &Connection,
    workbook: &Workbook,
    source: &RunSource,
    mode: ReconcileMode,
    cfg: &IngestConfig,
) -> IngestResult<IngestSummary> {
    let started_at = chrono::Utc::now().to_rfc3339();
    info!(source = %source.name, ?mode, "ingestion started");

    let available = workbook.sheet_names();
    let layout = locate_sheets(&available, cfg)?;
    let grades = workbook
        .sheet(&layout.grades)
        .ok_or_else(|| IngestError::NoGradesSheet {
            expected: cfg.grades_sheet.clone(),
            available: available.clone(),
        })?;
    if !grades.has_column(&cfg.name_column) {
        return Err(IngestError::MissingColumn {
            sheet: grades.name.clone(),
            column: cfg.name_column.clone(),
        });
    }

    let reshaped = reshape_intelligence(
        layout.intelligence.as_deref().and_then(|n| workbook.sheet(n)),
        &available,
        cfg,
    );
    let iq = extract_iq(
        layout.iq.as_deref().and_then(|n| workbook.sheet(n)),
        &available,
        cfg,
    );

    let mut summary = IngestSummary {
        run_id: Uuid::new_v4().to_string(),
        update_existing: mode == ReconcileMode::UpdateExisting,
        grades_sheet: grades.name.clone(),
        intelligence: reshaped.diagnostic.clone(),
        iq: iq.diagnostic.clone(),
        warnings: reshaped.warnings.clone(),
        ..IngestSummary::default()
    };

    let tx = conn.unchecked_transaction()?;
    let result = apply_grades(&tx, grades, &iq, mode, cfg, &mut summary).and_then(|name_to_id| {
        if summary.intelligence.is_usable() {
            apply_intelligence(&tx, &reshaped.records, &name_to_id, &mut summary)?;
        }
        record_run(&tx, source, &started_at, &summary)
    });

    match result {
        Ok(()) => {
            tx.commit()?;
            info!(
                run_id = %summary.run_id,
                created = summary.students_created,
                updated = summary.students_updated,
                skipped = summary.students_skipped,
                warnings = summary.warnings.len(),
                "ingestion committed"
            );
            Ok(summary)
        }
        Err(e) => {
            let _ = tx.rollback();
            error!(source = %source.name, error = %e, "ingestion rolled back");
            Err(e)
        }
    }
}

/// Walks the grades sheet row by row. Returns the name -> student id map, which includes
/// existing students skipped under create-only mode.
fn apply_grades(
    conn: &Connection,
    grades: &Sheet,
    iq: &IqLookup,
    mode: ReconcileMode,
    cfg: &IngestConfig,
    summary: &mut IngestSummary,
) -> IngestResult<HashMap<String, String>> {
    let mut ctx = ProvisioningContext::seed(conn)?;

    let mut columns: Vec<(usize, String, String)> = Vec::new();
    for (idx, header) in grades.headers.iter().enumerate() {
        if let ColumnKind::Competency(col) = classify_column(header, cfg) {
            let competency_id = ctx.ensure(conn, &col)?;
            columns.push((idx, col.code, competency_id));
        }
    }
    summary.competency_columns = columns.len();
    summary.courses_provisioned = ctx.courses_created;
    summary.competencies_provisioned = ctx.competencies_created;

    let name_idx = grades.column_index(&cfg.name_column).unwrap_or_default();
    let recommendation_idx = grades.column_index(&cfg.recommendation_column);
    let now = chrono::Utc::now().to_rfc3339();

    let mut name_to_id: HashMap<String, String> = HashMap::new();
    let mut created_this_run: HashSet<String> = HashSet::new();

    for (row_idx, row) in grades.rows.iter().enumerate() {
        let Some(name) = cell_at(row, name_idx).as_text() else {
            if row.iter().any(|c| !c.is_blank()) {
                summary.warnings.push(
                    Warning::new("blank_student_name", &grades.name, "row has no student name")
                        .at_row(row_idx),
                );
            }
            continue;
        };

        let first_sighting = !name_to_id.contains_key(&name);
        if !first_sighting {
            summary.warnings.push(
                Warning::new(
                    "duplicate_student_row",
                    &grades.name,
                    "student appears more than once in the grades sheet",
                )
                .at_row(row_idx)
                .with_value(name.clone()),
            );
        }

        let existing: Option<String> = conn
            .query_row("SELECT id FROM students WHERE name = ?", [&name], |r| {
                r.get(0)
            })
            .optional()?;

        let (student_id, is_existing) = match existing {
            Some(id) if mode == ReconcileMode::CreateOnly && !created_this_run.contains(&name) => {
                name_to_id.insert(name, id);
                if first_sighting {
                    summary.students_skipped += 1;
                }
                continue;
            }
            Some(id) => {
                if first_sighting {
                    summary.students_updated += 1;
                }
                (id, true)
            }
            None => {
                let id = Uuid::new_v4().to_string();
                conn.execute(
                    "INSERT INTO students(id, name, created_at, updated_at) VALUES(?, ?, ?, ?)",
                    (&id, &name, &now, &now),
                )?;
                created_this_run.insert(name.clone());
                summary.students_created += 1;
                (id, false)
            }
        };
        name_to_id.insert(name.clone(), student_id.clone());

        match iq.get(&name) {
            Some(IqCell::Value(v)) => {
                conn.execute(
                    "UPDATE students SET iq = ? WHERE id = ?",
                    (v, &student_id),
                )?;
                summary.iq_values_applied += 1;
            }
            Some(IqCell::Invalid(raw)) => {
                let sheet = summary.iq.detected_sheet.clone().unwrap_or_default();
                summary.warnings.push(
                    Warning::new("invalid_iq", &sheet, "IQ value is not numeric; left unchanged")
                        .in_column(&cfg.iq_column)
                        .with_value(format!("{}: {}", name, raw)),
                );
            }
            Some(IqCell::Missing) | None => {}
        }

        if let Some(idx) = recommendation_idx {
            let note = cell_at(row, idx).as_text().unwrap_or_default();
            conn.execute(
                "UPDATE students SET basic_recommendation = ? WHERE id = ?",
                (&note, &student_id),
            )?;
        }
        conn.execute(
            "UPDATE students SET updated_at = ? WHERE id = ?",
            (&now, &student_id),
        )?;

        if is_existing {
            conn.execute(
                "DELETE FROM student_competency_grades WHERE student_id = ?",
                [&student_id],
            )?;
        }

        for (col_idx, code, competency_id) in &columns {
            match normalize_grade(cell_at(row, *col_idx)) {
                GradeCell::Grade(g) => {
                    conn.execute(
                        "INSERT INTO student_competency_grades(id, student_id, competency_id, grade)
                         VALUES(?, ?, ?, ?)
                         ON CONFLICT(student_id, competency_id) DO UPDATE SET
                           grade = excluded.grade",
                        (
                            Uuid::new_v4().to_string(),
                            &student_id,
                            competency_id,
                            g.as_str(),
                        ),
                    )?;
                    summary.grades_inserted += 1;
                }
                GradeCell::Blank => {}
                GradeCell::Rejected(raw) => {
                    summary.grade_cells_rejected += 1;
                    summary.warnings.push(
                        Warning::new("invalid_grade", &grades.name, "grade not recognized; cell skipped")
                            .at_row(row_idx)
                            .in_column(code)
                            .with_value(raw),
                    );
                }
            }
        }
        summary.rows_processed += 1;
    }

    Ok(name_to_id)
}

/// Replaces the stored intelligence scores of every resolved student that appears in
/// `records`. Each student's prior rows are deleted once, before its first new row.
fn apply_intelligence(
    conn: &Connection,
    records: &[IntelligenceRecord],
    name_to_id: &HashMap<String, String>,
    summary: &mut IngestSummary,
) -> IngestResult<()> {
    let sheet = summary.intelligence.detected_sheet.clone().unwrap_or_default();
    let mut purged: HashSet<&str> = HashSet::new();
    let mut unknown: HashSet<&str> = HashSet::new();

    for rec in records {
        let Some(student_id) = name_to_id.get(&rec.name) else {
            if unknown.insert(rec.name.as_str()) {
                warn!(student = %rec.name, "intelligence row for unknown student");
                summary.warnings.push(
                    Warning::new(
                        "intelligence_unknown_student",
                        &sheet,
                        "student is not in the grades sheet; scores skipped",
                    )
                    .with_value(rec.name.clone()),
                );
            }
            continue;
        };
        if purged.insert(student_id.as_str()) {
            conn.execute(
                "DELETE FROM intelligence_scores WHERE student_id = ?",
                [student_id],
            )?;
        }
        conn.execute(
            "INSERT INTO intelligence_scores(id, student_id, intelligence_type, score)
             VALUES(?, ?, ?, ?)",
            (
                Uuid::new_v4().to_string(),
                student_id,
                &rec.intelligence_type,
                rec.score,
            ),
        )?;
        summary.intelligence_rows_inserted += 1;
    }
    Ok(())
}

fn record_run(
    conn: &Connection,
    source: &RunSource,
    started_at: &str,
    summary: &IngestSummary,
) -> IngestResult<()> {
    let summary_json = serde_json::to_string(summary)?;
    conn.execute(
        "INSERT INTO import_runs(id, started_at, source_name, source_sha256, update_existing, summary_json)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &summary.run_id,
            started_at,
            &source.name,
            &source.sha256,
            if summary.update_existing { 1 } else { 0 },
            &summary_json,
        ),
    )?;
    Ok(())
}
