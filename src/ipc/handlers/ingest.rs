use crate::config::IngestConfig;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::reconcile::{ingest_file, ReconcileMode};
use rusqlite::Connection;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::warn;

const DEFAULT_RUNS_LIMIT: i64 = 20;
const MAX_RUNS_LIMIT: i64 = 500;

struct HandlerErr {
    code: &'static str,
    message: String,
    details: Option<serde_json::Value>,
}

impl HandlerErr {
    fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

/// Removes an uploaded temp file once the request is done, whatever the outcome.
struct SourceCleanup {
    path: PathBuf,
}

impl Drop for SourceCleanup {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to delete source file");
        }
    }
}

/// Arms source deletion before anything else can fail, so every exit path removes the upload.
fn source_cleanup(params: &serde_json::Value) -> Option<SourceCleanup> {
    let path = params.get("path").and_then(|v| v.as_str())?;
    let delete = params.get("deleteSource").and_then(|v| v.as_bool()) == Some(true);
    delete.then(|| SourceCleanup {
        path: PathBuf::from(path),
    })
}

fn parse_bool_param(params: &serde_json::Value, key: &str, default: bool) -> Result<bool, HandlerErr> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(default),
        Some(v) => v.as_bool().ok_or_else(|| HandlerErr {
            code: "bad_params",
            message: format!("{} must be boolean", key),
            details: None,
        }),
    }
}

fn ingest_workbook(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let Some(path) = params.get("path").and_then(|v| v.as_str()) else {
        return Err(HandlerErr {
            code: "bad_params",
            message: "missing path".into(),
            details: None,
        });
    };
    let update_existing = parse_bool_param(params, "updateExisting", true)?;
    parse_bool_param(params, "deleteSource", false)?;
    let path = Path::new(path);

    let cfg = IngestConfig::load(conn).map_err(|e| HandlerErr {
        code: "db_query_failed",
        message: e.to_string(),
        details: None,
    })?;
    let summary = ingest_file(conn, path, ReconcileMode::from_update_flag(update_existing), &cfg)
        .map_err(|e| HandlerErr {
            code: e.code(),
            message: e.to_string(),
            details: e.details(),
        })?;
    serde_json::to_value(&summary).map_err(|e| HandlerErr {
        code: "internal",
        message: e.to_string(),
        details: None,
    })
}

fn runs_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let limit = match params.get("limit") {
        None | Some(serde_json::Value::Null) => DEFAULT_RUNS_LIMIT,
        Some(v) => match v.as_i64() {
            Some(n) if (1..=MAX_RUNS_LIMIT).contains(&n) => n,
            _ => {
                return Err(HandlerErr {
                    code: "bad_params",
                    message: format!("limit must be an integer in 1..={}", MAX_RUNS_LIMIT),
                    details: None,
                })
            }
        },
    };

    let db_err = |e: rusqlite::Error| HandlerErr {
        code: "db_query_failed",
        message: e.to_string(),
        details: None,
    };
    let mut stmt = conn
        .prepare(
            "SELECT id, started_at, source_name, source_sha256, update_existing, summary_json
             FROM import_runs
             ORDER BY started_at DESC
             LIMIT ?",
        )
        .map_err(db_err)?;
    let rows = stmt
        .query_map([limit], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, i64>(4)?,
                r.get::<_, String>(5)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err)?;

    let runs: Vec<serde_json::Value> = rows
        .into_iter()
        .map(|(id, started_at, source_name, sha, update_existing, summary)| {
            json!({
                "id": id,
                "startedAt": started_at,
                "sourceName": source_name,
                "sourceSha256": sha,
                "updateExisting": update_existing != 0,
                "summary": serde_json::from_str::<serde_json::Value>(&summary)
                    .unwrap_or(serde_json::Value::Null),
            })
        })
        .collect();
    Ok(json!({ "runs": runs }))
}

fn handle_ingest_workbook(state: &mut AppState, req: &Request) -> serde_json::Value {
    let _cleanup = source_cleanup(&req.params);
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match ingest_workbook(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_runs_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match runs_list(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "ingest.workbook" => Some(handle_ingest_workbook(state, req)),
        "ingest.runs.list" => Some(handle_runs_list(state, req)),
        _ => None,
    }
}
