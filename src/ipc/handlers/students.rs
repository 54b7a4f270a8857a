use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::profiles::{self, ClusterAssignment};
use rusqlite::Connection;
use serde_json::json;
use tracing::info;

struct HandlerErr {
    code: &'static str,
    message: String,
    details: Option<serde_json::Value>,
}

impl HandlerErr {
    fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }

    fn bad_params(message: impl Into<String>) -> Self {
        Self {
            code: "bad_params",
            message: message.into(),
            details: None,
        }
    }
}

fn db_query_failed(e: rusqlite::Error) -> HandlerErr {
    HandlerErr {
        code: "db_query_failed",
        message: e.to_string(),
        details: None,
    }
}

fn students_list(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let students = profiles::list_students(conn).map_err(db_query_failed)?;
    Ok(json!({ "students": students }))
}

fn students_get(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let Some(student_id) = params.get("studentId").and_then(|v| v.as_str()) else {
        return Err(HandlerErr::bad_params("missing studentId"));
    };
    match profiles::get_student(conn, student_id).map_err(db_query_failed)? {
        Some(student) => Ok(json!({ "student": student })),
        None => Err(HandlerErr {
            code: "not_found",
            message: "student not found".into(),
            details: Some(json!({ "studentId": student_id })),
        }),
    }
}

fn parse_label(entry: &serde_json::Value, key: &str, index: usize) -> Result<Option<i64>, HandlerErr> {
    match entry.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("assignments[{}].{} must be integer", index, key))),
    }
}

fn parse_assignments(params: &serde_json::Value) -> Result<Vec<ClusterAssignment>, HandlerErr> {
    let Some(items) = params.get("assignments").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("assignments must be an array"));
    };
    let mut out = Vec::with_capacity(items.len());
    for (i, entry) in items.iter().enumerate() {
        let Some(student_id) = entry.get("studentId").and_then(|v| v.as_str()) else {
            return Err(HandlerErr::bad_params(format!("assignments[{}].studentId missing", i)));
        };
        out.push(ClusterAssignment {
            student_id: student_id.to_string(),
            kmeans: parse_label(entry, "kmeans", i)?,
            dbscan: parse_label(entry, "dbscan", i)?,
        });
    }
    Ok(out)
}

fn students_assign_clusters(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let assignments = parse_assignments(params)?;
    match profiles::assign_clusters(conn, &assignments).map_err(|e| HandlerErr {
        code: "db_update_failed",
        message: e.to_string(),
        details: None,
    })? {
        Ok(updated) => {
            info!(updated, "cluster labels written");
            Ok(json!({ "updated": updated }))
        }
        Err(student_id) => Err(HandlerErr {
            code: "not_found",
            message: "student not found".into(),
            details: Some(json!({ "studentId": student_id })),
        }),
    }
}

fn students_refresh_aggregates(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let updated = profiles::refresh_aggregates(conn).map_err(|e| HandlerErr {
        code: "db_update_failed",
        message: e.to_string(),
        details: None,
    })?;
    info!(updated, "student aggregates refreshed");
    Ok(json!({ "updated": updated }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "students.list" | "students.get" | "students.refreshAggregates" | "students.assignClusters" => {
            let Some(conn) = state.db.as_ref() else {
                return Some(err(&req.id, "no_workspace", "select a workspace first", None));
            };
            match req.method.as_str() {
                "students.list" => students_list(conn),
                "students.get" => students_get(conn, &req.params),
                "students.refreshAggregates" => students_refresh_aggregates(conn),
                _ => students_assign_clusters(conn, &req.params),
            }
        }
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
