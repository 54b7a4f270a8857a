use crate::config::IngestConfig;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Map, Value};
use tracing::info;

const MAX_NAME_LEN: usize = 128;
const MAX_KEYWORDS: usize = 32;

#[derive(Clone, Copy)]
enum SetupSection {
    Ingest,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "ingest" => Some(Self::Ingest),
            _ => None,
        }
    }
}

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.is_empty() {
        return Err(format!("{} must not be empty", key));
    }
    if s.len() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    Ok(s.to_string())
}

fn parse_keywords(v: &Value, key: &str) -> Result<Vec<String>, String> {
    let items = v
        .as_array()
        .ok_or_else(|| format!("{} must be an array of strings", key))?;
    if items.is_empty() || items.len() > MAX_KEYWORDS {
        return Err(format!("{} must hold 1..={} keywords", key, MAX_KEYWORDS));
    }
    items
        .iter()
        .map(|item| parse_string_max(item, key, MAX_NAME_LEN).map(|s| s.to_lowercase()))
        .collect()
}

fn merge_ingest_patch(cfg: &mut IngestConfig, patch: &Map<String, Value>) -> Result<(), String> {
    for (k, v) in patch {
        match k.as_str() {
            "gradesSheet" => cfg.grades_sheet = parse_string_max(v, k, MAX_NAME_LEN)?,
            "nameColumn" => cfg.name_column = parse_string_max(v, k, MAX_NAME_LEN)?,
            "groupColumn" => cfg.group_column = parse_string_max(v, k, MAX_NAME_LEN)?,
            "recommendationColumn" => {
                cfg.recommendation_column = parse_string_max(v, k, MAX_NAME_LEN)?
            }
            "iqColumn" => cfg.iq_column = parse_string_max(v, k, MAX_NAME_LEN)?,
            "intelligenceKeywords" => cfg.intelligence_keywords = parse_keywords(v, k)?,
            "iqKeywords" => cfg.iq_keywords = parse_keywords(v, k)?,
            "maxFileBytes" => {
                let n = v
                    .as_u64()
                    .ok_or_else(|| format!("{} must be a positive integer", k))?;
                if n == 0 {
                    return Err(format!("{} must be a positive integer", k));
                }
                cfg.max_file_bytes = n;
            }
            _ => return Err(format!("unknown ingest field: {}", k)),
        }
    }
    cfg.validate()
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    if let Some(section) = req.params.get("section").and_then(|v| v.as_str()) {
        if SetupSection::parse(section).is_none() {
            return err(&req.id, "bad_params", "unknown section", None);
        }
    }
    match IngestConfig::load(conn) {
        Ok(cfg) => ok(&req.id, json!({ "ingest": cfg })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(SetupSection::Ingest) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut cfg = match IngestConfig::load(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_ingest_patch(&mut cfg, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = cfg.save(conn) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    info!(fields = patch_obj.len(), "ingest settings updated");
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
