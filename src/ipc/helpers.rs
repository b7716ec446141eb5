use rusqlite::{Connection, OptionalExtension};

use crate::ipc::error::err;
use crate::ipc::types::Request;

/// Required, trimmed, non-empty string param. The `Err` side is a ready
/// response.
pub fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    match req.params.get(key).and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        Some(_) => Err(err(
            &req.id,
            "bad_params",
            format!("{key} must not be empty"),
            None,
        )),
        None => Err(err(&req.id, "bad_params", format!("missing {key}"), None)),
    }
}

pub fn optional_str(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn require_db<'a>(
    db: Option<&'a Connection>,
    req: &Request,
) -> Result<&'a Connection, serde_json::Value> {
    db.ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

/// `Err` is a ready response: `not_found` or `db_query_failed`.
pub fn require_row(
    conn: &Connection,
    req: &Request,
    table: &str,
    id: &str,
    label: &str,
) -> Result<(), serde_json::Value> {
    let sql = format!("SELECT 1 FROM {table} WHERE id = ?");
    let exists: Option<i64> = conn
        .query_row(&sql, [id], |r| r.get(0))
        .optional()
        .map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))?;
    match exists {
        Some(_) => Ok(()),
        None => Err(err(&req.id, "not_found", format!("{label} not found"), None)),
    }
}
