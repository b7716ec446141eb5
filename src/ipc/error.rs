use serde_json::json;

use crate::error::StoreError;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

pub fn store_err(id: &str, e: &StoreError) -> serde_json::Value {
    let code = match e {
        StoreError::NotFound { .. } => "not_found",
        StoreError::InUse { .. } => "in_use",
        StoreError::Sqlite(_) | StoreError::Serialization(_) | StoreError::Corrupt { .. } => {
            "db_query_failed"
        }
    };
    err(id, code, e.to_string(), None)
}
