use crate::db::SqliteStore;
use crate::ipc::error::{err, ok, store_err};
use crate::ipc::helpers::{require_db, required_str};
use crate::ipc::types::{AppState, Request};
use crate::seed::import_skills_file;
use serde_json::json;
use std::path::PathBuf;

fn handle_skills_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state.db.as_ref(), req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let path = match required_str(req, "path") {
        Ok(v) => PathBuf::from(v),
        Err(resp) => return resp,
    };

    match import_skills_file(conn, &path) {
        Ok(outcome) => ok(&req.id, json!(outcome)),
        Err(e) => err(
            &req.id,
            "import_failed",
            format!("{e:#}"),
            Some(json!({ "path": path.to_string_lossy() })),
        ),
    }
}

fn handle_skills_import_runs(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "runs": [] }));
    };
    match SqliteStore::new(conn).list_import_runs() {
        Ok(runs) => ok(&req.id, json!({ "runs": runs })),
        Err(e) => store_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "skills.import" => Some(handle_skills_import(state, req)),
        "skills.importRuns" => Some(handle_skills_import_runs(state, req)),
        _ => None,
    }
}
