use crate::db::{assessment_from_row, SqliteStore, ASSESSMENT_COLUMNS};
use crate::ipc::error::{err, ok, store_err};
use crate::ipc::helpers::{require_db, required_str};
use crate::ipc::types::{AppState, Request};
use crate::store::Store;
use serde_json::json;
use tracing::info;

fn handle_assessments_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "assessments": [] }));
    };

    let sql = format!(
        "SELECT {ASSESSMENT_COLUMNS} FROM assessments WHERE active = 1 ORDER BY name"
    );
    let mut stmt = match conn.prepare(&sql) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let defs = match stmt
        .query_map([], assessment_from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let store = SqliteStore::new(conn);
    let mut out = Vec::with_capacity(defs.len());
    for def in defs {
        let elements = match store.list_assessment_elements(&def.id) {
            Ok(v) => v,
            Err(e) => return store_err(&req.id, &e),
        };
        let mut v = json!(def);
        v["elements"] = json!(elements);
        out.push(v);
    }

    ok(&req.id, json!({ "assessments": out }))
}

fn handle_assessments_thresholds(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state.db.as_ref(), req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let assessment_id = match required_str(req, "assessmentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let store = SqliteStore::new(conn);
    match store.find_assessment(&assessment_id) {
        Ok(Some(_)) => {}
        Ok(None) => return err(&req.id, "not_found", "assessment not found", None),
        Err(e) => return store_err(&req.id, &e),
    }
    match store.list_threshold_rules(&assessment_id) {
        Ok(rules) => ok(&req.id, json!({ "rules": rules })),
        Err(e) => store_err(&req.id, &e),
    }
}

fn handle_assessments_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state.db.as_ref(), req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let assessment_id = match required_str(req, "assessmentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match SqliteStore::new(conn).delete_assessment(&assessment_id) {
        Ok(()) => {
            info!(assessment = %assessment_id, "assessment deleted");
            ok(&req.id, json!({ "ok": true }))
        }
        Err(e) => store_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "assessments.list" => Some(handle_assessments_list(state, req)),
        "assessments.thresholds" => Some(handle_assessments_thresholds(state, req)),
        "assessments.delete" => Some(handle_assessments_delete(state, req)),
        _ => None,
    }
}
