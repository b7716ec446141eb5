use crate::calc::NormativeLevel;
use crate::db::SqliteStore;
use crate::ipc::error::{err, ok, store_err};
use crate::ipc::handlers::students::enrolled_students;
use crate::ipc::helpers::{require_db, require_row, required_str};
use crate::ipc::types::{AppState, Request};
use crate::records::{save_record, SaveRecordInput};
use crate::store::Store;
use serde_json::json;

fn handle_records_save(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state.db.as_ref(), req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let input: SaveRecordInput = match serde_json::from_value(req.params.clone()) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "bad_params", e.to_string(), None),
    };
    if let Err(resp) = require_row(conn, req, "classes", &input.class_id, "class") {
        return resp;
    }
    if let Err(resp) = require_row(
        conn,
        req,
        "assessment_periods",
        &input.assessment_period_id,
        "assessment period",
    ) {
        return resp;
    }

    let today = chrono::Local::now().date_naive();
    let mut store = SqliteStore::new(conn);
    match save_record(&mut store, &input, today) {
        Ok(saved) => ok(
            &req.id,
            json!({
                "record": saved.record,
                "created": saved.created,
                "levelLabel": NormativeLevel::label(saved.record.normative_level),
                "thresholdRuleId": saved.threshold_rule_id,
            }),
        ),
        Err(e) => err(&req.id, e.code(), e.to_string(), None),
    }
}

fn handle_records_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state.db.as_ref(), req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let assessment_id = match required_str(req, "assessmentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let period_id = match required_str(req, "assessmentPeriodId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if let Err(resp) = require_row(conn, req, "classes", &class_id, "class") {
        return resp;
    }

    let students = match enrolled_students(conn, &class_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let store = SqliteStore::new(conn);
    let mut rows = Vec::with_capacity(students.len());
    for student in students {
        let student_id = student
            .get("id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let record = match store.find_assessment_record(&student_id, &assessment_id, &period_id) {
            Ok(r) => r,
            Err(e) => return store_err(&req.id, &e),
        };
        let label = NormativeLevel::label(record.as_ref().and_then(|r| r.normative_level));
        rows.push(json!({
            "student": student,
            "record": record,
            "levelLabel": label,
        }));
    }

    ok(&req.id, json!({ "rows": rows }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "records.save" => Some(handle_records_save(state, req)),
        "records.list" => Some(handle_records_list(state, req)),
        _ => None,
    }
}
