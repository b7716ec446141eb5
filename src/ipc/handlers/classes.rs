use crate::ipc::error::{err, ok};
use crate::ipc::handlers::students::enrolled_students;
use crate::ipc::helpers::{optional_str, require_db, require_row, required_str};
use crate::ipc::types::{AppState, Request};
use crate::store::now_timestamp;
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn handle_classes_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "classes": [] }));
    };

    // Correlated subqueries avoid double-counting from joins.
    let mut stmt = match conn.prepare(
        "SELECT
           c.id,
           c.name,
           c.year_level,
           c.year,
           c.term,
           (SELECT COUNT(*) FROM class_students cs WHERE cs.class_id = c.id) AS student_count,
           (SELECT COUNT(*) FROM assessment_records r WHERE r.class_id = c.id) AS record_count
         FROM classes c
         ORDER BY c.year DESC, c.name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let year_level: String = row.get(2)?;
            let year: i64 = row.get(3)?;
            let term: Option<String> = row.get(4)?;
            let student_count: i64 = row.get(5)?;
            let record_count: i64 = row.get(6)?;
            Ok(json!({
                "id": id,
                "name": name,
                "yearLevel": year_level,
                "year": year,
                "term": term,
                "studentCount": student_count,
                "assessmentCount": record_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(classes) => ok(&req.id, json!({ "classes": classes })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_classes_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state.db.as_ref(), req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let year_level = match required_str(req, "yearLevel") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(year) = req.params.get("year").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing year", None);
    };
    let term = optional_str(req, "term");

    let class_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO classes(id, name, year_level, year, term, created_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        rusqlite::params![class_id, name, year_level, year, term, now_timestamp()],
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "classes" })),
        );
    }

    ok(
        &req.id,
        json!({ "classId": class_id, "name": name, "yearLevel": year_level, "year": year, "term": term }),
    )
}

fn handle_classes_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state.db.as_ref(), req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let class = match conn
        .query_row(
            "SELECT id, name, year_level, year, term FROM classes WHERE id = ?",
            [&class_id],
            |row| {
                Ok(json!({
                    "id": row.get::<_, String>(0)?,
                    "name": row.get::<_, String>(1)?,
                    "yearLevel": row.get::<_, String>(2)?,
                    "year": row.get::<_, i64>(3)?,
                    "term": row.get::<_, Option<String>>(4)?,
                }))
            },
        )
        .optional()
    {
        Ok(Some(v)) => v,
        Ok(None) => return err(&req.id, "not_found", "class not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = enrolled_students(conn, &class_id);

    match rows {
        Ok(students) => ok(&req.id, json!({ "class": class, "students": students })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_classes_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state.db.as_ref(), req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if let Err(resp) = require_row(conn, req, "classes", &class_id, "class") {
        return resp;
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    // Dependency order; no ON DELETE CASCADE.
    for (table, sql) in [
        (
            "assessment_records",
            "DELETE FROM assessment_records WHERE class_id = ?",
        ),
        (
            "class_students",
            "DELETE FROM class_students WHERE class_id = ?",
        ),
        ("classes", "DELETE FROM classes WHERE id = ?"),
    ] {
        if let Err(e) = tx.execute(sql, [&class_id]) {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_delete_failed",
                e.to_string(),
                Some(json!({ "table": table })),
            );
        }
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.list" => Some(handle_classes_list(state, req)),
        "classes.create" => Some(handle_classes_create(state, req)),
        "classes.get" => Some(handle_classes_get(state, req)),
        "classes.delete" => Some(handle_classes_delete(state, req)),
        _ => None,
    }
}
