use crate::calc::{age_on, year_level_from_age, Gender};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{optional_str, require_db, require_row, required_str};
use crate::ipc::types::{AppState, Request};
use crate::store::now_timestamp;
use chrono::NaiveDate;
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

fn enroll(conn: &Connection, class_id: &str, student_id: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT OR IGNORE INTO class_students(class_id, student_id, enrolled_at)
         VALUES(?, ?, ?)",
        (class_id, student_id, now_timestamp()),
    )
}

/// Students enrolled in a class, with their age as of today.
pub fn enrolled_students(
    conn: &Connection,
    class_id: &str,
) -> rusqlite::Result<Vec<serde_json::Value>> {
    let today = chrono::Local::now().date_naive();
    let mut stmt = conn.prepare(
        "SELECT s.id, s.name, s.date_of_birth, s.gender, s.year_level
         FROM class_students cs
         JOIN students s ON s.id = cs.student_id
         WHERE cs.class_id = ?
         ORDER BY s.name",
    )?;
    let rows = stmt
        .query_map([class_id], |row| {
            let dob: String = row.get(2)?;
            let age = NaiveDate::parse_from_str(&dob, "%Y-%m-%d")
                .ok()
                .map(|d| age_on(d, today));
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "name": row.get::<_, String>(1)?,
                "dateOfBirth": dob,
                "gender": row.get::<_, String>(3)?,
                "yearLevel": row.get::<_, String>(4)?,
                "ageYears": age,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state.db.as_ref(), req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let dob_raw = match required_str(req, "dateOfBirth") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Ok(dob) = NaiveDate::parse_from_str(&dob_raw, "%Y-%m-%d") else {
        return err(
            &req.id,
            "bad_params",
            "dateOfBirth must be YYYY-MM-DD",
            Some(json!({ "dateOfBirth": dob_raw })),
        );
    };
    let gender_raw = match required_str(req, "gender") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(gender) = Gender::parse(&gender_raw) else {
        return err(
            &req.id,
            "bad_params",
            "gender must be one of: MALE, FEMALE, OTHER",
            Some(json!({ "gender": gender_raw })),
        );
    };
    let year_level = optional_str(req, "yearLevel")
        .unwrap_or_else(|| year_level_from_age(age_on(dob, chrono::Local::now().date_naive())));
    let class_id = optional_str(req, "classId");
    if let Some(cid) = class_id.as_deref() {
        if let Err(resp) = require_row(conn, req, "classes", cid, "class") {
            return resp;
        }
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    let student_id = Uuid::new_v4().to_string();
    let now = now_timestamp();
    if let Err(e) = tx.execute(
        "INSERT INTO students(id, name, date_of_birth, gender, year_level, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            student_id,
            name,
            dob.format("%Y-%m-%d").to_string(),
            gender.as_str(),
            year_level,
            now,
            now
        ],
    ) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        );
    }
    if let Some(cid) = class_id.as_deref() {
        if let Err(e) = enroll(&tx, cid, &student_id) {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_insert_failed",
                e.to_string(),
                Some(json!({ "table": "class_students" })),
            );
        }
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(
        &req.id,
        json!({
            "studentId": student_id,
            "name": name,
            "gender": gender.as_str(),
            "yearLevel": year_level,
            "classId": class_id,
        }),
    )
}

fn handle_students_enroll(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state.db.as_ref(), req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if let Err(resp) = require_row(conn, req, "classes", &class_id, "class") {
        return resp;
    }
    if let Err(resp) = require_row(conn, req, "students", &student_id, "student") {
        return resp;
    }

    match enroll(conn, &class_id, &student_id) {
        Ok(n) => ok(&req.id, json!({ "enrolled": n > 0 })),
        Err(e) => err(&req.id, "db_insert_failed", e.to_string(), None),
    }
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state.db.as_ref(), req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let class_id = match required_str(req, "classId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let rows = enrolled_students(conn, &class_id);

    match rows {
        Ok(students) => ok(&req.id, json!({ "students": students })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.create" => Some(handle_students_create(state, req)),
        "students.enroll" => Some(handle_students_enroll(state, req)),
        "students.list" => Some(handle_students_list(state, req)),
        _ => None,
    }
}
