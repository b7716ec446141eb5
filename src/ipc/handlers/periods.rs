use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{require_db, required_str};
use crate::ipc::types::{AppState, Request};
use crate::store::now_timestamp;
use chrono::NaiveDate;
use serde_json::json;
use uuid::Uuid;

const PERIOD_TYPES: [&str; 4] = ["SEMESTER", "TERM", "YEAR", "QUARTER"];

fn parse_date(req: &Request, key: &str) -> Result<NaiveDate, serde_json::Value> {
    let raw = required_str(req, key)?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|_| {
        err(
            &req.id,
            "bad_params",
            format!("{key} must be YYYY-MM-DD"),
            Some(json!({ key: raw })),
        )
    })
}

fn handle_periods_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state.db.as_ref(), req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let period_type = match required_str(req, "type") {
        Ok(v) => v.to_ascii_uppercase(),
        Err(resp) => return resp,
    };
    if !PERIOD_TYPES.contains(&period_type.as_str()) {
        return err(
            &req.id,
            "bad_params",
            "type must be one of: SEMESTER, TERM, YEAR, QUARTER",
            Some(json!({ "type": period_type })),
        );
    }
    let Some(year) = req.params.get("year").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing year", None);
    };
    let start = match parse_date(req, "startDate") {
        Ok(d) => d,
        Err(resp) => return resp,
    };
    let end = match parse_date(req, "endDate") {
        Ok(d) => d,
        Err(resp) => return resp,
    };
    if end < start {
        return err(
            &req.id,
            "bad_params",
            "endDate must not be before startDate",
            None,
        );
    }

    let period_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO assessment_periods(id, name, period_type, year, start_date, end_date, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            period_id,
            name,
            period_type,
            year,
            start.to_string(),
            end.to_string(),
            now_timestamp()
        ],
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "assessment_periods" })),
        );
    }

    ok(
        &req.id,
        json!({ "periodId": period_id, "name": name, "type": period_type, "year": year }),
    )
}

fn handle_periods_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "periods": [] }));
    };

    let mut stmt = match conn.prepare(
        "SELECT id, name, period_type, year, start_date, end_date
         FROM assessment_periods
         ORDER BY year DESC, start_date",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([], |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "name": row.get::<_, String>(1)?,
                "type": row.get::<_, String>(2)?,
                "year": row.get::<_, i64>(3)?,
                "startDate": row.get::<_, String>(4)?,
                "endDate": row.get::<_, String>(5)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(periods) => ok(&req.id, json!({ "periods": periods })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "periods.create" => Some(handle_periods_create(state, req)),
        "periods.list" => Some(handle_periods_list(state, req)),
        _ => None,
    }
}
