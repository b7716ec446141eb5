use chrono::Datelike;
use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn fixture_path(rel: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(rel)
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_scorecardd");
    let mut child = Command::new(exe)
        .env_remove("SCORECARD_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn scorecardd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({ "id": method, "method": method, "params": params });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    serde_json::from_str(line.trim()).expect("parse response json")
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let resp = request(stdin, reader, method, params);
    assert_eq!(
        resp.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        resp
    );
    resp.get("result").cloned().unwrap_or(json!({}))
}

/// A date of birth on 1 January gives a fixed age whatever today is.
fn dob_for_age(age: i32) -> String {
    let year = chrono::Local::now().date_naive().year() - age;
    format!("{year:04}-01-01")
}

struct Setup {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    workspace: PathBuf,
    class_id: String,
    period_id: String,
    catch_id: String,
    asts_id: String,
}

fn setup(prefix: &str) -> Setup {
    let workspace = temp_dir(prefix);
    let (child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "skills.import",
        json!({ "path": fixture_path("fixtures/skills.json").to_string_lossy() }),
    );
    let class_id = request_ok(
        &mut stdin,
        &mut reader,
        "classes.create",
        json!({ "name": "3B", "yearLevel": "Year 3", "year": 2026 }),
    )["classId"]
        .as_str()
        .expect("classId")
        .to_string();
    let period_id = request_ok(
        &mut stdin,
        &mut reader,
        "periods.create",
        json!({
            "name": "Term 1", "type": "TERM", "year": 2026,
            "startDate": "2026-01-27", "endDate": "2026-04-02"
        }),
    )["periodId"]
        .as_str()
        .expect("periodId")
        .to_string();

    let list = request_ok(&mut stdin, &mut reader, "assessments.list", json!({}));
    let id_of = |name: &str| {
        list["assessments"]
            .as_array()
            .expect("assessments")
            .iter()
            .find(|a| a["name"] == json!(name))
            .and_then(|a| a["id"].as_str())
            .expect("assessment id")
            .to_string()
    };
    let catch_id = id_of("Catch");
    let asts_id = id_of("Animal Shape Timed Sequence");

    Setup {
        child,
        stdin,
        reader,
        workspace,
        class_id,
        period_id,
        catch_id,
        asts_id,
    }
}

fn create_student(s: &mut Setup, name: &str, age: i32, gender: &str) -> String {
    let class_id = s.class_id.clone();
    request_ok(
        &mut s.stdin,
        &mut s.reader,
        "students.create",
        json!({
            "name": name,
            "dateOfBirth": dob_for_age(age),
            "gender": gender,
            "yearLevel": "Year 3",
            "classId": class_id,
        }),
    )["studentId"]
        .as_str()
        .expect("studentId")
        .to_string()
}

fn teardown(mut s: Setup) {
    let _ = s.child.kill();
    let _ = s.child.wait();
    let _ = std::fs::remove_dir_all(s.workspace);
}

#[test]
fn component_record_is_classified_and_resave_bumps_version() {
    let mut s = setup("scorecard-records-component");
    let student_id = create_student(&mut s, "Ava", 8, "FEMALE");
    let catch = s.catch_id.clone();

    let first = request_ok(
        &mut s.stdin,
        &mut s.reader,
        "records.save",
        json!({
            "studentId": student_id,
            "classId": s.class_id,
            "assessmentId": catch,
            "assessmentPeriodId": s.period_id,
            "elementScores": {
                format!("{catch}_comp_0"): true,
                format!("{catch}_comp_1"): true,
                format!("{catch}_comp_2"): false,
            },
        }),
    );
    assert_eq!(first["created"], json!(true));
    assert_eq!(first["record"]["totalScore"], json!(2.0));
    assert_eq!(first["record"]["normativeLevel"], json!("achieving"));
    assert_eq!(first["levelLabel"], json!("Achieving"));
    assert_eq!(first["record"]["version"], json!(1));
    assert_eq!(first["record"]["syncStatus"], json!("pending"));
    assert_eq!(first["record"]["serverVersion"], json!(0));
    assert_eq!(first["record"]["conflictDetected"], json!(false));
    assert!(first["thresholdRuleId"].is_string());

    let second = request_ok(
        &mut s.stdin,
        &mut s.reader,
        "records.save",
        json!({
            "studentId": student_id,
            "classId": s.class_id,
            "assessmentId": catch,
            "assessmentPeriodId": s.period_id,
            "elementScores": {
                format!("{catch}_comp_0"): true,
                format!("{catch}_comp_1"): true,
                format!("{catch}_comp_2"): true,
            },
            "notes": "clean catch",
        }),
    );
    assert_eq!(second["created"], json!(false));
    assert_eq!(second["record"]["id"], first["record"]["id"]);
    assert_eq!(second["record"]["version"], json!(2));
    assert_eq!(second["record"]["normativeLevel"], json!("excelling"));
    assert_eq!(second["record"]["notes"], json!("clean catch"));

    let rows = request_ok(
        &mut s.stdin,
        &mut s.reader,
        "records.list",
        json!({
            "classId": s.class_id,
            "assessmentId": catch,
            "assessmentPeriodId": s.period_id,
        }),
    );
    let rows = rows["rows"].as_array().expect("rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["record"]["version"], json!(2));
    assert_eq!(rows[0]["levelLabel"], json!("Excelling"));

    teardown(s);
}

#[test]
fn missing_threshold_saves_unclassified_record() {
    let mut s = setup("scorecard-records-unclassified");
    let student_id = create_student(&mut s, "Noah", 12, "MALE");
    let catch = s.catch_id.clone();

    let saved = request_ok(
        &mut s.stdin,
        &mut s.reader,
        "records.save",
        json!({
            "studentId": student_id,
            "classId": s.class_id,
            "assessmentId": catch,
            "assessmentPeriodId": s.period_id,
            "elementScores": { format!("{catch}_comp_0"): true },
        }),
    );
    assert_eq!(saved["record"]["totalScore"], json!(1.0));
    assert!(saved["record"]["normativeLevel"].is_null());
    assert!(saved["thresholdRuleId"].is_null());
    assert_eq!(saved["levelLabel"], json!("Not Assessed"));

    // Enrolled but not yet assessed.
    let other = create_student(&mut s, "Zoe", 8, "FEMALE");
    let rows = request_ok(
        &mut s.stdin,
        &mut s.reader,
        "records.list",
        json!({
            "classId": s.class_id,
            "assessmentId": catch,
            "assessmentPeriodId": s.period_id,
        }),
    );
    let rows = rows["rows"].as_array().expect("rows");
    assert_eq!(rows.len(), 2);
    let zoe = rows
        .iter()
        .find(|r| r["student"]["id"] == json!(other))
        .expect("zoe row");
    assert!(zoe["record"].is_null());
    assert_eq!(zoe["levelLabel"], json!("Not Assessed"));

    teardown(s);
}

#[test]
fn time_record_uses_gendered_reference_time() {
    let mut s = setup("scorecard-records-time");
    let girl = create_student(&mut s, "Ava", 8, "FEMALE");
    let other = create_student(&mut s, "Sam", 8, "OTHER");
    let asts = s.asts_id.clone();

    let saved = request_ok(
        &mut s.stdin,
        &mut s.reader,
        "records.save",
        json!({
            "studentId": girl,
            "classId": s.class_id,
            "assessmentId": asts,
            "assessmentPeriodId": s.period_id,
            "timeSeconds": 29.0,
        }),
    );
    assert_eq!(saved["record"]["totalScore"], json!(100.0));
    assert_eq!(saved["record"]["normativeLevel"], json!("achieving"));

    // Only gendered rules exist for the timed skill.
    let unmatched = request_ok(
        &mut s.stdin,
        &mut s.reader,
        "records.save",
        json!({
            "studentId": other,
            "classId": s.class_id,
            "assessmentId": asts,
            "assessmentPeriodId": s.period_id,
            "timeSeconds": 29.0,
        }),
    );
    assert!(unmatched["record"]["totalScore"].is_null());
    assert!(unmatched["record"]["normativeLevel"].is_null());
    assert_eq!(unmatched["record"]["timeSeconds"], json!(29.0));
    assert_eq!(saved["record"]["timeSeconds"], json!(29.0));

    teardown(s);
}

#[test]
fn time_record_without_a_time_is_rejected() {
    let mut s = setup("scorecard-records-no-time");
    let student_id = create_student(&mut s, "Ava", 8, "FEMALE");
    let asts = s.asts_id.clone();

    let missing = request(
        &mut s.stdin,
        &mut s.reader,
        "records.save",
        json!({
            "studentId": student_id,
            "classId": s.class_id,
            "assessmentId": asts,
            "assessmentPeriodId": s.period_id,
        }),
    );
    assert_eq!(missing["error"]["code"], json!("bad_params"));
    assert!(missing["error"]["message"]
        .as_str()
        .is_some_and(|m| m.contains("timeSeconds is required")));

    let rows = request_ok(
        &mut s.stdin,
        &mut s.reader,
        "records.list",
        json!({
            "classId": s.class_id,
            "assessmentId": asts,
            "assessmentPeriodId": s.period_id,
        }),
    );
    assert!(rows["rows"][0]["record"].is_null());

    teardown(s);
}

#[test]
fn invalid_saves_are_rejected() {
    let mut s = setup("scorecard-records-invalid");
    let student_id = create_student(&mut s, "Ava", 8, "FEMALE");
    let catch = s.catch_id.clone();

    let stray = request(
        &mut s.stdin,
        &mut s.reader,
        "records.save",
        json!({
            "studentId": student_id,
            "classId": s.class_id,
            "assessmentId": catch,
            "assessmentPeriodId": s.period_id,
            "elementScores": { "someone_else_comp_0": true },
        }),
    );
    assert_eq!(stray["error"]["code"], json!("bad_params"));

    let negative = request(
        &mut s.stdin,
        &mut s.reader,
        "records.save",
        json!({
            "studentId": student_id,
            "classId": s.class_id,
            "assessmentId": catch,
            "assessmentPeriodId": s.period_id,
            "elementScores": { format!("{catch}_comp_0"): -1 },
        }),
    );
    assert_eq!(negative["error"]["code"], json!("bad_params"));

    let no_period = request(
        &mut s.stdin,
        &mut s.reader,
        "records.save",
        json!({
            "studentId": student_id,
            "classId": s.class_id,
            "assessmentId": catch,
            "assessmentPeriodId": "missing-period",
        }),
    );
    assert_eq!(no_period["error"]["code"], json!("not_found"));

    let no_assessment = request(
        &mut s.stdin,
        &mut s.reader,
        "records.save",
        json!({
            "studentId": student_id,
            "classId": s.class_id,
            "assessmentId": "missing-assessment",
            "assessmentPeriodId": s.period_id,
        }),
    );
    assert_eq!(no_assessment["error"]["code"], json!("not_found"));

    let malformed = request(
        &mut s.stdin,
        &mut s.reader,
        "records.save",
        json!({ "studentId": student_id }),
    );
    assert_eq!(malformed["error"]["code"], json!("bad_params"));

    let rows = request_ok(
        &mut s.stdin,
        &mut s.reader,
        "records.list",
        json!({
            "classId": s.class_id,
            "assessmentId": catch,
            "assessmentPeriodId": s.period_id,
        }),
    );
    assert!(rows["rows"][0]["record"].is_null());

    teardown(s);
}
