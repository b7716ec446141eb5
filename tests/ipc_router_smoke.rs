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

fn read_line(reader: &mut BufReader<ChildStdout>) -> serde_json::Value {
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response");
    serde_json::from_str(line.trim()).expect("parse response json")
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let value = read_line(reader);
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    if value.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let code = value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        assert_ne!(
            code, "not_implemented",
            "unexpected unknown method for {}",
            method
        );
    }
    value
}

fn error_code(value: &serde_json::Value) -> Option<&str> {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("scorecard-router-smoke");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(health["ok"], json!(true));
    assert!(health["result"]["workspacePath"].is_null());

    let early = request(
        &mut stdin,
        &mut reader,
        "2",
        "classes.create",
        json!({ "name": "Too early", "yearLevel": "Year 3", "year": 2026 }),
    );
    assert_eq!(error_code(&early), Some("no_workspace"));

    let selected = request(
        &mut stdin,
        &mut reader,
        "3",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert_eq!(selected["ok"], json!(true));
    assert!(workspace.join("scorecard.sqlite3").exists());

    let created = request(
        &mut stdin,
        &mut reader,
        "4",
        "classes.create",
        json!({ "name": "3B", "yearLevel": "Year 3", "year": 2026, "term": "T1" }),
    );
    let class_id = created
        .get("result")
        .and_then(|v| v.get("classId"))
        .and_then(|v| v.as_str())
        .expect("classId")
        .to_string();

    let student = request(
        &mut stdin,
        &mut reader,
        "5",
        "students.create",
        json!({
            "name": "Ava Smith",
            "dateOfBirth": "2018-01-01",
            "gender": "FEMALE",
            "classId": class_id,
        }),
    );
    assert_eq!(student["ok"], json!(true));
    assert!(student["result"]["yearLevel"].is_string());
    let student_id = student["result"]["studentId"]
        .as_str()
        .expect("studentId")
        .to_string();

    let enrolled_again = request(
        &mut stdin,
        &mut reader,
        "6",
        "students.enroll",
        json!({ "classId": class_id, "studentId": student_id }),
    );
    assert_eq!(enrolled_again["result"]["enrolled"], json!(false));

    let bad_gender = request(
        &mut stdin,
        &mut reader,
        "7",
        "students.create",
        json!({ "name": "X", "dateOfBirth": "2018-01-01", "gender": "unknown" }),
    );
    assert_eq!(error_code(&bad_gender), Some("bad_params"));

    let listed = request(
        &mut stdin,
        &mut reader,
        "8",
        "students.list",
        json!({ "classId": class_id }),
    );
    let students = listed["result"]["students"].as_array().expect("students");
    assert_eq!(students.len(), 1);
    assert_eq!(students[0]["name"], json!("Ava Smith"));

    let classes = request(&mut stdin, &mut reader, "9", "classes.list", json!({}));
    assert_eq!(classes["result"]["classes"][0]["studentCount"], json!(1));

    let period = request(
        &mut stdin,
        &mut reader,
        "10",
        "periods.create",
        json!({
            "name": "Term 1",
            "type": "term",
            "year": 2026,
            "startDate": "2026-01-27",
            "endDate": "2026-04-02",
        }),
    );
    assert_eq!(period["result"]["type"], json!("TERM"));

    let backwards = request(
        &mut stdin,
        &mut reader,
        "11",
        "periods.create",
        json!({
            "name": "Broken",
            "type": "TERM",
            "year": 2026,
            "startDate": "2026-05-01",
            "endDate": "2026-04-01",
        }),
    );
    assert_eq!(error_code(&backwards), Some("bad_params"));

    let periods = request(&mut stdin, &mut reader, "12", "periods.list", json!({}));
    assert_eq!(
        periods["result"]["periods"].as_array().map(|v| v.len()),
        Some(1)
    );

    let assessments = request(&mut stdin, &mut reader, "13", "assessments.list", json!({}));
    assert_eq!(assessments["result"]["assessments"], json!([]));

    let runs = request(&mut stdin, &mut reader, "14", "skills.importRuns", json!({}));
    assert_eq!(runs["result"]["runs"], json!([]));

    let class = request(
        &mut stdin,
        &mut reader,
        "15",
        "classes.get",
        json!({ "classId": class_id }),
    );
    assert_eq!(class["result"]["class"]["term"], json!("T1"));
    assert_eq!(
        class["result"]["students"].as_array().map(|v| v.len()),
        Some(1)
    );

    let unknown = json!({ "id": "16", "method": "nope.nothing", "params": {} });
    writeln!(stdin, "{}", unknown).expect("write request");
    stdin.flush().expect("flush request");
    let unknown = read_line(&mut reader);
    assert_eq!(error_code(&unknown), Some("not_implemented"));

    writeln!(stdin, "{{not json").expect("write garbage");
    stdin.flush().expect("flush garbage");
    let garbage = read_line(&mut reader);
    assert_eq!(error_code(&garbage), Some("bad_json"));

    let deleted = request(
        &mut stdin,
        &mut reader,
        "17",
        "classes.delete",
        json!({ "classId": class_id }),
    );
    assert_eq!(deleted["ok"], json!(true));
    let gone = request(
        &mut stdin,
        &mut reader,
        "18",
        "classes.get",
        json!({ "classId": class_id }),
    );
    assert_eq!(error_code(&gone), Some("not_found"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
