mod test_support;

use serde_json::json;
use std::io::Write;
use test_support::{read_response, request, request_ok, spawn_sidecar, temp_dir};

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("bulletind-router-smoke");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert!(health["workspacePath"].is_null());

    let defaults = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "tracks.defaultSubjects",
        json!({ "track": "Bilingue" }),
    );
    assert_eq!(defaults["track"], "Anglophone");
    assert_eq!(defaults["subjects"][0], "Mathematics");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let created = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "students.create",
        json!({ "lastName": "Ngo", "firstName": "Alice", "track": "Anglophone", "classLevel": "Class 2" }),
    );
    let sid = created["studentId"].clone();

    for (id, method, params) in [
        ("5", "setup.get", json!({})),
        ("6", "students.list", json!({})),
        ("7", "bulletin.open", json!({ "studentId": sid })),
        ("8", "bulletin.subjects.update", json!({ "studentId": sid, "name": "Music", "score": 11 })),
        ("9", "classify.score", json!({ "score": 11 })),
        ("10", "reports.classRanking", json!({ "classLevel": "Class 2" })),
        ("11", "reports.bulletinModel", json!({ "studentId": sid })),
    ] {
        let _ = request_ok(&mut stdin, &mut reader, id, method, params);
    }

    let unknown = request(&mut stdin, &mut reader, "12", "grades.explode", json!({}));
    assert_eq!(unknown["ok"], false);
    assert_eq!(unknown["error"]["code"], "not_implemented");

    writeln!(stdin, "{{not json").expect("write garbage");
    stdin.flush().expect("flush");
    let bad = read_response(&mut reader);
    assert_eq!(bad["ok"], false);
    assert_eq!(bad["error"]["code"], "bad_json");

    // The loop keeps serving after a bad line.
    let _ = request_ok(&mut stdin, &mut reader, "13", "health", json!({}));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
