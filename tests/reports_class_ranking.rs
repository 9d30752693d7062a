mod test_support;

use serde_json::json;
use std::io::BufReader;
use std::process::{ChildStdin, ChildStdout};
use test_support::{request_err_code, request_ok, spawn_sidecar, temp_dir};

fn create_with_scores(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    tag: &str,
    last_name: &str,
    scores: &[(&str, f64, i64)],
) -> String {
    let created = request_ok(
        stdin,
        reader,
        &format!("{}-create", tag),
        "students.create",
        json!({
            "lastName": last_name,
            "firstName": "Test",
            "track": "Anglophone",
            "classLevel": "Class 3"
        }),
    );
    let sid = created["studentId"].as_str().expect("studentId").to_string();
    for (i, (name, score, coefficient)) in scores.iter().enumerate() {
        let _ = request_ok(
            stdin,
            reader,
            &format!("{}-{}", tag, i),
            "bulletin.subjects.add",
            json!({ "studentId": sid, "name": name, "score": score, "coefficient": coefficient }),
        );
    }
    sid
}

#[test]
fn class_ranking_and_bulletin_model() {
    let workspace = temp_dir("bulletind-ranking");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "setup.update",
        json!({ "section": "grading", "patch": { "prefillDefaultSubjects": false } }),
    );

    let a = create_with_scores(&mut stdin, &mut reader, "a", "Abena", &[("Maths", 12.0, 1)]);
    let b = create_with_scores(
        &mut stdin,
        &mut reader,
        "b",
        "Bello",
        &[("Maths", 16.0, 3), ("English", 13.0, 2)],
    );
    let c = create_with_scores(&mut stdin, &mut reader, "c", "Chi", &[("Maths", 14.8, 1)]);
    let d = create_with_scores(&mut stdin, &mut reader, "d", "Diko", &[]);
    let e = create_with_scores(&mut stdin, &mut reader, "e", "Ewane", &[("Maths", 19.0, 1)]);
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.update",
        json!({ "studentId": e, "patch": { "active": false } }),
    );

    let ranking = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "reports.classRanking",
        json!({ "classLevel": "Class 3" }),
    );
    assert_eq!(ranking["classSize"], 3);
    let rows = ranking["rows"].as_array().expect("rows");
    let order: Vec<(&str, serde_json::Value)> = rows
        .iter()
        .map(|r| (r["studentId"].as_str().unwrap_or(""), r["rank"].clone()))
        .collect();
    // Bello: (48 + 26) / 5 = 14.8, ties with Chi.
    assert_eq!(
        order,
        vec![
            (b.as_str(), json!(1)),
            (c.as_str(), json!(1)),
            (a.as_str(), json!(3)),
            (d.as_str(), json!(null)),
        ]
    );
    assert_eq!(rows[0]["displayName"], "Bello, Test");
    assert_eq!(rows[0]["averageDisplay"], "14.80");
    assert_eq!(rows[0]["mention"]["mention"], "Compliments");
    assert_eq!(rows[3]["averageDisplay"], "—");
    assert!(rows[3]["mention"].is_null());

    let model = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "reports.bulletinModel",
        json!({ "studentId": a }),
    );
    assert_eq!(model["rank"], 3);
    assert_eq!(model["classSize"], 3);
    assert_eq!(model["student"]["lastName"], "Abena");
    assert_eq!(model["report"]["averageDisplay"], "12.00");
    assert_eq!(model["report"]["mention"]["mention"], "Encouragement");
    assert!(model["generatedAt"].is_string());

    let inactive = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "reports.bulletinModel",
        json!({ "studentId": e }),
    );
    assert!(inactive["rank"].is_null());

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "setup.update",
        json!({
            "section": "reports",
            "patch": { "includeInactiveInRanking": true, "showGeneratedAt": false }
        }),
    );
    let with_inactive = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "reports.bulletinModel",
        json!({ "studentId": e }),
    );
    assert_eq!(with_inactive["rank"], 1);
    assert_eq!(with_inactive["classSize"], 4);
    assert!(with_inactive.get("generatedAt").is_none());

    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "9",
        "reports.bulletinModel",
        json!({ "studentId": "missing" }),
    );
    assert_eq!(code, "not_found");
    let code = request_err_code(&mut stdin, &mut reader, "10", "reports.classRanking", json!({}));
    assert_eq!(code, "bad_params");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
