mod test_support;

use serde_json::json;
use test_support::{request_err_code, request_ok, spawn_sidecar, temp_dir};

#[test]
fn grading_defaults_drive_new_reports() {
    let workspace = temp_dir("bulletind-setup-grading");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let setup = request_ok(&mut stdin, &mut reader, "2", "setup.get", json!({}));
    assert_eq!(setup["grading"]["defaultSchoolYear"], "2023-2024");
    assert_eq!(setup["grading"]["defaultTerm"], 1);
    assert_eq!(setup["grading"]["prefillDefaultSubjects"], true);
    assert_eq!(setup["reports"]["includeInactiveInRanking"], false);
    assert_eq!(setup["reports"]["showGeneratedAt"], true);

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "setup.update",
        json!({
            "section": "grading",
            "patch": {
                "defaultSchoolYear": " 2024-2025 ",
                "defaultTerm": 2,
                "prefillDefaultSubjects": false
            }
        }),
    );
    assert_eq!(updated["section"], "grading");
    assert_eq!(updated["values"]["defaultSchoolYear"], "2024-2025");

    let student = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "students.create",
        json!({
            "lastName": "Mbarga",
            "firstName": "Mary",
            "track": "Anglophone",
            "classLevel": "Class 1"
        }),
    );
    let student_id = student["studentId"].as_str().expect("studentId").to_string();

    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "bulletin.open",
        json!({ "studentId": student_id }),
    );
    assert_eq!(opened["report"]["schoolYear"], "2024-2025");
    assert_eq!(opened["report"]["term"], 2);
    assert_eq!(opened["report"]["subjectCount"], 0);
    assert_eq!(opened["report"]["averageDisplay"], "—");
    assert!(opened["report"]["mention"].is_null());

    for (id, patch) in [
        ("6", json!({ "defaultTerm": 4 })),
        ("7", json!({ "defaultSchoolYear": "" })),
        ("8", json!({ "defaultSchoolYear": "x".repeat(21) })),
        ("9", json!({ "prefillDefaultSubjects": "yes" })),
        ("10", json!({ "colour": "blue" })),
    ] {
        let code = request_err_code(
            &mut stdin,
            &mut reader,
            id,
            "setup.update",
            json!({ "section": "grading", "patch": patch }),
        );
        assert_eq!(code, "bad_params");
    }
    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "11",
        "setup.update",
        json!({ "section": "attendance", "patch": {} }),
    );
    assert_eq!(code, "bad_params");

    let setup = request_ok(&mut stdin, &mut reader, "12", "setup.get", json!({}));
    assert_eq!(setup["grading"]["defaultTerm"], 2);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
