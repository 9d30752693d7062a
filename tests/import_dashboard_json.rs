mod test_support;

use serde_json::json;
use test_support::{fixture_path, request_err_code, request_ok, spawn_sidecar, temp_dir};

#[test]
fn dashboard_export_imports_students_and_reports() {
    let workspace = temp_dir("bulletind-import");
    let export = fixture_path("fixtures/dashboard/students.json");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let imported = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "import.dashboardJson",
        json!({ "path": export.to_string_lossy() }),
    );
    assert_eq!(imported["imported"], 4);
    assert_eq!(imported["reports"], 3);
    assert_eq!(imported["skipped"], 1);
    let warnings: Vec<&str> = imported["warnings"]
        .as_array()
        .expect("warnings")
        .iter()
        .filter_map(|w| w.as_str())
        .collect();
    assert!(warnings.iter().any(|w| w.contains("'Sciences' skipped")));
    assert!(warnings.iter().any(|w| w.contains("missing nom/prenom")));

    let ranking = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "reports.classRanking",
        json!({ "classLevel": "CP" }),
    );
    assert_eq!(ranking["classSize"], 2);
    let rows = ranking["rows"].as_array().expect("rows");
    assert_eq!(rows[0]["displayName"], "Kouam, Fanta");
    assert_eq!(rows[0]["averageDisplay"], "16.79");
    assert_eq!(rows[0]["mention"]["mention"], "Congratulations");
    assert_eq!(rows[1]["displayName"], "Mbiya, Brice");
    assert_eq!(rows[1]["averageDisplay"], "15.69");
    assert_eq!(rows[1]["rank"], 2);
    let brice_id = rows[1]["studentId"].as_str().expect("studentId").to_string();

    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "bulletin.open",
        json!({ "studentId": brice_id }),
    );
    let report = &opened["report"];
    assert_eq!(report["term"], 3);
    assert_eq!(report["remark"], "Élève sérieux et appliqué.");
    assert_eq!(report["subjectCount"], 4);
    assert_eq!(report["subjects"][1]["remark"], "Améliorer la tenue du crayon");

    let transferred = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "students.list",
        json!({ "classLevel": "CE1" }),
    );
    assert_eq!(transferred["students"][0]["lastName"], "Ekane");
    assert_eq!(transferred["students"][0]["active"], false);

    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "6",
        "import.dashboardJson",
        json!({ "path": workspace.join("absent.json").to_string_lossy() }),
    );
    assert_eq!(code, "import_parse_failed");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn ungraded_bulletin_opens_with_track_subjects() {
    let workspace = temp_dir("bulletind-import-ungraded");
    let export = workspace.join("ungraded.json");
    let records = json!([
        {
            "nom": "Abanda",
            "prenom": "Marie",
            "section": "Francophone",
            "classe": "CE1",
            "bulletin": { "annee": "2023-2024", "trimestre": 2, "matieres": [] }
        }
    ]);
    std::fs::write(&export, records.to_string()).expect("write export");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let imported = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "import.dashboardJson",
        json!({ "path": export.to_string_lossy() }),
    );
    assert_eq!(imported["imported"], 1);
    assert_eq!(imported["reports"], 1);

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.list",
        json!({ "classLevel": "CE1" }),
    );
    let student_id = listed["students"][0]["id"]
        .as_str()
        .expect("student id")
        .to_string();

    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "bulletin.open",
        json!({ "studentId": student_id }),
    );
    let report = &opened["report"];
    assert_eq!(report["term"], 2);
    assert_eq!(report["subjectCount"], 9);
    assert_eq!(report["subjects"][0]["name"], "Mathématiques");
    assert_eq!(report["subjects"][0]["score"], 0.0);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
