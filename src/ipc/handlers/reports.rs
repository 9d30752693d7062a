use crate::bulletin::{classify_average, round_off_2_decimals, GradeReport};
use crate::db::{self, StudentFilter, StudentRow};
use crate::gradebook::{self, Ranking};
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::bulletins::report_view;
use crate::ipc::handlers::setup::{grading_defaults, reports_options, ReportsOptions};
use crate::ipc::helpers::{db_conn, required_str, student_or_not_found};
use crate::ipc::types::{AppState, Request};
use crate::store::{ReportStore, SqliteReportStore};
use rusqlite::Connection;
use serde_json::json;
use std::collections::HashMap;

/// Ranking for one class level. Students without a stored report rank as empty.
fn class_ranking(
    conn: &Connection,
    class_level: &str,
    options: ReportsOptions,
) -> anyhow::Result<(Vec<StudentRow>, Ranking)> {
    let students: Vec<StudentRow> = db::list_students(
        conn,
        &StudentFilter {
            class_level: Some(class_level.to_string()),
            ..StudentFilter::default()
        },
    )?
    .into_iter()
    .filter(|s| s.active || options.include_inactive_in_ranking)
    .collect();

    let store = SqliteReportStore::new(conn);
    let mut entries: Vec<(String, GradeReport)> = Vec::with_capacity(students.len());
    for s in &students {
        let report = store
            .load(&s.id)?
            .unwrap_or_else(|| GradeReport::new(String::new(), 1));
        entries.push((s.id.clone(), report));
    }
    Ok((students, gradebook::rank_students(&entries)))
}

fn handle_class_ranking(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let class_level = match required_str(req, "classLevel") {
        Ok(v) => v.trim().to_string(),
        Err(e) => return e,
    };
    let options = match reports_options(conn) {
        Ok(o) => o,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let (students, ranking) = match class_ranking(conn, &class_level, options) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let names: HashMap<&str, &str> = students
        .iter()
        .map(|s| (s.id.as_str(), s.display_name.as_str()))
        .collect();
    let rows: Vec<serde_json::Value> = ranking
        .rows
        .iter()
        .map(|r| {
            let ranked = r.subject_count > 0;
            json!({
                "studentId": r.student_id,
                "displayName": names.get(r.student_id.as_str()).copied().unwrap_or(""),
                "subjectCount": r.subject_count,
                "average": round_off_2_decimals(r.average),
                "averageDisplay": if ranked {
                    format!("{:.2}", round_off_2_decimals(r.average))
                } else {
                    "—".to_string()
                },
                "mention": if ranked { Some(classify_average(r.average)) } else { None },
                "rank": r.rank,
            })
        })
        .collect();

    ok(
        &req.id,
        json!({
            "classLevel": class_level,
            "classSize": ranking.class_size,
            "rows": rows,
        }),
    )
}

fn handle_bulletin_model(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student = match student_or_not_found(conn, req, &student_id) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let defaults = match grading_defaults(conn) {
        Ok(d) => d,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let options = match reports_options(conn) {
        Ok(o) => o,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let student_ref = student.grading_ref();
    let mut store = SqliteReportStore::new(conn);
    let report = match gradebook::open_report(&mut store, &student_ref, &defaults) {
        Ok(r) => r,
        Err(e) => return err(&req.id, "storage_failed", e.to_string(), None),
    };
    let ranking = match class_ranking(conn, &student.class_level, options) {
        Ok((_, r)) => r,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut model = json!({
        "student": student,
        "report": report_view(&student_ref.id, &report),
        "rank": ranking.rank_of(&student_ref.id),
        "classSize": ranking.class_size,
    });
    if options.show_generated_at {
        model["generatedAt"] = json!(db::now_stamp());
    }
    ok(&req.id, model)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.classRanking" => Some(handle_class_ranking(state, req)),
        "reports.bulletinModel" => Some(handle_bulletin_model(state, req)),
        _ => None,
    }
}
