use crate::bulletin::{self, GradeReport, ReportSummary, MAX_SCORE, MIN_SCORE};
use crate::error::BulletinError;
use crate::gradebook::{self, GradebookError, ReportMeta, StudentRef, SubjectInput};
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::setup::grading_defaults;
use crate::ipc::helpers::{db_conn, optional_i64, required_f64, required_str, student_or_not_found};
use crate::ipc::types::{AppState, Request};
use crate::store::SqliteReportStore;
use rusqlite::Connection;
use serde_json::json;

/// Report as the front-end renders it: stored fields plus the derived summary.
pub(crate) fn report_view(student_id: &str, report: &GradeReport) -> serde_json::Value {
    let summary = ReportSummary::of(report);
    json!({
        "studentId": student_id,
        "schoolYear": report.school_year,
        "term": report.term,
        "remark": report.remark,
        "subjects": summary.subjects,
        "subjectCount": summary.subject_count,
        "average": summary.average,
        "averageDisplay": summary.average_display,
        "mention": summary.mention,
    })
}

fn gradebook_err(req: &Request, e: GradebookError) -> serde_json::Value {
    match &e {
        GradebookError::Rejected(b) => err(&req.id, b.code(), b.to_string(), b.details()),
        GradebookError::InvalidTerm(t) => err(
            &req.id,
            "bad_params",
            e.to_string(),
            Some(json!({ "term": t })),
        ),
        GradebookError::Storage(inner) => err(&req.id, "storage_failed", inner.to_string(), None),
    }
}

/// Resolves the connection and the student named by `studentId`.
fn student_context<'a>(
    state: &'a AppState,
    req: &Request,
) -> Result<(&'a Connection, StudentRef), serde_json::Value> {
    let conn = db_conn(state, req)?;
    let student_id = required_str(req, "studentId")?;
    let student = student_or_not_found(conn, req, &student_id)?;
    Ok((conn, student.grading_ref()))
}

fn defaults_or_err(
    conn: &Connection,
    req: &Request,
) -> Result<gradebook::ReportDefaults, serde_json::Value> {
    grading_defaults(conn).map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))
}

fn respond(
    req: &Request,
    student: &StudentRef,
    result: Result<GradeReport, GradebookError>,
) -> serde_json::Value {
    match result {
        Ok(report) => ok(&req.id, json!({ "report": report_view(&student.id, &report) })),
        Err(e) => gradebook_err(req, e),
    }
}

fn handle_bulletin_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (conn, student) = match student_context(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let defaults = match defaults_or_err(conn, req) {
        Ok(d) => d,
        Err(e) => return e,
    };
    let mut store = SqliteReportStore::new(conn);
    respond(
        req,
        &student,
        gradebook::open_report(&mut store, &student, &defaults),
    )
}

fn handle_bulletin_update_meta(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (conn, student) = match student_context(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let defaults = match defaults_or_err(conn, req) {
        Ok(d) => d,
        Err(e) => return e,
    };

    let school_year = match req.params.get("schoolYear") {
        None => None,
        Some(v) => match v.as_str().map(str::trim) {
            Some(s) if !s.is_empty() => Some(s.to_string()),
            _ => {
                return err(
                    &req.id,
                    "bad_params",
                    "schoolYear must be a non-empty string",
                    None,
                )
            }
        },
    };
    let term = match optional_i64(req, "term") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let remark = match req.params.get("remark") {
        None => None,
        Some(v) if v.is_null() => Some(None),
        Some(v) => match v.as_str() {
            Some(s) => Some(Some(s.to_string())),
            None => return err(&req.id, "bad_params", "remark must be a string", None),
        },
    };
    let meta = ReportMeta {
        school_year,
        term,
        remark,
    };

    let mut store = SqliteReportStore::new(conn);
    respond(
        req,
        &student,
        gradebook::update_report_meta(&mut store, &student, &defaults, &meta),
    )
}

fn handle_bulletin_reset(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (conn, student) = match student_context(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let defaults = match defaults_or_err(conn, req) {
        Ok(d) => d,
        Err(e) => return e,
    };
    let mut store = SqliteReportStore::new(conn);
    respond(
        req,
        &student,
        gradebook::reset_report(&mut store, &student, &defaults),
    )
}

fn handle_subject_upsert(state: &mut AppState, req: &Request, edit: bool) -> serde_json::Value {
    let (conn, student) = match student_context(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let defaults = match defaults_or_err(conn, req) {
        Ok(d) => d,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let score = match required_f64(req, "score") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let coefficient = match optional_i64(req, "coefficient") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let remark = match req.params.get("remark") {
        None => None,
        Some(v) if v.is_null() => Some(""),
        Some(v) => match v.as_str() {
            Some(s) => Some(s),
            None => return err(&req.id, "bad_params", "remark must be a string", None),
        },
    };

    let input = SubjectInput {
        name: &name,
        score,
        coefficient,
        remark,
    };
    let mut store = SqliteReportStore::new(conn);
    let result = if edit {
        gradebook::edit_subject(&mut store, &student, &defaults, input)
    } else {
        gradebook::add_subject(&mut store, &student, &defaults, input)
    };
    respond(req, &student, result)
}

fn handle_subject_remove(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (conn, student) = match student_context(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let defaults = match defaults_or_err(conn, req) {
        Ok(d) => d,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let mut store = SqliteReportStore::new(conn);
    match gradebook::remove_subject(&mut store, &student, &defaults, &name) {
        Ok((report, removed)) => ok(
            &req.id,
            json!({
                "removed": removed,
                "report": report_view(&student.id, &report),
            }),
        ),
        Err(e) => gradebook_err(req, e),
    }
}

fn in_score_range(req: &Request, key: &str) -> Result<f64, serde_json::Value> {
    let value = required_f64(req, key)?;
    if !(MIN_SCORE..=MAX_SCORE).contains(&value) {
        let e = BulletinError::OutOfRangeScore { score: value };
        return Err(err(&req.id, e.code(), e.to_string(), e.details()));
    }
    Ok(value)
}

fn handle_classify_score(req: &Request) -> serde_json::Value {
    match in_score_range(req, "score") {
        Ok(score) => ok(&req.id, json!(bulletin::classify_score(score))),
        Err(e) => e,
    }
}

fn handle_classify_average(req: &Request) -> serde_json::Value {
    match in_score_range(req, "average") {
        Ok(average) => ok(&req.id, json!(bulletin::classify_average(average))),
        Err(e) => e,
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "bulletin.open" => Some(handle_bulletin_open(state, req)),
        "bulletin.updateMeta" => Some(handle_bulletin_update_meta(state, req)),
        "bulletin.reset" => Some(handle_bulletin_reset(state, req)),
        "bulletin.subjects.add" => Some(handle_subject_upsert(state, req, false)),
        "bulletin.subjects.update" => Some(handle_subject_upsert(state, req, true)),
        "bulletin.subjects.remove" => Some(handle_subject_remove(state, req)),
        "classify.score" => Some(handle_classify_score(req)),
        "classify.average" => Some(handle_classify_average(req)),
        _ => None,
    }
}
