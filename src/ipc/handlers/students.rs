use crate::bulletin::Track;
use crate::db::{self, NewStudent, StudentFilter, StudentPatch, StudentSort};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, optional_str, required_str, student_or_not_found};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use tracing::info;

fn parse_track(req: &Request, raw: &str) -> Result<Track, serde_json::Value> {
    Track::parse(raw).ok_or_else(|| {
        err(
            &req.id,
            "bad_params",
            "track must be Francophone or Anglophone",
            Some(json!({ "track": raw })),
        )
    })
}

/// Distinguishes an absent key (leave unchanged) from null or blank (clear).
fn nullable_str(req: &Request, key: &str) -> Result<Option<Option<String>>, serde_json::Value> {
    if req.params.get(key).is_none() {
        return Ok(None);
    }
    optional_str(req, key).map(Some)
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let class_level = match optional_str(req, "classLevel") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let track = match optional_str(req, "track") {
        Ok(Some(raw)) => match parse_track(req, &raw) {
            Ok(t) => Some(t),
            Err(e) => return e,
        },
        Ok(None) => None,
        Err(e) => return e,
    };
    let search = match optional_str(req, "search") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let sort = match req.params.get("sort").and_then(|v| v.as_str()) {
        None | Some("sortOrder") => StudentSort::SortOrder,
        Some("name") => StudentSort::Name,
        Some(other) => {
            return err(
                &req.id,
                "bad_params",
                "sort must be sortOrder or name",
                Some(json!({ "sort": other })),
            )
        }
    };

    let filter = StudentFilter {
        class_level,
        track,
        search,
        sort,
    };
    match db::list_students(conn, &filter) {
        Ok(students) => ok(&req.id, json!({ "students": students })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let last_name = match required_str(req, "lastName") {
        Ok(v) => v.trim().to_string(),
        Err(e) => return e,
    };
    let first_name = match required_str(req, "firstName") {
        Ok(v) => v.trim().to_string(),
        Err(e) => return e,
    };
    if last_name.is_empty() || first_name.is_empty() {
        return err(
            &req.id,
            "bad_params",
            "firstName/lastName must not be empty",
            None,
        );
    }
    let track = match required_str(req, "track").and_then(|raw| parse_track(req, &raw)) {
        Ok(t) => t,
        Err(e) => return e,
    };
    let class_level = match required_str(req, "classLevel") {
        Ok(v) => v.trim().to_string(),
        Err(e) => return e,
    };
    if class_level.is_empty() {
        return err(&req.id, "bad_params", "classLevel must not be empty", None);
    }
    let student_no = match optional_str(req, "studentNo") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let birth_date = match optional_str(req, "birthDate") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let active = req
        .params
        .get("active")
        .and_then(|v| v.as_bool())
        .unwrap_or(true);

    let new_student = NewStudent {
        last_name,
        first_name,
        track,
        class_level,
        student_no,
        birth_date,
        active,
    };
    match db::insert_student(conn, &new_student) {
        Ok(student_id) => {
            info!(student_id = %student_id, track = track.as_str(), "student created");
            ok(&req.id, json!({ "studentId": student_id }))
        }
        Err(e) => err(&req.id, "db_insert_failed", e.to_string(), None),
    }
}

fn handle_students_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };
    // Patch fields are read through a request view so the shared helpers apply.
    let patch_req = Request {
        id: req.id.clone(),
        method: req.method.clone(),
        params: serde_json::Value::Object(patch_obj.clone()),
    };

    let mut patch = StudentPatch::default();
    for key in ["lastName", "firstName", "classLevel"] {
        let value = match optional_str(&patch_req, key) {
            Ok(v) => v,
            Err(e) => return e,
        };
        if patch_obj.contains_key(key) && value.is_none() {
            return err(
                &req.id,
                "bad_params",
                format!("{} must not be empty", key),
                None,
            );
        }
        match key {
            "lastName" => patch.last_name = value,
            "firstName" => patch.first_name = value,
            _ => patch.class_level = value,
        }
    }
    if let Some(raw) = patch_obj.get("track") {
        let Some(raw) = raw.as_str() else {
            return err(&req.id, "bad_params", "track must be a string", None);
        };
        match parse_track(req, raw) {
            Ok(t) => patch.track = Some(t),
            Err(e) => return e,
        }
    }
    patch.student_no = match nullable_str(&patch_req, "studentNo") {
        Ok(v) => v,
        Err(e) => return e,
    };
    patch.birth_date = match nullable_str(&patch_req, "birthDate") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Some(v) = patch_obj.get("active") {
        let Some(b) = v.as_bool() else {
            return err(&req.id, "bad_params", "active must be boolean", None);
        };
        patch.active = Some(b);
    }
    if patch.is_empty() {
        return err(&req.id, "bad_params", "patch has no known fields", None);
    }

    match db::update_student(conn, &student_id, &patch) {
        Ok(true) => match student_or_not_found(conn, req, &student_id) {
            Ok(student) => ok(&req.id, json!({ "student": student })),
            Err(e) => e,
        },
        Ok(false) => err(&req.id, "not_found", "student not found", None),
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match db::delete_student(conn, &student_id) {
        Ok(true) => {
            info!(student_id = %student_id, "student deleted");
            ok(&req.id, json!({ "ok": true }))
        }
        Ok(false) => err(&req.id, "not_found", "student not found", None),
        Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.create" => Some(handle_students_create(state, req)),
        "students.update" => Some(handle_students_update(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        _ => None,
    }
}
