use crate::db;
use crate::gradebook::{ReportDefaults, MAX_TERM, MIN_TERM};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::db_conn;
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Map, Value};

#[derive(Clone, Copy)]
enum SetupSection {
    Grading,
    Reports,
}

impl SetupSection {
    const ALL: [SetupSection; 2] = [SetupSection::Grading, SetupSection::Reports];

    fn parse(s: &str) -> Option<Self> {
        match s {
            "grading" => Some(Self::Grading),
            "reports" => Some(Self::Reports),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Grading => "grading",
            Self::Reports => "reports",
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Grading => "setup.grading",
            Self::Reports => "setup.reports",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Grading => {
            let d = ReportDefaults::default();
            json!({
                "defaultSchoolYear": d.school_year,
                "defaultTerm": d.term,
                "prefillDefaultSubjects": d.prefill_subjects
            })
        }
        SetupSection::Reports => json!({
            "includeInactiveInRanking": false,
            "showGeneratedAt": true
        }),
    }
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool().ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v.as_i64().ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.chars().count() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    Ok(s.to_string())
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::Grading => match k.as_str() {
                "defaultSchoolYear" => {
                    let s = parse_string_max(v, k, 20)?;
                    if s.is_empty() {
                        return Err(format!("{} must not be empty", k));
                    }
                    obj.insert(k.clone(), Value::String(s));
                }
                "defaultTerm" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, MIN_TERM, MAX_TERM)?));
                }
                "prefillDefaultSubjects" => {
                    obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
                }
                _ => return Err(format!("unknown grading field: {}", k)),
            },
            SetupSection::Reports => match k.as_str() {
                "includeInactiveInRanking" | "showGeneratedAt" => {
                    obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
                }
                _ => return Err(format!("unknown reports field: {}", k)),
            },
        }
    }
    Ok(())
}

fn load_section(conn: &rusqlite::Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // A malformed saved section falls back to defaults as a whole.
            let mut merged = current.clone();
            if merge_section_patch(section, &mut merged, saved_obj).is_ok() {
                current = merged;
            }
        }
    }
    Ok(current)
}

pub fn grading_defaults(conn: &rusqlite::Connection) -> anyhow::Result<ReportDefaults> {
    let v = load_section(conn, SetupSection::Grading)?;
    let d = ReportDefaults::default();
    Ok(ReportDefaults {
        school_year: v
            .get("defaultSchoolYear")
            .and_then(|x| x.as_str())
            .map(str::to_string)
            .unwrap_or(d.school_year),
        term: v
            .get("defaultTerm")
            .and_then(|x| x.as_u64())
            .and_then(|x| u8::try_from(x).ok())
            .unwrap_or(d.term),
        prefill_subjects: v
            .get("prefillDefaultSubjects")
            .and_then(|x| x.as_bool())
            .unwrap_or(d.prefill_subjects),
    })
}

#[derive(Debug, Clone, Copy)]
pub struct ReportsOptions {
    pub include_inactive_in_ranking: bool,
    pub show_generated_at: bool,
}

pub fn reports_options(conn: &rusqlite::Connection) -> anyhow::Result<ReportsOptions> {
    let v = load_section(conn, SetupSection::Reports)?;
    Ok(ReportsOptions {
        include_inactive_in_ranking: v
            .get("includeInactiveInRanking")
            .and_then(|x| x.as_bool())
            .unwrap_or(false),
        show_generated_at: v
            .get("showGeneratedAt")
            .and_then(|x| x.as_bool())
            .unwrap_or(true),
    })
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let mut out = Map::new();
    for section in SetupSection::ALL {
        match load_section(conn, section) {
            Ok(v) => {
                out.insert(section.name().to_string(), v);
            }
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    }
    ok(&req.id, Value::Object(out))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(
            &req.id,
            "bad_params",
            "unknown section",
            Some(json!({ "section": section_raw })),
        );
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, section.key(), &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(
        &req.id,
        json!({ "section": section.name(), "values": current }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mem_conn() -> rusqlite::Connection {
        let conn = rusqlite::Connection::open_in_memory().expect("open in-memory db");
        db::init_schema(&conn).expect("schema");
        conn
    }

    #[test]
    fn saved_grading_values_are_applied() {
        let conn = mem_conn();
        db::settings_set_json(
            &conn,
            SetupSection::Grading.key(),
            &json!({ "defaultSchoolYear": "2030-2031", "defaultTerm": 2 }),
        )
        .expect("save");
        let d = grading_defaults(&conn).expect("defaults");
        assert_eq!(d.school_year, "2030-2031");
        assert_eq!(d.term, 2);
        assert!(d.prefill_subjects);
    }

    #[test]
    fn malformed_saved_section_is_ignored_entirely() {
        let conn = mem_conn();
        // "defaultSchoolYear" sorts before the bad "defaultTerm".
        db::settings_set_json(
            &conn,
            SetupSection::Grading.key(),
            &json!({ "defaultSchoolYear": "2030-2031", "defaultTerm": 9 }),
        )
        .expect("save");
        assert_eq!(grading_defaults(&conn).expect("defaults"), ReportDefaults::default());

        db::settings_set_json(
            &conn,
            SetupSection::Reports.key(),
            &json!({ "includeInactiveInRanking": true, "showGeneratedAt": "yes" }),
        )
        .expect("save");
        let options = reports_options(&conn).expect("options");
        assert!(!options.include_inactive_in_ranking);
    }
}
