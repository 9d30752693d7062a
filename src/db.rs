use crate::bulletin::Track;
use crate::gradebook::StudentRef;
use crate::store;
use chrono::{SecondsFormat, Utc};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::path::Path;

pub const DB_FILE_NAME: &str = "bulletind.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let conn = Connection::open(workspace.join(DB_FILE_NAME))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            last_name TEXT NOT NULL,
            first_name TEXT NOT NULL,
            track TEXT NOT NULL,
            class_level TEXT NOT NULL,
            student_no TEXT,
            birth_date TEXT,
            active INTEGER NOT NULL,
            sort_order INTEGER NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class_sort ON students(class_level, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS bulletins(
            student_id TEXT PRIMARY KEY,
            school_year TEXT NOT NULL,
            term INTEGER NOT NULL,
            remark TEXT,
            updated_at TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS bulletin_subjects(
            student_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            name TEXT NOT NULL,
            score REAL NOT NULL,
            coefficient INTEGER NOT NULL DEFAULT 1,
            remark TEXT,
            PRIMARY KEY(student_id, position),
            FOREIGN KEY(student_id) REFERENCES bulletins(student_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}

pub fn now_stamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row("SELECT value_json FROM settings WHERE key = ?", [key], |r| {
            r.get(0)
        })
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRow {
    pub id: String,
    pub last_name: String,
    pub first_name: String,
    pub display_name: String,
    pub track: String,
    pub class_level: String,
    pub student_no: Option<String>,
    pub birth_date: Option<String>,
    pub active: bool,
    pub sort_order: i64,
    pub updated_at: Option<String>,
}

impl StudentRow {
    pub fn grading_ref(&self) -> StudentRef {
        StudentRef {
            id: self.id.clone(),
            track: Track::from_label_lenient(&self.track),
            class_level: self.class_level.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewStudent {
    pub last_name: String,
    pub first_name: String,
    pub track: Track,
    pub class_level: String,
    pub student_no: Option<String>,
    pub birth_date: Option<String>,
    pub active: bool,
}

#[derive(Debug, Clone, Default)]
pub struct StudentPatch {
    pub last_name: Option<String>,
    pub first_name: Option<String>,
    pub track: Option<Track>,
    pub class_level: Option<String>,
    pub student_no: Option<Option<String>>,
    pub birth_date: Option<Option<String>>,
    pub active: Option<bool>,
}

impl StudentPatch {
    pub fn is_empty(&self) -> bool {
        self.last_name.is_none()
            && self.first_name.is_none()
            && self.track.is_none()
            && self.class_level.is_none()
            && self.student_no.is_none()
            && self.birth_date.is_none()
            && self.active.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StudentSort {
    #[default]
    SortOrder,
    Name,
}

#[derive(Debug, Clone, Default)]
pub struct StudentFilter {
    pub class_level: Option<String>,
    pub track: Option<Track>,
    pub search: Option<String>,
    pub sort: StudentSort,
}

const STUDENT_COLUMNS: &str = "id, last_name, first_name, track, class_level, student_no,
     birth_date, active, sort_order, updated_at";

fn student_from_row(r: &Row<'_>) -> rusqlite::Result<StudentRow> {
    let last_name: String = r.get(1)?;
    let first_name: String = r.get(2)?;
    Ok(StudentRow {
        id: r.get(0)?,
        display_name: format!("{}, {}", last_name, first_name),
        last_name,
        first_name,
        track: r.get(3)?,
        class_level: r.get(4)?,
        student_no: r.get(5)?,
        birth_date: r.get(6)?,
        active: r.get::<_, i64>(7)? != 0,
        sort_order: r.get(8)?,
        updated_at: r.get(9)?,
    })
}

pub fn list_students(conn: &Connection, filter: &StudentFilter) -> anyhow::Result<Vec<StudentRow>> {
    let mut clauses: Vec<&str> = Vec::new();
    let mut binds: Vec<Value> = Vec::new();
    if let Some(level) = &filter.class_level {
        clauses.push("class_level = ?");
        binds.push(Value::Text(level.clone()));
    }
    if let Some(track) = filter.track {
        clauses.push("track = ?");
        binds.push(Value::Text(track.as_str().to_string()));
    }
    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        clauses.push("(lower(last_name) LIKE ? OR lower(first_name) LIKE ? OR lower(COALESCE(student_no, '')) LIKE ?)");
        let pattern = format!("%{}%", search.to_lowercase());
        for _ in 0..3 {
            binds.push(Value::Text(pattern.clone()));
        }
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    let order_sql = match filter.sort {
        StudentSort::SortOrder => "ORDER BY class_level, sort_order",
        StudentSort::Name => "ORDER BY last_name COLLATE NOCASE, first_name COLLATE NOCASE",
    };
    let sql = format!(
        "SELECT {} FROM students {} {}",
        STUDENT_COLUMNS, where_sql, order_sql
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(binds), student_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_student(conn: &Connection, student_id: &str) -> anyhow::Result<Option<StudentRow>> {
    let sql = format!("SELECT {} FROM students WHERE id = ?", STUDENT_COLUMNS);
    Ok(conn
        .query_row(&sql, [student_id], student_from_row)
        .optional()?)
}

pub fn insert_student(conn: &Connection, student: &NewStudent) -> anyhow::Result<String> {
    let sort_order: i64 = conn.query_row(
        "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM students WHERE class_level = ?",
        [&student.class_level],
        |r| r.get(0),
    )?;
    let id = uuid::Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO students(
           id, last_name, first_name, track, class_level,
           student_no, birth_date, active, sort_order, updated_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            &student.last_name,
            &student.first_name,
            student.track.as_str(),
            &student.class_level,
            student.student_no.as_deref(),
            student.birth_date.as_deref(),
            if student.active { 1 } else { 0 },
            sort_order,
            now_stamp(),
        ),
    )?;
    Ok(id)
}

/// Applies the set fields of `patch`. Returns false when the student does not exist.
pub fn update_student(conn: &Connection, student_id: &str, patch: &StudentPatch) -> anyhow::Result<bool> {
    let mut sets: Vec<&str> = Vec::new();
    let mut binds: Vec<Value> = Vec::new();

    if let Some(v) = &patch.last_name {
        sets.push("last_name = ?");
        binds.push(Value::Text(v.clone()));
    }
    if let Some(v) = &patch.first_name {
        sets.push("first_name = ?");
        binds.push(Value::Text(v.clone()));
    }
    if let Some(v) = patch.track {
        sets.push("track = ?");
        binds.push(Value::Text(v.as_str().to_string()));
    }
    if let Some(v) = &patch.class_level {
        sets.push("class_level = ?");
        binds.push(Value::Text(v.clone()));
        let current: Option<String> = conn
            .query_row(
                "SELECT class_level FROM students WHERE id = ?",
                [student_id],
                |r| r.get(0),
            )
            .optional()?;
        // A moved student goes to the end of its new class.
        if current.is_some_and(|c| c != *v) {
            let sort_order: i64 = conn.query_row(
                "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM students WHERE class_level = ?",
                [v],
                |r| r.get(0),
            )?;
            sets.push("sort_order = ?");
            binds.push(Value::Integer(sort_order));
        }
    }
    if let Some(v) = &patch.student_no {
        sets.push("student_no = ?");
        binds.push(v.clone().map(Value::Text).unwrap_or(Value::Null));
    }
    if let Some(v) = &patch.birth_date {
        sets.push("birth_date = ?");
        binds.push(v.clone().map(Value::Text).unwrap_or(Value::Null));
    }
    if let Some(v) = patch.active {
        sets.push("active = ?");
        binds.push(Value::Integer(if v { 1 } else { 0 }));
    }
    sets.push("updated_at = ?");
    binds.push(Value::Text(now_stamp()));
    binds.push(Value::Text(student_id.to_string()));

    let sql = format!("UPDATE students SET {} WHERE id = ?", sets.join(", "));
    let changed = conn.execute(&sql, params_from_iter(binds))?;
    Ok(changed > 0)
}

/// Deletes the student together with its report. Returns false when the student does not exist.
pub fn delete_student(conn: &Connection, student_id: &str) -> anyhow::Result<bool> {
    let tx = conn.unchecked_transaction()?;
    store::delete_report_rows(&tx, student_id)?;
    let changed = tx.execute("DELETE FROM students WHERE id = ?", [student_id])?;
    tx.commit()?;
    Ok(changed > 0)
}
