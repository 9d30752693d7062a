use crate::db::{self, NewStudent};
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::setup::grading_defaults;
use crate::ipc::helpers::{db_conn, required_str};
use crate::ipc::types::{AppState, Request};
use crate::legacy::{self, ParsedExport};
use crate::store;
use rusqlite::Connection;
use serde_json::json;
use std::path::PathBuf;
use tracing::{info, warn};

struct ImportCounts {
    imported: usize,
    reports: usize,
}

fn write_export(conn: &Connection, parsed: &ParsedExport) -> anyhow::Result<ImportCounts> {
    let tx = conn.unchecked_transaction()?;
    let mut counts = ImportCounts {
        imported: 0,
        reports: 0,
    };
    for s in &parsed.students {
        let student_id = db::insert_student(
            &tx,
            &NewStudent {
                last_name: s.last_name.clone(),
                first_name: s.first_name.clone(),
                track: s.track,
                class_level: s.class_level.clone(),
                student_no: None,
                birth_date: s.birth_date.clone(),
                active: s.active,
            },
        )?;
        counts.imported += 1;
        if let Some(report) = &s.report {
            store::write_report(&tx, &student_id, report)?;
            counts.reports += 1;
        }
    }
    tx.commit()?;
    Ok(counts)
}

fn handle_import_dashboard_json(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let path = match required_str(req, "path") {
        Ok(v) => PathBuf::from(v),
        Err(e) => return e,
    };
    let defaults = match grading_defaults(conn) {
        Ok(d) => d,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let parsed = match legacy::parse_dashboard_export(&path, &defaults) {
        Ok(v) => v,
        Err(e) => {
            return err(
                &req.id,
                "import_parse_failed",
                e.to_string(),
                Some(json!({ "path": path.to_string_lossy() })),
            )
        }
    };
    for w in &parsed.warnings {
        warn!(path = %path.display(), "{}", w);
    }

    let counts = match write_export(conn, &parsed) {
        Ok(c) => c,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    info!(
        path = %path.display(),
        imported = counts.imported,
        reports = counts.reports,
        skipped = parsed.skipped,
        "dashboard export imported"
    );

    ok(
        &req.id,
        json!({
            "imported": counts.imported,
            "reports": counts.reports,
            "skipped": parsed.skipped,
            "warnings": parsed.warnings,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "import.dashboardJson" => Some(handle_import_dashboard_json(state, req)),
        _ => None,
    }
}
