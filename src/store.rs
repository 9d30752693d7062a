use crate::bulletin::{GradeReport, SubjectScore};
use crate::db;
use rusqlite::{Connection, OptionalExtension};
use std::collections::HashMap;

/// Where grade reports live between engine calls. Reports are keyed by the
/// owning student's id and have no identity of their own.
pub trait ReportStore {
    fn load(&self, student_id: &str) -> anyhow::Result<Option<GradeReport>>;
    fn save(&mut self, student_id: &str, report: &GradeReport) -> anyhow::Result<()>;
    fn delete(&mut self, student_id: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryReportStore {
    reports: HashMap<String, GradeReport>,
}

impl MemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }
}

impl ReportStore for MemoryReportStore {
    fn load(&self, student_id: &str) -> anyhow::Result<Option<GradeReport>> {
        Ok(self.reports.get(student_id).cloned())
    }

    fn save(&mut self, student_id: &str, report: &GradeReport) -> anyhow::Result<()> {
        self.reports.insert(student_id.to_string(), report.clone());
        Ok(())
    }

    fn delete(&mut self, student_id: &str) -> anyhow::Result<()> {
        self.reports.remove(student_id);
        Ok(())
    }
}

pub struct SqliteReportStore<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteReportStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

pub(crate) fn delete_report_rows(conn: &Connection, student_id: &str) -> rusqlite::Result<()> {
    conn.execute(
        "DELETE FROM bulletin_subjects WHERE student_id = ?",
        [student_id],
    )?;
    conn.execute("DELETE FROM bulletins WHERE student_id = ?", [student_id])?;
    Ok(())
}

/// Writes the head row and replaces all subject rows. Callers own the transaction.
pub(crate) fn write_report(
    conn: &Connection,
    student_id: &str,
    report: &GradeReport,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO bulletins(student_id, school_year, term, remark, updated_at)
         VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(student_id) DO UPDATE SET
           school_year = excluded.school_year,
           term = excluded.term,
           remark = excluded.remark,
           updated_at = excluded.updated_at",
        (
            student_id,
            &report.school_year,
            report.term as i64,
            report.remark.as_deref(),
            db::now_stamp(),
        ),
    )?;
    conn.execute(
        "DELETE FROM bulletin_subjects WHERE student_id = ?",
        [student_id],
    )?;
    let mut insert = conn.prepare(
        "INSERT INTO bulletin_subjects(student_id, position, name, score, coefficient, remark)
         VALUES(?, ?, ?, ?, ?, ?)",
    )?;
    for (i, s) in report.subjects.iter().enumerate() {
        insert.execute((
            student_id,
            i as i64,
            &s.name,
            s.score,
            s.coefficient as i64,
            s.remark.as_deref(),
        ))?;
    }
    Ok(())
}

impl ReportStore for SqliteReportStore<'_> {
    fn load(&self, student_id: &str) -> anyhow::Result<Option<GradeReport>> {
        let head: Option<(String, i64, Option<String>)> = self
            .conn
            .query_row(
                "SELECT school_year, term, remark FROM bulletins WHERE student_id = ?",
                [student_id],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .optional()?;
        let Some((school_year, term, remark)) = head else {
            return Ok(None);
        };

        let mut stmt = self.conn.prepare(
            "SELECT name, score, coefficient, remark
             FROM bulletin_subjects
             WHERE student_id = ?
             ORDER BY position",
        )?;
        let subjects = stmt
            .query_map([student_id], |r| {
                let coefficient: i64 = r.get(2)?;
                Ok(SubjectScore {
                    name: r.get(0)?,
                    score: r.get(1)?,
                    coefficient: u32::try_from(coefficient).unwrap_or(1).max(1),
                    remark: r.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(GradeReport {
            school_year,
            term: u8::try_from(term).unwrap_or(1),
            remark,
            subjects,
        }))
    }

    fn save(&mut self, student_id: &str, report: &GradeReport) -> anyhow::Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        write_report(&tx, student_id, report)?;
        tx.commit()?;
        Ok(())
    }

    fn delete(&mut self, student_id: &str) -> anyhow::Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        delete_report_rows(&tx, student_id)?;
        tx.commit()?;
        Ok(())
    }
}
