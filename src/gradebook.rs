use crate::bulletin::{self, GradeReport, Track, UpsertMode, UpsertOutcome};
use crate::error::BulletinError;
use crate::store::ReportStore;
use serde::Serialize;
use std::cmp::Ordering;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const MIN_TERM: i64 = 1;
pub const MAX_TERM: i64 = 3;

#[derive(Debug, Error)]
pub enum GradebookError {
    #[error(transparent)]
    Rejected(#[from] BulletinError),

    #[error("term must be in 1..=3, got {0}")]
    InvalidTerm(i64),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// What the grading flow needs to know about a student.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentRef {
    pub id: String,
    pub track: Track,
    pub class_level: String,
}

/// Values used when a report has to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportDefaults {
    pub school_year: String,
    pub term: u8,
    pub prefill_subjects: bool,
}

impl Default for ReportDefaults {
    fn default() -> Self {
        Self {
            school_year: "2023-2024".to_string(),
            term: 1,
            prefill_subjects: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SubjectInput<'a> {
    pub name: &'a str,
    pub score: f64,
    pub coefficient: Option<i64>,
    /// `Some("")` clears an existing remark.
    pub remark: Option<&'a str>,
}

#[derive(Debug, Clone, Default)]
pub struct ReportMeta {
    pub school_year: Option<String>,
    pub term: Option<i64>,
    pub remark: Option<Option<String>>,
}

/// Loads the student's report, creating and saving a fresh one on first view.
pub fn open_report<S: ReportStore>(
    store: &mut S,
    student: &StudentRef,
    defaults: &ReportDefaults,
) -> Result<GradeReport, GradebookError> {
    if let Some(report) = store.load(&student.id)? {
        return Ok(report);
    }
    let report = if defaults.prefill_subjects {
        GradeReport::with_default_subjects(student.track, defaults.school_year.clone(), defaults.term)
    } else {
        GradeReport::new(defaults.school_year.clone(), defaults.term)
    };
    store.save(&student.id, &report)?;
    info!(
        student_id = %student.id,
        track = student.track.as_str(),
        subjects = report.subjects.len(),
        "created report"
    );
    Ok(report)
}

fn apply_subject<S: ReportStore>(
    store: &mut S,
    student: &StudentRef,
    defaults: &ReportDefaults,
    input: SubjectInput<'_>,
    mode: UpsertMode,
) -> Result<GradeReport, GradebookError> {
    let mut report = open_report(store, student, defaults)?;
    let outcome = match bulletin::upsert_score(
        &mut report,
        input.name,
        input.score,
        input.coefficient,
        mode,
    ) {
        Ok(v) => v,
        Err(e) => {
            warn!(student_id = %student.id, subject = input.name, code = e.code(), "rejected subject score");
            return Err(e.into());
        }
    };
    if let Some(remark) = input.remark {
        bulletin::set_remark(&mut report, input.name, Some(remark));
    }
    store.save(&student.id, &report)?;
    debug!(
        student_id = %student.id,
        subject = input.name.trim(),
        inserted = outcome == UpsertOutcome::Inserted,
        "saved subject score"
    );
    Ok(report)
}

/// "Add subject": an already-present name is rejected.
pub fn add_subject<S: ReportStore>(
    store: &mut S,
    student: &StudentRef,
    defaults: &ReportDefaults,
    input: SubjectInput<'_>,
) -> Result<GradeReport, GradebookError> {
    apply_subject(store, student, defaults, input, UpsertMode::Add)
}

/// "Edit subject score": an already-present name is overwritten.
pub fn edit_subject<S: ReportStore>(
    store: &mut S,
    student: &StudentRef,
    defaults: &ReportDefaults,
    input: SubjectInput<'_>,
) -> Result<GradeReport, GradebookError> {
    apply_subject(store, student, defaults, input, UpsertMode::Edit)
}

pub fn remove_subject<S: ReportStore>(
    store: &mut S,
    student: &StudentRef,
    defaults: &ReportDefaults,
    name: &str,
) -> Result<(GradeReport, bool), GradebookError> {
    let mut report = open_report(store, student, defaults)?;
    let removed = bulletin::remove_score(&mut report, name);
    if removed {
        store.save(&student.id, &report)?;
    }
    Ok((report, removed))
}

pub fn update_report_meta<S: ReportStore>(
    store: &mut S,
    student: &StudentRef,
    defaults: &ReportDefaults,
    meta: &ReportMeta,
) -> Result<GradeReport, GradebookError> {
    let term = match meta.term {
        Some(t) if !(MIN_TERM..=MAX_TERM).contains(&t) => {
            return Err(GradebookError::InvalidTerm(t))
        }
        Some(t) => Some(t as u8),
        None => None,
    };

    let mut report = open_report(store, student, defaults)?;
    if let Some(year) = &meta.school_year {
        report.school_year = year.trim().to_string();
    }
    if let Some(t) = term {
        report.term = t;
    }
    if let Some(remark) = &meta.remark {
        report.remark = remark
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string);
    }
    store.save(&student.id, &report)?;
    Ok(report)
}

/// Replaces the subject list with the track defaults, keeping year, term and remark.
pub fn reset_report<S: ReportStore>(
    store: &mut S,
    student: &StudentRef,
    defaults: &ReportDefaults,
) -> Result<GradeReport, GradebookError> {
    let mut report = open_report(store, student, defaults)?;
    report.fill_default_subjects(student.track);
    store.save(&student.id, &report)?;
    info!(student_id = %student.id, "reset report to default subjects");
    Ok(report)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankRow {
    pub student_id: String,
    pub average: f64,
    pub subject_count: usize,
    /// `None` for students whose report has no subjects.
    pub rank: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ranking {
    pub class_size: usize,
    pub rows: Vec<RankRow>,
}

impl Ranking {
    pub fn rank_of(&self, student_id: &str) -> Option<usize> {
        self.rows
            .iter()
            .find(|r| r.student_id == student_id)
            .and_then(|r| r.rank)
    }
}

/// Competition ranking (1, 2, 2, 4) by unrounded average, highest first.
/// Students without subjects are listed last, unranked, in input order.
pub fn rank_students(entries: &[(String, GradeReport)]) -> Ranking {
    let mut scored: Vec<RankRow> = Vec::new();
    let mut unranked: Vec<RankRow> = Vec::new();
    for (student_id, report) in entries {
        let row = RankRow {
            student_id: student_id.clone(),
            average: report.average(),
            subject_count: report.subjects.len(),
            rank: None,
        };
        if row.subject_count == 0 {
            unranked.push(row);
        } else {
            scored.push(row);
        }
    }

    // Stable sort keeps input order among ties.
    scored.sort_by(|a, b| b.average.partial_cmp(&a.average).unwrap_or(Ordering::Equal));
    let mut previous: Option<f64> = None;
    let mut current_rank = 0;
    for (i, row) in scored.iter_mut().enumerate() {
        if previous != Some(row.average) {
            current_rank = i + 1;
            previous = Some(row.average);
        }
        row.rank = Some(current_rank);
    }

    let class_size = scored.len();
    scored.extend(unranked);
    Ranking {
        class_size,
        rows: scored,
    }
}
