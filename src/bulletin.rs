use crate::error::BulletinError;
use serde::{Deserialize, Serialize};

pub const MIN_SCORE: f64 = 0.0;
pub const MAX_SCORE: f64 = 20.0;

const FRANCOPHONE_SUBJECTS: &[&str] = &[
    "Mathématiques",
    "Français",
    "Anglais",
    "Éducation Civique",
    "Sciences d'Observation",
    "Histoire-Géographie",
    "Éducation Physique",
    "Arts Plastiques",
    "Musique",
];

const ANGLOPHONE_SUBJECTS: &[&str] = &[
    "Mathematics",
    "English Language",
    "Science",
    "Social Studies",
    "Civic Education",
    "Physical Education",
    "Arts",
    "Music",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Track {
    Francophone,
    Anglophone,
}

impl Track {
    /// Track used when a label is not recognised.
    pub const FALLBACK: Track = Track::Anglophone;

    pub fn parse(s: &str) -> Option<Self> {
        let t = s.trim();
        if t.eq_ignore_ascii_case("francophone") {
            Some(Track::Francophone)
        } else if t.eq_ignore_ascii_case("anglophone") {
            Some(Track::Anglophone)
        } else {
            None
        }
    }

    pub fn from_label_lenient(s: &str) -> Self {
        Self::parse(s).unwrap_or(Self::FALLBACK)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Track::Francophone => "Francophone",
            Track::Anglophone => "Anglophone",
        }
    }
}

/// Ordered subject list used to pre-populate a new report for `track`.
pub fn default_subjects(track: Track) -> &'static [&'static str] {
    match track {
        Track::Francophone => FRANCOPHONE_SUBJECTS,
        Track::Anglophone => ANGLOPHONE_SUBJECTS,
    }
}

pub fn default_subjects_for_label(label: &str) -> &'static [&'static str] {
    default_subjects(Track::from_label_lenient(label))
}

/// Performance band shared by per-subject tiers and overall mentions.
/// Variants are ordered from lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Band {
    Insufficient,
    Satisfactory,
    Good,
    VeryGood,
    Excellent,
}

// Highest first; first match wins.
const BAND_FLOORS: [(f64, Band); 4] = [
    (16.0, Band::Excellent),
    (14.0, Band::VeryGood),
    (12.0, Band::Good),
    (10.0, Band::Satisfactory),
];

impl Band {
    pub fn of(value: f64) -> Band {
        for (floor, band) in BAND_FLOORS {
            if value >= floor {
                return band;
            }
        }
        Band::Insufficient
    }

    /// Inclusive lower bound of the band, `None` for the open bottom band.
    pub fn floor(self) -> Option<f64> {
        BAND_FLOORS
            .iter()
            .find(|(_, b)| *b == self)
            .map(|(floor, _)| *floor)
    }

    pub fn tier_label(self) -> &'static str {
        match self {
            Band::Excellent => "Excellent",
            Band::VeryGood => "Very Good",
            Band::Good => "Good",
            Band::Satisfactory => "Satisfactory",
            Band::Insufficient => "Insufficient",
        }
    }

    pub fn mention_label(self) -> &'static str {
        match self {
            Band::Excellent => "Congratulations",
            Band::VeryGood => "Compliments",
            Band::Good => "Encouragement",
            Band::Satisfactory => "Satisfactory work",
            Band::Insufficient => "Needs improvement",
        }
    }

    fn rationale(self, value: f64) -> String {
        match self.floor() {
            Some(floor) => format!("{} >= {}", value, floor),
            None => format!("{} < 10", value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TierClass {
    pub band: Band,
    pub tier: &'static str,
    pub rationale: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MentionClass {
    pub band: Band,
    pub mention: &'static str,
    pub rationale: String,
}

/// Tier for a single subject score. Range is the caller's concern.
pub fn classify_score(score: f64) -> TierClass {
    let band = Band::of(score);
    TierClass {
        band,
        tier: band.tier_label(),
        rationale: band.rationale(score),
    }
}

/// Mention for an overall average. The empty-report sentinel `0.0` lands in
/// the lowest band like any other zero.
pub fn classify_average(average: f64) -> MentionClass {
    let band = Band::of(average);
    MentionClass {
        band,
        mention: band.mention_label(),
        rationale: band.rationale(average),
    }
}

fn default_coefficient() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectScore {
    pub name: String,
    pub score: f64,
    #[serde(default = "default_coefficient")]
    pub coefficient: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remark: Option<String>,
}

impl SubjectScore {
    pub fn new(name: impl Into<String>, score: f64) -> Self {
        Self {
            name: name.into(),
            score,
            coefficient: 1,
            remark: None,
        }
    }

    pub fn weighted(name: impl Into<String>, score: f64, coefficient: u32) -> Self {
        Self {
            coefficient,
            ..Self::new(name, score)
        }
    }
}

/// Coefficient-weighted mean of the scores, `0.0` when there are none.
/// Not rounded. The result does not depend on the order of `scores`.
pub fn compute_average(scores: &[SubjectScore]) -> f64 {
    let mut terms: Vec<f64> = Vec::with_capacity(scores.len());
    let mut denom: u64 = 0;
    for s in scores {
        let weight = s.coefficient.max(1);
        terms.push(s.score * weight as f64);
        denom += u64::from(weight);
    }
    if denom == 0 {
        return 0.0;
    }
    // Float addition is not associative; sum in a canonical order.
    terms.sort_by(f64::total_cmp);
    let sum: f64 = terms.iter().sum();
    sum / denom as f64
}

/// `Int(100*x + 0.5) / 100`, for presentation only.
pub fn round_off_2_decimals(x: f64) -> f64 {
    ((100.0 * x) + 0.5).floor() / 100.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeReport {
    pub school_year: String,
    pub term: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remark: Option<String>,
    #[serde(default)]
    pub subjects: Vec<SubjectScore>,
}

impl GradeReport {
    pub fn new(school_year: impl Into<String>, term: u8) -> Self {
        Self {
            school_year: school_year.into(),
            term,
            remark: None,
            subjects: Vec::new(),
        }
    }

    /// Fresh report holding the track's default subjects, each scored 0.
    pub fn with_default_subjects(track: Track, school_year: impl Into<String>, term: u8) -> Self {
        let mut report = Self::new(school_year, term);
        report.fill_default_subjects(track);
        report
    }

    pub fn fill_default_subjects(&mut self, track: Track) {
        self.subjects = default_subjects(track)
            .iter()
            .map(|name| SubjectScore::new(*name, 0.0))
            .collect();
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.subjects.iter().position(|s| same_subject(&s.name, name))
    }

    pub fn get(&self, name: &str) -> Option<&SubjectScore> {
        self.position(name).map(|i| &self.subjects[i])
    }

    pub fn average(&self) -> f64 {
        compute_average(&self.subjects)
    }

    pub fn summary(&self) -> ReportSummary {
        ReportSummary::of(self)
    }
}

fn same_subject(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertMode {
    /// New subject; an existing name is rejected.
    Add,
    /// Score edit; an existing name is overwritten in place, a missing one appended.
    Edit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

fn validate_score(score: f64) -> Result<f64, BulletinError> {
    if !score.is_finite() || !(MIN_SCORE..=MAX_SCORE).contains(&score) {
        return Err(BulletinError::OutOfRangeScore { score });
    }
    Ok(score)
}

fn validate_coefficient(coefficient: Option<i64>) -> Result<Option<u32>, BulletinError> {
    let Some(c) = coefficient else {
        return Ok(None);
    };
    match u32::try_from(c) {
        Ok(v) if v >= 1 => Ok(Some(v)),
        _ => Err(BulletinError::InvalidCoefficient { coefficient: c }),
    }
}

/// Validates and applies one subject score. All checks run before anything
/// is written, so a rejection leaves `report` exactly as it was.
pub fn upsert_score(
    report: &mut GradeReport,
    subject_name: &str,
    score: f64,
    coefficient: Option<i64>,
    mode: UpsertMode,
) -> Result<UpsertOutcome, BulletinError> {
    let name = subject_name.trim();
    if name.is_empty() {
        return Err(BulletinError::EmptyName);
    }
    let score = validate_score(score)?;
    let coefficient = validate_coefficient(coefficient)?;

    match (report.position(name), mode) {
        (Some(i), UpsertMode::Add) => Err(BulletinError::DuplicateSubject {
            name: report.subjects[i].name.clone(),
        }),
        (Some(i), UpsertMode::Edit) => {
            let existing = &mut report.subjects[i];
            existing.score = score;
            if let Some(c) = coefficient {
                existing.coefficient = c;
            }
            Ok(UpsertOutcome::Updated)
        }
        (None, _) => {
            report.subjects.push(SubjectScore::weighted(
                name,
                score,
                coefficient.unwrap_or(1),
            ));
            Ok(UpsertOutcome::Inserted)
        }
    }
}

/// Removes the first case-insensitive match. Returns whether anything was removed.
pub fn remove_score(report: &mut GradeReport, subject_name: &str) -> bool {
    match report.position(subject_name) {
        Some(i) => {
            report.subjects.remove(i);
            true
        }
        None => false,
    }
}

/// Sets or clears a subject's remark. Returns false when the subject is absent.
pub fn set_remark(report: &mut GradeReport, subject_name: &str, remark: Option<&str>) -> bool {
    let Some(i) = report.position(subject_name) else {
        return false;
    };
    report.subjects[i].remark = remark
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty());
    true
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectView {
    pub name: String,
    pub score: f64,
    pub coefficient: u32,
    pub remark: Option<String>,
    pub tier: TierClass,
}

/// Derived read-only view of a report. Always recomputed from the scores.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub subjects: Vec<SubjectView>,
    pub subject_count: usize,
    pub average: f64,
    pub average_display: String,
    pub mention: Option<MentionClass>,
}

impl ReportSummary {
    pub fn of(report: &GradeReport) -> Self {
        let subjects: Vec<SubjectView> = report
            .subjects
            .iter()
            .map(|s| SubjectView {
                name: s.name.clone(),
                score: s.score,
                coefficient: s.coefficient,
                remark: s.remark.clone(),
                tier: classify_score(s.score),
            })
            .collect();
        let average = report.average();
        let (average_display, mention) = if subjects.is_empty() {
            ("—".to_string(), None)
        } else {
            (
                format!("{:.2}", round_off_2_decimals(average)),
                Some(classify_average(average)),
            )
        };
        ReportSummary {
            subject_count: subjects.len(),
            subjects,
            average,
            average_display,
            mention,
        }
    }
}
