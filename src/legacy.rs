use crate::bulletin::{self, GradeReport, Track, UpsertMode};
use crate::gradebook::{ReportDefaults, MAX_TERM, MIN_TERM};
use serde::Deserialize;
use std::path::Path;

// Field names follow the dashboard's storage format.
#[derive(Debug, Deserialize)]
struct DashboardStudent {
    #[serde(default)]
    nom: String,
    #[serde(default)]
    prenom: String,
    #[serde(default)]
    section: String,
    #[serde(default)]
    classe: String,
    #[serde(default, rename = "dateNaissance")]
    date_naissance: Option<String>,
    #[serde(default)]
    statut: Option<String>,
    #[serde(default)]
    bulletin: Option<DashboardBulletin>,
}

#[derive(Debug, Deserialize)]
struct DashboardBulletin {
    #[serde(default)]
    annee: Option<String>,
    #[serde(default)]
    trimestre: Option<i64>,
    #[serde(default)]
    matieres: Vec<DashboardSubject>,
    #[serde(default)]
    appreciation: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DashboardSubject {
    #[serde(default)]
    nom: String,
    #[serde(default)]
    note: Option<f64>,
    #[serde(default)]
    coefficient: Option<i64>,
    #[serde(default)]
    appreciation: Option<String>,
}

pub struct ParsedStudent {
    pub last_name: String,
    pub first_name: String,
    pub track: Track,
    pub class_level: String,
    pub birth_date: Option<String>,
    pub active: bool,
    pub report: Option<GradeReport>,
}

pub struct ParsedExport {
    pub students: Vec<ParsedStudent>,
    pub skipped: usize,
    pub warnings: Vec<String>,
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

pub fn parse_dashboard_export(
    path: &Path,
    defaults: &ReportDefaults,
) -> anyhow::Result<ParsedExport> {
    let bytes = std::fs::read(path)?;
    let root: serde_json::Value = serde_json::from_slice(&bytes)?;
    let Some(records) = root.as_array() else {
        anyhow::bail!("dashboard export must be a JSON array of students");
    };
    Ok(parse_dashboard_records(records, defaults))
}

pub fn parse_dashboard_records(
    records: &[serde_json::Value],
    defaults: &ReportDefaults,
) -> ParsedExport {
    let mut students = Vec::new();
    let mut skipped = 0;
    let mut warnings = Vec::new();

    for (i, raw) in records.iter().enumerate() {
        let record: DashboardStudent = match serde_json::from_value(raw.clone()) {
            Ok(v) => v,
            Err(e) => {
                skipped += 1;
                warnings.push(format!("record {}: unreadable ({})", i, e));
                continue;
            }
        };
        let last_name = record.nom.trim().to_string();
        let first_name = record.prenom.trim().to_string();
        if last_name.is_empty() || first_name.is_empty() {
            skipped += 1;
            warnings.push(format!("record {}: missing nom/prenom", i));
            continue;
        }
        let label = format!("record {} ({} {})", i, last_name, first_name);

        let track = match Track::parse(&record.section) {
            Some(t) => t,
            None => {
                warnings.push(format!(
                    "{}: unknown section '{}', using {}",
                    label,
                    record.section,
                    Track::FALLBACK.as_str()
                ));
                Track::FALLBACK
            }
        };

        let report = record
            .bulletin
            .map(|b| parse_bulletin(b, track, defaults, &label, &mut warnings));

        students.push(ParsedStudent {
            last_name,
            first_name,
            track,
            class_level: record.classe.trim().to_string(),
            birth_date: non_empty(record.date_naissance),
            active: record
                .statut
                .as_deref()
                .map(|s| s.trim().eq_ignore_ascii_case("actif"))
                .unwrap_or(true),
            report,
        });
    }

    ParsedExport {
        students,
        skipped,
        warnings,
    }
}

fn parse_bulletin(
    b: DashboardBulletin,
    track: Track,
    defaults: &ReportDefaults,
    label: &str,
    warnings: &mut Vec<String>,
) -> GradeReport {
    let term = match b.trimestre {
        None => defaults.term,
        Some(t) if (MIN_TERM..=MAX_TERM).contains(&t) => t as u8,
        Some(t) => {
            warnings.push(format!("{}: trimestre {} out of range, using {}", label, t, defaults.term));
            defaults.term
        }
    };
    let school_year = non_empty(b.annee).unwrap_or_else(|| defaults.school_year.clone());
    let mut report = GradeReport::new(school_year, term);
    report.remark = non_empty(b.appreciation);

    // An empty list means the bulletin was never graded.
    if b.matieres.is_empty() {
        if defaults.prefill_subjects {
            report.fill_default_subjects(track);
        }
        return report;
    }

    // Same validation as interactive "add subject".
    for m in b.matieres {
        let Some(note) = m.note else {
            warnings.push(format!("{}: subject '{}' skipped: missing note", label, m.nom));
            continue;
        };
        if let Err(e) = bulletin::upsert_score(&mut report, &m.nom, note, m.coefficient, UpsertMode::Add) {
            warnings.push(format!("{}: subject '{}' skipped: {}", label, m.nom, e));
            continue;
        }
        if let Some(remark) = m.appreciation.as_deref() {
            bulletin::set_remark(&mut report, &m.nom, Some(remark));
        }
    }
    report
}
