use thiserror::Error;

/// Validation rejections raised by report mutations.
///
/// A rejected mutation never touches the report it was applied to.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BulletinError {
    #[error("score {score} is outside 0..=20")]
    OutOfRangeScore { score: f64 },

    #[error("subject name must not be empty")]
    EmptyName,

    #[error("subject already present: {name}")]
    DuplicateSubject { name: String },

    #[error("coefficient must be >= 1, got {coefficient}")]
    InvalidCoefficient { coefficient: i64 },
}

impl BulletinError {
    pub fn code(&self) -> &'static str {
        match self {
            BulletinError::OutOfRangeScore { .. } => "out_of_range_score",
            BulletinError::EmptyName => "empty_name",
            BulletinError::DuplicateSubject { .. } => "duplicate_subject",
            BulletinError::InvalidCoefficient { .. } => "invalid_coefficient",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            BulletinError::OutOfRangeScore { score } => {
                Some(serde_json::json!({ "score": score, "min": 0, "max": 20 }))
            }
            BulletinError::EmptyName => None,
            BulletinError::DuplicateSubject { name } => Some(serde_json::json!({ "name": name })),
            BulletinError::InvalidCoefficient { coefficient } => {
                Some(serde_json::json!({ "coefficient": coefficient }))
            }
        }
    }
}
