//! Explicit input validators.
//!
//! Each validator returns the full list of field-level problems instead of
//! stopping at the first, so callers can report everything at once.

use std::collections::BTreeSet;

use crate::domain::entities::{ExamTypeConfig, Question};

/// Tolerance when checking that domain weights sum to 1.0.
const WEIGHT_SUM_EPSILON: f64 = 1e-3;

/// One field-level validation problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validates an exam-type config before generation.
pub fn validate_exam_type_config(config: &ExamTypeConfig) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if config.domains.is_empty() {
        errors.push(FieldError::new("domains", "at least one domain is required"));
    }
    if config.question_count == 0 {
        errors.push(FieldError::new("question_count", "must be greater than zero"));
    }
    if config.time_limit_minutes == 0 {
        errors.push(FieldError::new(
            "time_limit_minutes",
            "must be greater than zero",
        ));
    }
    if config.passing_score > 100 {
        errors.push(FieldError::new(
            "passing_score",
            "must be a percentage between 0 and 100",
        ));
    }

    let mut seen = BTreeSet::new();
    for domain in &config.domains {
        if !(0.0..=1.0).contains(&domain.weight) {
            errors.push(FieldError::new(
                format!("domains.{}.weight", domain.id),
                "must be between 0.0 and 1.0",
            ));
        }
        if !seen.insert(domain.id.as_str()) {
            errors.push(FieldError::new(
                format!("domains.{}", domain.id),
                "duplicate domain id",
            ));
        }
    }

    if !config.domains.is_empty() {
        let sum: f64 = config.domains.iter().map(|d| d.weight).sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_EPSILON {
            errors.push(FieldError::new(
                "domains",
                format!("weights must sum to 1.0 (got {sum:.4})"),
            ));
        }
    }

    errors
}

/// Validates that a selection only references the question's own option ids.
pub fn validate_selection(question: &Question, selected: &BTreeSet<String>) -> Vec<FieldError> {
    let option_ids: BTreeSet<&str> = question.options.iter().map(|o| o.id.as_str()).collect();
    selected
        .iter()
        .filter(|s| !option_ids.contains(s.as_str()))
        .map(|s| {
            FieldError::new(
                "selected",
                format!("'{s}' is not an option of question {}", question.id),
            )
        })
        .collect()
}
