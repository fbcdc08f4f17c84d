use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

/// Grading configuration for one program/semester/year/medium cohort.
#[derive(Debug, Clone, PartialEq)]
pub struct Scheme {
    pub scheme_id: i64,
    pub program_id: i64,
    pub semester: i32,
    pub academic_year: String,
    pub medium_tag: Option<String>,
    pub name: Option<String>,
    pub max_internal: Option<f64>,
    pub max_external: Option<f64>,
    pub max_total: Option<f64>,
    /// Raw credit rule payload as entered by administrators.
    pub credit_rules: Option<String>,
    /// Raw grading band payload as entered by administrators.
    pub grading_scheme: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Subject {
    pub subject_id: i64,
    pub name: String,
    pub type_code: String,
    pub credits: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mark {
    pub mark_id: i64,
    pub student_id: String,
    pub subject_id: i64,
    pub scheme_id: i64,
    pub internal_marks: Option<f64>,
    pub external_marks: Option<f64>,
    pub total_marks: Option<f64>,
    pub is_absent: bool,
    pub grade_point: Option<f64>,
    pub grade_letter: Option<String>,
}

impl Mark {
    /// Marks that count towards the grade. Absence always counts as zero.
    pub fn effective_obtained(&self) -> f64 {
        if self.is_absent {
            0.0
        } else {
            self.total_marks.unwrap_or(0.0)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SemesterResult {
    pub result_id: Uuid,
    pub student_id: String,
    pub program_id: i64,
    pub scheme_id: i64,
    pub semester: i32,
    pub academic_year: String,
    pub attempt_no: i32,
    pub total_credits_registered: f64,
    pub total_credits_earned: f64,
    pub sgpa: f64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Limits {
    pub max_internal: Option<f64>,
    pub max_external: Option<f64>,
    pub max_total: Option<f64>,
    pub min_total: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RuleSpec {
    #[serde(deserialize_with = "crate::rules::lenient_number")]
    pub credit: f64,
    #[serde(rename = "type", default = "RuleSpec::all_types")]
    pub subject_type: String,
    #[serde(
        rename = "max_int",
        alias = "max_internal",
        default,
        deserialize_with = "crate::rules::lenient_number"
    )]
    pub max_internal: f64,
    #[serde(
        rename = "max_ext",
        alias = "max_external",
        default,
        deserialize_with = "crate::rules::lenient_number"
    )]
    pub max_external: f64,
    #[serde(
        rename = "max_tot",
        alias = "max_total",
        deserialize_with = "crate::rules::lenient_number"
    )]
    pub max_total: f64,
    #[serde(
        rename = "min_tot",
        alias = "min_total",
        default,
        deserialize_with = "crate::rules::lenient_optional_number"
    )]
    pub min_total: Option<f64>,
}

impl RuleSpec {
    pub const ALL_TYPES: &'static str = "All";

    fn all_types() -> String {
        Self::ALL_TYPES.to_string()
    }
}

/// A percentage threshold mapped to a letter grade and grade point.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Band {
    #[serde(
        rename = "min",
        alias = "min_percentage",
        deserialize_with = "crate::rules::lenient_number"
    )]
    pub min_percentage: f64,
    pub grade: String,
    #[serde(
        rename = "gp",
        alias = "grade_point",
        deserialize_with = "crate::rules::lenient_number"
    )]
    pub grade_point: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecalcOutcome {
    pub success: bool,
    pub message: String,
    pub processed: usize,
}
