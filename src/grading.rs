use serde_json::Value;
use tracing::warn;

use crate::error::RuleDataError;
use crate::models::{Band, Scheme};
use crate::rules::{json_kind, parse_entries};

pub const FAIL_GRADE: &str = "F";

/// Standard 10-point scale, inclusive lower bounds in percent.
const DEFAULT_SCALE: [(f64, f64, &str); 6] = [
    (90.0, 10.0, "O"),
    (80.0, 9.0, "A+"),
    (70.0, 8.0, "A"),
    (60.0, 7.0, "B+"),
    (50.0, 6.0, "B"),
    (40.0, 5.0, "C"),
];

/// Converts obtained marks into a grade point and letter.
///
/// Custom bands are tried first, highest threshold first. When none apply the
/// default 10-point scale is used.
pub fn evaluate(obtained: f64, max_marks: f64, bands: Option<&[Band]>) -> (f64, String) {
    if max_marks <= 0.0 {
        return (0.0, FAIL_GRADE.to_string());
    }

    let percentage = obtained / max_marks * 100.0;

    if let Some(bands) = bands {
        let mut sorted: Vec<&Band> = bands.iter().collect();
        sorted.sort_by(|a, b| b.min_percentage.total_cmp(&a.min_percentage));
        if let Some(band) = sorted.iter().find(|band| band.min_percentage <= percentage) {
            return (band.grade_point, band.grade.clone());
        }
    }

    DEFAULT_SCALE
        .iter()
        .find(|(min, _, _)| percentage >= *min)
        .map(|(_, point, letter)| (*point, letter.to_string()))
        .unwrap_or_else(|| (0.0, FAIL_GRADE.to_string()))
}

/// Accepts either a bare list of bands or an object with a `bands` list.
pub fn parse_grading_bands(raw: &str) -> Result<Vec<Band>, RuleDataError> {
    let value: Value = serde_json::from_str(raw)?;
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => Ok(parse_entries(items, "grading band")),
        Value::Object(mut map) => match map.remove("bands") {
            Some(Value::Array(items)) => Ok(parse_entries(items, "grading band")),
            Some(other) => Err(RuleDataError::NotAList(json_kind(&other))),
            None => Err(RuleDataError::NotAList("an object without `bands`")),
        },
        other => Err(RuleDataError::NotAList(json_kind(&other))),
    }
}

pub fn scheme_bands(scheme: &Scheme) -> Option<Vec<Band>> {
    let raw = scheme.grading_scheme.as_deref().map(str::trim)?;
    if raw.is_empty() {
        return None;
    }

    match parse_grading_bands(raw) {
        Ok(bands) if bands.is_empty() => None,
        Ok(bands) => Some(bands),
        Err(err) => {
            warn!(
                scheme_id = scheme.scheme_id,
                error = %err,
                "ignoring unreadable grading bands, using default scale"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn band(min: f64, grade: &str, point: f64) -> Band {
        Band {
            min_percentage: min,
            grade: grade.to_string(),
            grade_point: point,
        }
    }

    #[test]
    fn non_positive_max_is_always_a_fail() {
        for obtained in [0.0, 50.0, 100.0, -3.0] {
            assert_eq!(evaluate(obtained, 0.0, None), (0.0, "F".to_string()));
            assert_eq!(evaluate(obtained, -10.0, None), (0.0, "F".to_string()));
        }
    }

    #[test]
    fn default_scale_boundaries_are_inclusive() {
        assert_eq!(evaluate(90.0, 100.0, None), (10.0, "O".to_string()));
        assert_eq!(evaluate(89.999, 100.0, None), (9.0, "A+".to_string()));
        assert_eq!(evaluate(80.0, 100.0, None), (9.0, "A+".to_string()));
        assert_eq!(evaluate(70.0, 100.0, None), (8.0, "A".to_string()));
        assert_eq!(evaluate(60.0, 100.0, None), (7.0, "B+".to_string()));
        assert_eq!(evaluate(50.0, 100.0, None), (6.0, "B".to_string()));
        assert_eq!(evaluate(40.0, 100.0, None), (5.0, "C".to_string()));
        assert_eq!(evaluate(39.99, 100.0, None), (0.0, "F".to_string()));
    }

    #[test]
    fn percentage_uses_max_marks() {
        assert_eq!(evaluate(36.0, 40.0, None), (10.0, "O".to_string()));
        assert_eq!(evaluate(68.0, 80.0, None), (9.0, "A+".to_string()));
    }

    #[test]
    fn custom_bands_are_sorted_before_matching() {
        let bands = vec![
            band(0.0, "E", 1.0),
            band(75.0, "Distinction", 9.5),
            band(50.0, "Pass", 6.0),
        ];
        assert_eq!(evaluate(80.0, 100.0, Some(&bands)), (9.5, "Distinction".to_string()));
        assert_eq!(evaluate(55.0, 100.0, Some(&bands)), (6.0, "Pass".to_string()));
        assert_eq!(evaluate(10.0, 100.0, Some(&bands)), (1.0, "E".to_string()));
    }

    #[test]
    fn unmatched_custom_bands_fall_through_to_default_scale() {
        let bands = vec![band(95.0, "S", 10.0)];
        assert_eq!(evaluate(85.0, 100.0, Some(&bands)), (9.0, "A+".to_string()));
    }

    #[test]
    fn bands_parse_from_list_or_wrapped_object() {
        let listed = parse_grading_bands(r#"[{"min": 50, "grade": "P", "gp": 5}]"#).unwrap();
        let wrapped =
            parse_grading_bands(r#"{"bands": [{"min_percentage": 50, "grade": "P", "grade_point": 5}]}"#)
                .unwrap();
        assert_eq!(listed, wrapped);
        assert_eq!(listed, vec![band(50.0, "P", 5.0)]);
    }

    #[test]
    fn invalid_bands_are_dropped() {
        let bands = parse_grading_bands(
            r#"[{"min": 90, "grade": "O"}, {"min": "x", "grade": "A", "gp": 9}, {"min": 40, "grade": "C", "gp": 5}]"#,
        )
        .unwrap();
        assert_eq!(bands, vec![band(40.0, "C", 5.0)]);
    }

    #[test]
    fn unreadable_scheme_bands_mean_default_scale() {
        let mut scheme = Scheme {
            scheme_id: 2,
            program_id: 1,
            semester: 1,
            academic_year: "2025-26".to_string(),
            medium_tag: None,
            name: None,
            max_internal: None,
            max_external: None,
            max_total: None,
            credit_rules: None,
            grading_scheme: Some("{\"levels\": []}".to_string()),
        };
        assert!(scheme_bands(&scheme).is_none());

        scheme.grading_scheme = Some("[]".to_string());
        assert!(scheme_bands(&scheme).is_none());

        scheme.grading_scheme = Some(r#"{"bands": [{"min": 0, "grade": "P", "gp": 4}]}"#.to_string());
        assert_eq!(scheme_bands(&scheme), Some(vec![band(0.0, "P", 4.0)]));
    }
}
