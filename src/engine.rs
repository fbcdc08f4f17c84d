use std::collections::{HashMap, HashSet};

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::CalcError;
use crate::grading::{evaluate, scheme_bands, FAIL_GRADE};
use crate::models::{Mark, RecalcOutcome, RuleSpec, Scheme, SemesterResult, Subject};
use crate::rules::SchemeRules;
use crate::store::{ExamStore, ExamTransaction};

const FALLBACK_MAX_TOTAL: f64 = 100.0;
const FIRST_ATTEMPT: i32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StudentTotals {
    pub registered: f64,
    pub earned: f64,
    pub points: f64,
}

impl StudentTotals {
    /// Adds one graded subject. Subjects without positive credit are ignored.
    pub fn add(&mut self, credits: f64, is_absent: bool, grade_point: f64, grade_letter: &str) {
        if credits <= 0.0 {
            return;
        }
        self.registered += credits;
        if is_absent {
            return;
        }
        self.points += grade_point * credits;
        if grade_letter != FAIL_GRADE {
            self.earned += credits;
        }
    }

    pub fn sgpa(&self) -> f64 {
        if self.registered > 0.0 {
            round2(self.points / self.registered)
        } else {
            0.0
        }
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}

/// Recomputes grades and semester results for every student in a scheme.
///
/// Never returns an error: failures are reported in the outcome and leave the
/// store untouched.
pub async fn recalculate<S: ExamStore>(store: &S, scheme_id: i64) -> RecalcOutcome {
    match try_recalculate(store, scheme_id).await {
        Ok(processed) => {
            info!(scheme_id, processed, "results calculated");
            RecalcOutcome {
                success: true,
                message: format!("Results calculated for {processed} students."),
                processed,
            }
        }
        Err(err) => {
            warn!(scheme_id, error = %err, "result calculation failed");
            RecalcOutcome {
                success: false,
                message: err.to_string(),
                processed: 0,
            }
        }
    }
}

pub async fn try_recalculate<S: ExamStore>(store: &S, scheme_id: i64) -> Result<usize, CalcError> {
    let mut tx = store.begin().await?;
    match run_pass(&mut tx, scheme_id).await {
        Ok(processed) => {
            tx.commit().await?;
            Ok(processed)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(scheme_id, error = %rollback_err, "rollback failed");
            }
            Err(err)
        }
    }
}

async fn run_pass<T: ExamTransaction>(tx: &mut T, scheme_id: i64) -> Result<usize, CalcError> {
    let scheme = tx
        .scheme(scheme_id)
        .await?
        .ok_or(CalcError::SchemeNotFound(scheme_id))?;

    let marks = tx.marks_for_scheme(scheme_id).await?;
    if marks.is_empty() {
        return Err(CalcError::NoMarksFound(scheme_id));
    }

    let rules = SchemeRules::from_scheme(&scheme);
    let bands = scheme_bands(&scheme);
    let subjects = load_subjects(tx, &marks).await?;
    info!(
        scheme_id,
        marks = marks.len(),
        subjects = subjects.len(),
        rules = rules.rules().len(),
        custom_bands = bands.is_some(),
        "recalculating scheme"
    );

    let students = group_by_student(marks);
    let processed = students.len();

    for (student_id, marks) in students {
        let mut totals = StudentTotals::default();
        let mut counted = HashSet::new();

        for mut mark in marks {
            let subject = subjects
                .get(&mark.subject_id)
                .cloned()
                .unwrap_or_else(|| unresolved_subject(mark.subject_id));
            let limits = rules.limits_for(&subject);
            let max_total = limits.max_total.unwrap_or(FALLBACK_MAX_TOTAL);

            let (grade_point, grade_letter) =
                evaluate(mark.effective_obtained(), max_total, bands.as_deref());

            if counted.insert(mark.subject_id) {
                totals.add(subject.credits, mark.is_absent, grade_point, &grade_letter);
            } else {
                warn!(
                    scheme_id,
                    student_id = %student_id,
                    subject_id = mark.subject_id,
                    "duplicate mark for subject, not counted twice"
                );
            }

            mark.grade_point = Some(grade_point);
            mark.grade_letter = Some(grade_letter);
            tx.save_mark(&mark).await?;
        }

        debug!(
            scheme_id,
            student_id = %student_id,
            registered = totals.registered,
            earned = totals.earned,
            sgpa = totals.sgpa(),
            "student totals"
        );
        upsert_result(tx, &scheme, &student_id, &totals).await?;
    }

    Ok(processed)
}

async fn load_subjects<T: ExamTransaction>(
    tx: &mut T,
    marks: &[Mark],
) -> Result<HashMap<i64, Subject>, CalcError> {
    let mut subjects = HashMap::new();
    for mark in marks {
        if subjects.contains_key(&mark.subject_id) {
            continue;
        }
        match tx.subject(mark.subject_id).await? {
            Some(subject) => {
                subjects.insert(mark.subject_id, subject);
            }
            None => warn!(subject_id = mark.subject_id, "subject not found, treating as zero credit"),
        }
    }
    Ok(subjects)
}

fn unresolved_subject(subject_id: i64) -> Subject {
    Subject {
        subject_id,
        name: String::new(),
        type_code: RuleSpec::ALL_TYPES.to_string(),
        credits: 0.0,
    }
}

/// Groups marks per student, keeping the order students first appear in.
fn group_by_student(marks: Vec<Mark>) -> Vec<(String, Vec<Mark>)> {
    let mut order: Vec<(String, Vec<Mark>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for mark in marks {
        match index.get(&mark.student_id) {
            Some(&slot) => order[slot].1.push(mark),
            None => {
                index.insert(mark.student_id.clone(), order.len());
                order.push((mark.student_id.clone(), vec![mark]));
            }
        }
    }

    order
}

async fn upsert_result<T: ExamTransaction>(
    tx: &mut T,
    scheme: &Scheme,
    student_id: &str,
    totals: &StudentTotals,
) -> Result<(), CalcError> {
    let now = Utc::now();
    let mut result = match tx.find_result(student_id, scheme.scheme_id).await? {
        Some(existing) => existing,
        None => SemesterResult {
            result_id: Uuid::new_v4(),
            student_id: student_id.to_string(),
            program_id: scheme.program_id,
            scheme_id: scheme.scheme_id,
            semester: scheme.semester,
            academic_year: scheme.academic_year.clone(),
            attempt_no: FIRST_ATTEMPT,
            total_credits_registered: 0.0,
            total_credits_earned: 0.0,
            sgpa: 0.0,
            updated_at: now,
        },
    };

    result.total_credits_registered = totals.registered;
    result.total_credits_earned = totals.earned;
    result.sgpa = totals.sgpa();
    result.updated_at = now;

    tx.upsert_result(&result).await?;
    Ok(())
}
