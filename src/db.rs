use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};

use crate::config::DbConfig;
use crate::error::StoreError;
use crate::models::{Mark, Scheme, SemesterResult, Subject};
use crate::store::{ExamStore, ExamTransaction};

pub async fn connect(config: &DbConfig) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await?;
    Ok(pool)
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Postgres-backed store. Each recalculation runs inside one database
/// transaction that holds a row lock on its scheme.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExamStore for PgStore {
    type Tx = PgTransaction;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        Ok(PgTransaction {
            tx: self.pool.begin().await?,
        })
    }
}

pub struct PgTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl ExamTransaction for PgTransaction {
    async fn scheme(&mut self, scheme_id: i64) -> Result<Option<Scheme>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT scheme_id, program_id, semester, academic_year, medium_tag, name,
                   max_internal_marks, max_external_marks, max_total_marks,
                   credit_rules_json, grading_scheme_json
            FROM exam_results.exam_schemes
            WHERE scheme_id = $1
            FOR UPDATE
            "#,
        )
        .bind(scheme_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(|row| Scheme {
            scheme_id: row.get("scheme_id"),
            program_id: row.get("program_id"),
            semester: row.get("semester"),
            academic_year: row.get("academic_year"),
            medium_tag: row.get("medium_tag"),
            name: row.get("name"),
            max_internal: row.get("max_internal_marks"),
            max_external: row.get("max_external_marks"),
            max_total: row.get("max_total_marks"),
            credit_rules: row.get("credit_rules_json"),
            grading_scheme: row.get("grading_scheme_json"),
        }))
    }

    async fn marks_for_scheme(&mut self, scheme_id: i64) -> Result<Vec<Mark>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT mark_id, student_id, subject_id, scheme_id, internal_marks, external_marks,
                   total_marks, is_absent, grade_point, grade_letter
            FROM exam_results.exam_marks
            WHERE scheme_id = $1
            ORDER BY student_id, subject_id
            "#,
        )
        .bind(scheme_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows.iter().map(mark_from_row).collect())
    }

    async fn subject(&mut self, subject_id: i64) -> Result<Option<Subject>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT subject_id, name, type_code, total_credits
            FROM exam_results.subjects
            WHERE subject_id = $1
            "#,
        )
        .bind(subject_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(|row| Subject {
            subject_id: row.get("subject_id"),
            name: row.get("name"),
            type_code: row.get("type_code"),
            credits: row.get("total_credits"),
        }))
    }

    async fn save_mark(&mut self, mark: &Mark) -> Result<(), StoreError> {
        let updated = sqlx::query(
            r#"
            UPDATE exam_results.exam_marks
            SET grade_point = $2, grade_letter = $3, updated_at = now()
            WHERE mark_id = $1
            "#,
        )
        .bind(mark.mark_id)
        .bind(mark.grade_point)
        .bind(mark.grade_letter.as_deref())
        .execute(&mut *self.tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::Other(format!(
                "mark {} does not exist",
                mark.mark_id
            )));
        }
        Ok(())
    }

    async fn find_result(
        &mut self,
        student_id: &str,
        scheme_id: i64,
    ) -> Result<Option<SemesterResult>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT result_id, student_id, program_id, scheme_id, semester, academic_year,
                   attempt_no, total_credits_registered, total_credits_earned, sgpa, updated_at
            FROM exam_results.semester_results
            WHERE student_id = $1 AND scheme_id = $2
            ORDER BY attempt_no
            LIMIT 1
            "#,
        )
        .bind(student_id)
        .bind(scheme_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.as_ref().map(result_from_row))
    }

    async fn upsert_result(&mut self, result: &SemesterResult) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO exam_results.semester_results
            (result_id, student_id, program_id, scheme_id, semester, academic_year, attempt_no,
             total_credits_registered, total_credits_earned, sgpa, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (student_id, scheme_id, attempt_no) DO UPDATE
            SET total_credits_registered = EXCLUDED.total_credits_registered,
                total_credits_earned = EXCLUDED.total_credits_earned,
                sgpa = EXCLUDED.sgpa,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(result.result_id)
        .bind(&result.student_id)
        .bind(result.program_id)
        .bind(result.scheme_id)
        .bind(result.semester)
        .bind(&result.academic_year)
        .bind(result.attempt_no)
        .bind(result.total_credits_registered)
        .bind(result.total_credits_earned)
        .bind(result.sgpa)
        .bind(result.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

fn mark_from_row(row: &PgRow) -> Mark {
    Mark {
        mark_id: row.get("mark_id"),
        student_id: row.get("student_id"),
        subject_id: row.get("subject_id"),
        scheme_id: row.get("scheme_id"),
        internal_marks: row.get("internal_marks"),
        external_marks: row.get("external_marks"),
        total_marks: row.get("total_marks"),
        is_absent: row.get("is_absent"),
        grade_point: row.get("grade_point"),
        grade_letter: row.get("grade_letter"),
    }
}

fn result_from_row(row: &PgRow) -> SemesterResult {
    SemesterResult {
        result_id: row.get("result_id"),
        student_id: row.get("student_id"),
        program_id: row.get("program_id"),
        scheme_id: row.get("scheme_id"),
        semester: row.get("semester"),
        academic_year: row.get("academic_year"),
        attempt_no: row.get("attempt_no"),
        total_credits_registered: row.get("total_credits_registered"),
        total_credits_earned: row.get("total_credits_earned"),
        sgpa: row.get("sgpa"),
        updated_at: row.get("updated_at"),
    }
}

/// Committed results for a scheme, best SGPA first.
pub async fn fetch_results(pool: &PgPool, scheme_id: i64) -> anyhow::Result<Vec<SemesterResult>> {
    let rows = sqlx::query(
        r#"
        SELECT result_id, student_id, program_id, scheme_id, semester, academic_year,
               attempt_no, total_credits_registered, total_credits_earned, sgpa, updated_at
        FROM exam_results.semester_results
        WHERE scheme_id = $1
        ORDER BY sgpa DESC, student_id
        "#,
    )
    .bind(scheme_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(result_from_row).collect())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<i64> {
    let scheme_id: i64 = sqlx::query(
        r#"
        INSERT INTO exam_results.exam_schemes
        (program_id, semester, academic_year, medium_tag, name,
         max_internal_marks, max_external_marks, max_total_marks,
         credit_rules_json, grading_scheme_json)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NULL)
        ON CONFLICT (program_id, semester, academic_year, medium_tag) DO UPDATE
        SET credit_rules_json = EXCLUDED.credit_rules_json
        RETURNING scheme_id
        "#,
    )
    .bind(1_i64)
    .bind(1_i32)
    .bind("2025-26")
    .bind("English")
    .bind("BCA Semester 1")
    .bind(30.0_f64)
    .bind(70.0_f64)
    .bind(100.0_f64)
    .bind(
        r#"[{"credit": 2, "type": "Practical", "max_int": 25, "max_ext": 25, "max_tot": 50, "min_tot": 20},
            {"credit": 2, "type": "All", "max_int": 15, "max_ext": 35, "max_tot": 50}]"#,
    )
    .fetch_one(pool)
    .await?
    .get("scheme_id");

    let subjects = vec![
        (101_i64, "Programming in C", "Major", 4.0_f64),
        (102, "Discrete Mathematics", "Minor", 3.0),
        (103, "C Programming Lab", "Practical", 2.0),
        (104, "Communication Skills", "Ability Enhancement", 2.0),
    ];

    for (subject_id, name, type_code, credits) in subjects {
        sqlx::query(
            r#"
            INSERT INTO exam_results.subjects (subject_id, name, type_code, total_credits)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (subject_id) DO UPDATE
            SET name = EXCLUDED.name, type_code = EXCLUDED.type_code,
                total_credits = EXCLUDED.total_credits
            "#,
        )
        .bind(subject_id)
        .bind(name)
        .bind(type_code)
        .bind(credits)
        .execute(pool)
        .await?;
    }

    let marks = vec![
        ("BCA2025001", 101_i64, Some(86.0_f64), false),
        ("BCA2025001", 102, Some(71.0), false),
        ("BCA2025001", 103, Some(44.0), false),
        ("BCA2025001", 104, Some(38.0), false),
        ("BCA2025002", 101, Some(58.0), false),
        ("BCA2025002", 102, None, true),
        ("BCA2025002", 103, Some(31.0), false),
        ("BCA2025002", 104, Some(12.0), false),
        ("BCA2025003", 101, Some(35.0), false),
        ("BCA2025003", 102, Some(62.0), false),
        ("BCA2025003", 103, Some(47.5), false),
        ("BCA2025003", 104, Some(41.0), false),
    ];

    for (student_id, subject_id, total_marks, is_absent) in marks {
        sqlx::query(
            r#"
            INSERT INTO exam_results.exam_marks
            (student_id, subject_id, scheme_id, total_marks, is_absent)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (student_id, subject_id, scheme_id) DO UPDATE
            SET total_marks = EXCLUDED.total_marks, is_absent = EXCLUDED.is_absent
            "#,
        )
        .bind(student_id)
        .bind(subject_id)
        .bind(scheme_id)
        .bind(total_marks)
        .bind(is_absent)
        .execute(pool)
        .await?;
    }

    Ok(scheme_id)
}
