// src/store/postgres.rs

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, types::Json};
use uuid::Uuid;

use super::{LmsStore, active_conflict, closed_conflict};
use crate::{
    engine::intervention::SavePlan,
    error::AppError,
    models::{
        activity::{
            Assignment, AssignmentSubmission, Course, CourseModule, Enrollment, LmsUser,
            ModuleProgress, RiskInputs,
        },
        attempt::{NewQuizAttempt, QuizAttempt, QuizModule},
        intervention::{Intervention, InterventionListParams},
    },
};

/// Attempt writes retry this many times when two submissions race for the
/// same attempt number.
const ATTEMPT_INSERT_RETRIES: usize = 3;

const ATTEMPT_COLUMNS: &str = r#"
    id, user_id, course_id, module_id, attempt_number, answers, question_order,
    option_order_by_question, seed, score_percent, correct_answers, total_questions,
    passed, started_at, submitted_at, duration_seconds
"#;

const INTERVENTION_COLUMNS: &str = r#"
    id, user_id, course_id, risk_level, risk_score, reason, assigned_to, status,
    action_plan, due_date, resolved_at, created_by, created_at, updated_at
"#;

/// Helper struct mapping a `quiz_attempts` row.
#[derive(sqlx::FromRow)]
struct AttemptRow {
    id: Uuid,
    user_id: String,
    course_id: String,
    module_id: String,
    attempt_number: i32,
    answers: Json<HashMap<String, String>>,
    question_order: Json<Vec<String>>,
    option_order_by_question: Json<HashMap<String, Vec<String>>>,
    seed: String,
    score_percent: i32,
    correct_answers: i32,
    total_questions: i32,
    passed: bool,
    started_at: DateTime<Utc>,
    submitted_at: DateTime<Utc>,
    duration_seconds: i64,
}

impl From<AttemptRow> for QuizAttempt {
    fn from(row: AttemptRow) -> Self {
        QuizAttempt {
            id: row.id,
            user_id: row.user_id,
            course_id: row.course_id,
            module_id: row.module_id,
            attempt_number: row.attempt_number,
            answers: row.answers.0,
            question_order: row.question_order.0,
            option_order_by_question: row.option_order_by_question.0,
            seed: row.seed,
            score_percent: row.score_percent.max(0) as u32,
            correct_answers: row.correct_answers.max(0) as u32,
            total_questions: row.total_questions.max(0) as u32,
            passed: row.passed,
            started_at: row.started_at,
            submitted_at: row.submitted_at,
            duration_seconds: row.duration_seconds,
        }
    }
}

/// Helper struct mapping an `lms_interventions` row. Enum columns are TEXT.
#[derive(sqlx::FromRow)]
struct InterventionRow {
    id: Uuid,
    user_id: String,
    course_id: String,
    risk_level: String,
    risk_score: i32,
    reason: String,
    assigned_to: String,
    status: String,
    action_plan: Option<String>,
    due_date: Option<NaiveDate>,
    resolved_at: Option<DateTime<Utc>>,
    created_by: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<InterventionRow> for Intervention {
    type Error = AppError;

    fn try_from(row: InterventionRow) -> Result<Self, Self::Error> {
        Ok(Intervention {
            id: row.id,
            user_id: row.user_id,
            course_id: row.course_id,
            risk_level: row.risk_level.parse().map_err(AppError::InternalServerError)?,
            risk_score: row.risk_score.max(0) as u32,
            reason: row.reason,
            assigned_to: row.assigned_to,
            status: row.status.parse().map_err(AppError::InternalServerError)?,
            action_plan: row.action_plan,
            due_date: row.due_date,
            resolved_at: row.resolved_at,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}

/// Postgres-backed store.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts the attempt and, when it passed, completes the module, both in
    /// one transaction.
    async fn insert_attempt(&self, attempt: &NewQuizAttempt) -> Result<AttemptRow, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let sql = format!(
            r#"
            INSERT INTO quiz_attempts ({columns})
            SELECT $1, $2, $3, $4, COALESCE(MAX(attempt_number), 0) + 1, $5, $6, $7, $8,
                   $9, $10, $11, $12, $13, $14, $15
            FROM quiz_attempts
            WHERE user_id = $2 AND module_id = $4
            RETURNING {columns}
            "#,
            columns = ATTEMPT_COLUMNS
        );

        let row = sqlx::query_as::<_, AttemptRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(&attempt.user_id)
            .bind(&attempt.course_id)
            .bind(&attempt.module_id)
            .bind(Json(&attempt.answers))
            .bind(Json(&attempt.question_order))
            .bind(Json(&attempt.option_order_by_question))
            .bind(&attempt.seed)
            .bind(attempt.score_percent as i32)
            .bind(attempt.correct_answers as i32)
            .bind(attempt.total_questions as i32)
            .bind(attempt.passed)
            .bind(attempt.started_at)
            .bind(attempt.submitted_at)
            .bind(attempt.duration_seconds())
            .fetch_one(&mut *tx)
            .await?;

        if attempt.passed {
            sqlx::query(
                r#"
                INSERT INTO lms_module_progress (user_id, module_id, completed, completed_at)
                VALUES ($1, $2, TRUE, $3)
                ON CONFLICT (user_id, module_id) DO UPDATE SET
                    completed = TRUE,
                    completed_at = COALESCE(lms_module_progress.completed_at, EXCLUDED.completed_at)
                "#,
            )
            .bind(&attempt.user_id)
            .bind(&attempt.module_id)
            .bind(attempt.submitted_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(row)
    }
}

#[async_trait]
impl LmsStore for PgStore {
    async fn quiz_module(&self, module_id: &str) -> Result<Option<QuizModule>, AppError> {
        let module = sqlx::query_as::<_, QuizModule>(
            r#"
            SELECT id, course_id, title, pass_threshold, quiz_payload AS payload
            FROM lms_modules
            WHERE id = $1 AND quiz_payload IS NOT NULL
            "#,
        )
        .bind(module_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch quiz module: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

        Ok(module)
    }

    async fn record_attempt(&self, attempt: NewQuizAttempt) -> Result<QuizAttempt, AppError> {
        let mut tries = 0;
        loop {
            match self.insert_attempt(&attempt).await {
                Ok(row) => return Ok(row.into()),
                Err(e) if is_unique_violation(&e) && tries < ATTEMPT_INSERT_RETRIES => {
                    tries += 1;
                    tracing::warn!(
                        "Attempt number collision for user {} module {}, retrying ({})",
                        attempt.user_id,
                        attempt.module_id,
                        tries
                    );
                }
                Err(e) => {
                    tracing::error!("Failed to record quiz attempt: {:?}", e);
                    return Err(AppError::InternalServerError(e.to_string()));
                }
            }
        }
    }

    async fn list_attempts(&self, user_id: &str, module_id: &str) -> Result<Vec<QuizAttempt>, AppError> {
        let sql = format!(
            "SELECT {} FROM quiz_attempts WHERE user_id = $1 AND module_id = $2 ORDER BY attempt_number",
            ATTEMPT_COLUMNS
        );
        let rows = sqlx::query_as::<_, AttemptRow>(&sql)
            .bind(user_id)
            .bind(module_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(QuizAttempt::from).collect())
    }

    async fn get_attempt(&self, attempt_id: Uuid) -> Result<Option<QuizAttempt>, AppError> {
        let sql = format!("SELECT {} FROM quiz_attempts WHERE id = $1", ATTEMPT_COLUMNS);
        let row = sqlx::query_as::<_, AttemptRow>(&sql)
            .bind(attempt_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(QuizAttempt::from))
    }

    async fn risk_inputs(&self) -> Result<RiskInputs, AppError> {
        let (users, courses, modules, enrollments, progress, assignments, submissions) = tokio::try_join!(
            sqlx::query_as::<_, LmsUser>("SELECT id, full_name FROM lms_users").fetch_all(&self.pool),
            sqlx::query_as::<_, Course>("SELECT id, title FROM lms_courses").fetch_all(&self.pool),
            sqlx::query_as::<_, CourseModule>("SELECT id, course_id FROM lms_modules")
                .fetch_all(&self.pool),
            sqlx::query_as::<_, Enrollment>("SELECT user_id, course_id FROM lms_enrollments")
                .fetch_all(&self.pool),
            sqlx::query_as::<_, ModuleProgress>(
                "SELECT user_id, module_id, completed, completed_at, last_watched_at FROM lms_module_progress"
            )
            .fetch_all(&self.pool),
            sqlx::query_as::<_, Assignment>(
                "SELECT id, course_id, title, due_at, passing_percent, is_published FROM lms_assignments"
            )
            .fetch_all(&self.pool),
            sqlx::query_as::<_, AssignmentSubmission>(
                r#"
                SELECT assignment_id, user_id, status, score, submitted_at, graded_at
                FROM lms_assignment_submissions
                "#
            )
            .fetch_all(&self.pool),
        )
        .map_err(|e| {
            tracing::error!("Failed to load risk inputs: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

        Ok(RiskInputs {
            users,
            courses,
            modules,
            enrollments,
            progress,
            assignments,
            submissions,
        })
    }

    async fn list_interventions(
        &self,
        params: &InterventionListParams,
    ) -> Result<Vec<Intervention>, AppError> {
        let sql = format!(
            r#"
            SELECT {}
            FROM lms_interventions
            WHERE ($1::TEXT IS NULL OR status = $1)
              AND ($2::TEXT IS NULL OR user_id = $2)
              AND ($3::TEXT IS NULL OR course_id = $3)
            ORDER BY created_at DESC
            "#,
            INTERVENTION_COLUMNS
        );
        let rows = sqlx::query_as::<_, InterventionRow>(&sql)
            .bind(params.status.map(|s| s.as_str()))
            .bind(params.user_id.as_deref())
            .bind(params.course_id.as_deref())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Intervention::try_from).collect()
    }

    async fn get_intervention(&self, id: Uuid) -> Result<Option<Intervention>, AppError> {
        let sql = format!("SELECT {} FROM lms_interventions WHERE id = $1", INTERVENTION_COLUMNS);
        let row = sqlx::query_as::<_, InterventionRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Intervention::try_from).transpose()
    }

    async fn find_active_intervention(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> Result<Option<Intervention>, AppError> {
        let sql = format!(
            r#"
            SELECT {}
            FROM lms_interventions
            WHERE user_id = $1 AND course_id = $2 AND status IN ('open', 'in_progress')
            "#,
            INTERVENTION_COLUMNS
        );
        let row = sqlx::query_as::<_, InterventionRow>(&sql)
            .bind(user_id)
            .bind(course_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Intervention::try_from).transpose()
    }

    async fn save_intervention(&self, plan: SavePlan) -> Result<Intervention, AppError> {
        let row = match &plan {
            SavePlan::Create(i) => {
                let sql = format!(
                    r#"
                    INSERT INTO lms_interventions ({columns})
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
                    RETURNING {columns}
                    "#,
                    columns = INTERVENTION_COLUMNS
                );
                sqlx::query_as::<_, InterventionRow>(&sql)
                    .bind(i.id)
                    .bind(&i.user_id)
                    .bind(&i.course_id)
                    .bind(i.risk_level.as_str())
                    .bind(i.risk_score as i32)
                    .bind(&i.reason)
                    .bind(&i.assigned_to)
                    .bind(i.status.as_str())
                    .bind(&i.action_plan)
                    .bind(i.due_date)
                    .bind(i.resolved_at)
                    .bind(&i.created_by)
                    .bind(i.created_at)
                    .bind(i.updated_at)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(|e| {
                        if is_unique_violation(&e) {
                            active_conflict()
                        } else {
                            tracing::error!("Failed to create intervention: {:?}", e);
                            AppError::InternalServerError(e.to_string())
                        }
                    })?
            }
            SavePlan::Update(i) => {
                let sql = format!(
                    r#"
                    UPDATE lms_interventions SET
                        assigned_to = $2,
                        status = $3,
                        action_plan = $4,
                        due_date = $5,
                        resolved_at = $6,
                        updated_at = $7
                    WHERE id = $1 AND status IN ('open', 'in_progress')
                    RETURNING {}
                    "#,
                    INTERVENTION_COLUMNS
                );
                sqlx::query_as::<_, InterventionRow>(&sql)
                    .bind(i.id)
                    .bind(&i.assigned_to)
                    .bind(i.status.as_str())
                    .bind(&i.action_plan)
                    .bind(i.due_date)
                    .bind(i.resolved_at)
                    .bind(i.updated_at)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| {
                        tracing::error!("Failed to update intervention: {:?}", e);
                        AppError::InternalServerError(e.to_string())
                    })?
                    .ok_or_else(closed_conflict)?
            }
        };

        row.try_into()
    }
}
