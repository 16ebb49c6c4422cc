// src/models/attempt.rs

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::models::quiz::{PresentedQuiz, QuizResult};

/// A course module carrying a quiz, as stored by the course editor.
/// `payload` is the authoring JSON and may be malformed.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct QuizModule {
    pub id: String,
    pub course_id: String,
    pub title: String,
    /// Minimum score percent (0-100) for a passing attempt.
    pub pass_threshold: i32,
    pub payload: serde_json::Value,
}

impl QuizModule {
    pub fn pass_threshold(&self) -> u32 {
        self.pass_threshold.clamp(0, 100) as u32
    }
}

/// One graded submission. Append-only: later attempts supersede, never overwrite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizAttempt {
    pub id: Uuid,
    pub user_id: String,
    pub course_id: String,
    pub module_id: String,
    /// 1-based, strictly increasing per (user, module).
    pub attempt_number: i32,
    pub answers: HashMap<String, String>,
    pub question_order: Vec<String>,
    pub option_order_by_question: HashMap<String, Vec<String>>,
    pub seed: String,
    pub score_percent: u32,
    pub correct_answers: u32,
    pub total_questions: u32,
    pub passed: bool,
    pub started_at: DateTime<Utc>,
    pub submitted_at: DateTime<Utc>,
    pub duration_seconds: i64,
}

/// Attempt before the store assigns its id and attempt number.
#[derive(Debug, Clone)]
pub struct NewQuizAttempt {
    pub user_id: String,
    pub course_id: String,
    pub module_id: String,
    pub answers: HashMap<String, String>,
    pub question_order: Vec<String>,
    pub option_order_by_question: HashMap<String, Vec<String>>,
    pub seed: String,
    pub score_percent: u32,
    pub correct_answers: u32,
    pub total_questions: u32,
    pub passed: bool,
    pub started_at: DateTime<Utc>,
    pub submitted_at: DateTime<Utc>,
}

impl NewQuizAttempt {
    pub fn duration_seconds(&self) -> i64 {
        (self.submitted_at - self.started_at).num_seconds().max(0)
    }

    pub fn into_attempt(self, id: Uuid, attempt_number: i32) -> QuizAttempt {
        let duration_seconds = self.duration_seconds();
        QuizAttempt {
            id,
            user_id: self.user_id,
            course_id: self.course_id,
            module_id: self.module_id,
            attempt_number,
            answers: self.answers,
            question_order: self.question_order,
            option_order_by_question: self.option_order_by_question,
            seed: self.seed,
            score_percent: self.score_percent,
            correct_answers: self.correct_answers,
            total_questions: self.total_questions,
            passed: self.passed,
            started_at: self.started_at,
            submitted_at: self.submitted_at,
            duration_seconds,
        }
    }
}

/// DTO for submitting a quiz attempt.
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitAttemptRequest {
    /// The seed returned when the session was started. Its freshness token
    /// is the session start time, so the attempt duration is measured from it.
    #[validate(length(min = 1, max = 512))]
    pub seed: String,

    /// Key: question id. Value: selected option id.
    #[validate(length(min = 1, max = 500))]
    pub answers: HashMap<String, String>,
}

/// Returned when a learner starts a quiz session.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub module_id: String,
    pub pass_threshold: u32,
    pub started_at: DateTime<Utc>,
    pub quiz: PresentedQuiz,
}

/// Returned after a submission is graded and stored.
#[derive(Debug, Serialize)]
pub struct SubmitAttemptResponse {
    pub attempt_id: Uuid,
    pub attempt_number: i32,
    pub result: QuizResult,
}

/// A past attempt laid out exactly as the learner saw it.
#[derive(Debug, Serialize)]
pub struct AttemptReplay {
    pub attempt: QuizAttempt,
    pub quiz: PresentedQuiz,
}
