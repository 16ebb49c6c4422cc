// src/models/activity.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Learner known to the LMS. Ids are the portal's string ids.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LmsUser {
    pub id: String,
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Course {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CourseModule {
    pub id: String,
    pub course_id: String,
}

/// Explicit enrollment. Learners with no activity at all only show up through these.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Enrollment {
    pub user_id: String,
    pub course_id: String,
}

/// Per-user-per-module progress row.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ModuleProgress {
    pub user_id: String,
    pub module_id: String,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_watched_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Assignment {
    pub id: String,
    pub course_id: String,
    pub title: String,
    pub due_at: Option<DateTime<Utc>>,
    pub passing_percent: Option<i32>,
    pub is_published: bool,
}

/// Assignment submission row.
/// `status` is one of 'draft', 'submitted', 'graded', 'returned'.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AssignmentSubmission {
    pub assignment_id: String,
    pub user_id: String,
    pub status: String,
    pub score: Option<f64>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub graded_at: Option<DateTime<Utc>>,
}

impl AssignmentSubmission {
    /// Whether this submission clears the assignment from the overdue count.
    pub fn is_turned_in(&self) -> bool {
        matches!(
            self.status.to_ascii_lowercase().as_str(),
            "submitted" | "graded" | "returned"
        )
    }
}

/// Everything the risk engine aggregates over.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskInputs {
    pub users: Vec<LmsUser>,
    pub courses: Vec<Course>,
    pub modules: Vec<CourseModule>,
    pub enrollments: Vec<Enrollment>,
    pub progress: Vec<ModuleProgress>,
    pub assignments: Vec<Assignment>,
    pub submissions: Vec<AssignmentSubmission>,
}
