// src/models/intervention.rs

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::risk::{RiskLevel, RiskSignal};

/// Workflow status of an intervention.
/// `Resolved` and `Dismissed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionStatus {
    Open,
    InProgress,
    Resolved,
    Dismissed,
}

impl InterventionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterventionStatus::Open => "open",
            InterventionStatus::InProgress => "in_progress",
            InterventionStatus::Resolved => "resolved",
            InterventionStatus::Dismissed => "dismissed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, InterventionStatus::Resolved | InterventionStatus::Dismissed)
    }

    /// open -> in_progress | resolved | dismissed, in_progress -> resolved | dismissed.
    pub fn can_transition_to(&self, next: InterventionStatus) -> bool {
        use InterventionStatus::*;
        matches!(
            (self, next),
            (Open, InProgress) | (Open, Resolved) | (Open, Dismissed)
                | (InProgress, Resolved) | (InProgress, Dismissed)
        )
    }
}

impl std::fmt::Display for InterventionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for InterventionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(InterventionStatus::Open),
            "in_progress" => Ok(InterventionStatus::InProgress),
            "resolved" => Ok(InterventionStatus::Resolved),
            "dismissed" => Ok(InterventionStatus::Dismissed),
            other => Err(format!("Unknown intervention status '{}'", other)),
        }
    }
}

/// Staff follow-up on a flagged learner.
/// Risk fields are a snapshot taken when the record was created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intervention {
    pub id: Uuid,
    pub user_id: String,
    pub course_id: String,
    pub risk_level: RiskLevel,
    pub risk_score: u32,
    pub reason: String,
    pub assigned_to: String,
    pub status: InterventionStatus,
    pub action_plan: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Intervention {
    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }
}

/// DTO for creating or updating an intervention.
/// With `id` the record is updated; without it the active record for
/// (user, course) is updated, or a new one is created.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SaveInterventionRequest {
    pub id: Option<Uuid>,
    #[validate(length(min = 1, max = 128))]
    pub user_id: String,
    #[validate(length(min = 1, max = 128))]
    pub course_id: String,
    pub risk_level: RiskLevel,
    #[validate(range(max = 10000))]
    pub risk_score: u32,
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
    #[validate(length(min = 1, max = 128))]
    pub assigned_to: String,
    pub status: Option<InterventionStatus>,
    #[validate(length(max = 4000))]
    pub action_plan: Option<String>,
    pub due_date: Option<NaiveDate>,
}

/// Query parameters for listing interventions.
#[derive(Debug, Default, Deserialize)]
pub struct InterventionListParams {
    pub status: Option<InterventionStatus>,
    pub user_id: Option<String>,
    pub course_id: Option<String>,
}

/// Risk signal with the intervention already tracking it, if any.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskCandidate {
    #[serde(flatten)]
    pub signal: RiskSignal,
    pub active_intervention_id: Option<Uuid>,
}
