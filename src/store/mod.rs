// src/store/mod.rs

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    engine::intervention::SavePlan,
    error::AppError,
    models::{
        activity::RiskInputs,
        attempt::{NewQuizAttempt, QuizAttempt, QuizModule},
        intervention::{Intervention, InterventionListParams},
    },
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Persistence owned by the service. The engines never touch it directly;
/// handlers read inputs from here and write results back.
#[async_trait]
pub trait LmsStore: Send + Sync {
    /// The quiz module with its raw authoring payload, if the module exists
    /// and carries a quiz.
    async fn quiz_module(&self, module_id: &str) -> Result<Option<QuizModule>, AppError>;

    /// Appends an attempt, assigning the next attempt number for
    /// (user, module). Numbers never collide under concurrent submissions.
    /// A passing attempt also marks the module completed for the learner in
    /// the same write; on error neither change is kept.
    async fn record_attempt(&self, attempt: NewQuizAttempt) -> Result<QuizAttempt, AppError>;

    /// Attempts for (user, module), oldest first.
    async fn list_attempts(&self, user_id: &str, module_id: &str) -> Result<Vec<QuizAttempt>, AppError>;

    async fn get_attempt(&self, attempt_id: Uuid) -> Result<Option<QuizAttempt>, AppError>;

    /// Snapshot of the activity feeds the risk engine aggregates.
    async fn risk_inputs(&self) -> Result<RiskInputs, AppError>;

    /// Interventions matching the filter, newest first.
    async fn list_interventions(
        &self,
        params: &InterventionListParams,
    ) -> Result<Vec<Intervention>, AppError>;

    async fn get_intervention(&self, id: Uuid) -> Result<Option<Intervention>, AppError>;

    /// The open or in-progress intervention for (user, course), if any.
    async fn find_active_intervention(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> Result<Option<Intervention>, AppError>;

    /// Persists a planned save. A create that would give the pair a second
    /// active intervention, or an update of a record that was closed in the
    /// meantime, fails with `AppError::Conflict`.
    async fn save_intervention(&self, plan: SavePlan) -> Result<Intervention, AppError>;
}

pub(crate) fn active_conflict() -> AppError {
    AppError::Conflict("An active intervention already exists for this learner and course".to_string())
}

pub(crate) fn closed_conflict() -> AppError {
    AppError::Conflict("Intervention was closed by another update".to_string())
}
