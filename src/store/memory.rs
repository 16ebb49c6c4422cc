// src/store/memory.rs

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{LmsStore, active_conflict, closed_conflict};
use crate::{
    engine::intervention::SavePlan,
    error::AppError,
    models::{
        activity::{ModuleProgress, RiskInputs},
        attempt::{NewQuizAttempt, QuizAttempt, QuizModule},
        intervention::{Intervention, InterventionListParams},
    },
};

#[derive(Debug, Default)]
struct MemoryData {
    modules: HashMap<String, QuizModule>,
    attempts: Vec<QuizAttempt>,
    activity: RiskInputs,
    interventions: Vec<Intervention>,
}

/// In-process store for local runs and tests. Every write happens under a
/// single write guard, so attempt numbering is race-free here as well.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<MemoryData>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_quiz_module(&self, module: QuizModule) {
        self.data.write().await.modules.insert(module.id.clone(), module);
    }

    /// Replaces the activity feeds wholesale.
    pub async fn set_activity(&self, activity: RiskInputs) {
        self.data.write().await.activity = activity;
    }
}

/// Sets the (user, module) progress row to completed, keeping the first
/// completion time.
fn complete_module(progress: &mut Vec<ModuleProgress>, user_id: &str, module_id: &str, at: DateTime<Utc>) {
    match progress
        .iter_mut()
        .find(|p| p.user_id == user_id && p.module_id == module_id)
    {
        Some(row) => {
            if !row.completed {
                row.completed = true;
                row.completed_at = Some(at);
            }
        }
        None => progress.push(ModuleProgress {
            user_id: user_id.to_string(),
            module_id: module_id.to_string(),
            completed: true,
            completed_at: Some(at),
            last_watched_at: None,
        }),
    }
}

fn matches_filter(i: &Intervention, params: &InterventionListParams) -> bool {
    params.status.is_none_or(|s| i.status == s)
        && params.user_id.as_deref().is_none_or(|u| i.user_id == u)
        && params.course_id.as_deref().is_none_or(|c| i.course_id == c)
}

#[async_trait]
impl LmsStore for MemoryStore {
    async fn quiz_module(&self, module_id: &str) -> Result<Option<QuizModule>, AppError> {
        Ok(self.data.read().await.modules.get(module_id).cloned())
    }

    async fn record_attempt(&self, attempt: NewQuizAttempt) -> Result<QuizAttempt, AppError> {
        let mut data = self.data.write().await;
        let next = data
            .attempts
            .iter()
            .filter(|a| a.user_id == attempt.user_id && a.module_id == attempt.module_id)
            .map(|a| a.attempt_number)
            .max()
            .unwrap_or(0)
            + 1;

        let stored = attempt.into_attempt(Uuid::new_v4(), next);
        if stored.passed {
            complete_module(
                &mut data.activity.progress,
                &stored.user_id,
                &stored.module_id,
                stored.submitted_at,
            );
        }
        data.attempts.push(stored.clone());
        Ok(stored)
    }

    async fn list_attempts(&self, user_id: &str, module_id: &str) -> Result<Vec<QuizAttempt>, AppError> {
        let data = self.data.read().await;
        let mut attempts: Vec<QuizAttempt> = data
            .attempts
            .iter()
            .filter(|a| a.user_id == user_id && a.module_id == module_id)
            .cloned()
            .collect();
        attempts.sort_by_key(|a| a.attempt_number);
        Ok(attempts)
    }

    async fn get_attempt(&self, attempt_id: Uuid) -> Result<Option<QuizAttempt>, AppError> {
        let data = self.data.read().await;
        Ok(data.attempts.iter().find(|a| a.id == attempt_id).cloned())
    }

    async fn risk_inputs(&self) -> Result<RiskInputs, AppError> {
        Ok(self.data.read().await.activity.clone())
    }

    async fn list_interventions(
        &self,
        params: &InterventionListParams,
    ) -> Result<Vec<Intervention>, AppError> {
        let data = self.data.read().await;
        let mut found: Vec<Intervention> = data
            .interventions
            .iter()
            .filter(|i| matches_filter(i, params))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn get_intervention(&self, id: Uuid) -> Result<Option<Intervention>, AppError> {
        let data = self.data.read().await;
        Ok(data.interventions.iter().find(|i| i.id == id).cloned())
    }

    async fn find_active_intervention(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> Result<Option<Intervention>, AppError> {
        let data = self.data.read().await;
        Ok(data
            .interventions
            .iter()
            .find(|i| i.is_active() && i.user_id == user_id && i.course_id == course_id)
            .cloned())
    }

    async fn save_intervention(&self, plan: SavePlan) -> Result<Intervention, AppError> {
        let mut data = self.data.write().await;
        match plan {
            SavePlan::Create(record) => {
                let taken = data.interventions.iter().any(|i| {
                    i.is_active() && i.user_id == record.user_id && i.course_id == record.course_id
                });
                if taken {
                    return Err(active_conflict());
                }
                data.interventions.push(record.clone());
                Ok(record)
            }
            SavePlan::Update(record) => {
                let slot = data
                    .interventions
                    .iter_mut()
                    .find(|i| i.id == record.id)
                    .ok_or(AppError::NotFound("Intervention not found".to_string()))?;
                if !slot.is_active() {
                    return Err(closed_conflict());
                }
                *slot = record.clone();
                Ok(record)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::{
        engine::intervention::plan_intervention_save,
        models::{
            intervention::{InterventionStatus, SaveInterventionRequest},
            risk::RiskLevel,
        },
    };

    fn new_attempt(user: &str, module: &str) -> NewQuizAttempt {
        let now = Utc::now();
        NewQuizAttempt {
            user_id: user.into(),
            course_id: "c1".into(),
            module_id: module.into(),
            answers: HashMap::new(),
            question_order: vec![],
            option_order_by_question: HashMap::new(),
            seed: format!("{}:{}:0", module, user),
            score_percent: 0,
            correct_answers: 0,
            total_questions: 0,
            passed: false,
            started_at: now,
            submitted_at: now,
        }
    }

    fn passing_attempt(user: &str, module: &str, submitted_at: DateTime<Utc>) -> NewQuizAttempt {
        NewQuizAttempt {
            score_percent: 100,
            correct_answers: 2,
            total_questions: 2,
            passed: true,
            started_at: submitted_at,
            submitted_at,
            ..new_attempt(user, module)
        }
    }

    fn request(user: &str) -> SaveInterventionRequest {
        SaveInterventionRequest {
            id: None,
            user_id: user.into(),
            course_id: "c1".into(),
            risk_level: RiskLevel::Medium,
            risk_score: 40,
            reason: "inactive 20 days".into(),
            assigned_to: "staff-9".into(),
            status: None,
            action_plan: None,
            due_date: None,
        }
    }

    #[tokio::test]
    async fn test_attempt_numbers_increase_per_user_and_module() {
        let store = MemoryStore::new();
        let first = store.record_attempt(new_attempt("u1", "m1")).await.unwrap();
        let second = store.record_attempt(new_attempt("u1", "m1")).await.unwrap();
        let other_module = store.record_attempt(new_attempt("u1", "m2")).await.unwrap();
        let other_user = store.record_attempt(new_attempt("u2", "m1")).await.unwrap();
        let third = store.record_attempt(new_attempt("u1", "m1")).await.unwrap();

        assert_eq!(first.attempt_number, 1);
        assert_eq!(second.attempt_number, 2);
        assert_eq!(third.attempt_number, 3);
        assert_eq!(other_module.attempt_number, 1);
        assert_eq!(other_user.attempt_number, 1);

        let history = store.list_attempts("u1", "m1").await.unwrap();
        let numbers: Vec<i32> = history.iter().map(|a| a.attempt_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_concurrent_attempts_never_collide() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.record_attempt(new_attempt("u1", "m1")).await })
            })
            .collect();

        let mut numbers = Vec::new();
        for handle in handles {
            numbers.push(handle.await.unwrap().unwrap().attempt_number);
        }
        numbers.sort();
        assert_eq!(numbers, (1..=16).collect::<Vec<i32>>());
    }

    #[tokio::test]
    async fn test_passing_attempt_completes_module() {
        let store = MemoryStore::new();
        store.record_attempt(new_attempt("u1", "m1")).await.unwrap();
        assert!(store.risk_inputs().await.unwrap().progress.is_empty());

        let at = Utc::now();
        let attempt = store.record_attempt(passing_attempt("u1", "m1", at)).await.unwrap();
        assert_eq!(attempt.attempt_number, 2);
        store
            .record_attempt(passing_attempt("u1", "m1", at + chrono::Duration::hours(1)))
            .await
            .unwrap();

        let inputs = store.risk_inputs().await.unwrap();
        assert_eq!(inputs.progress.len(), 1);
        assert!(inputs.progress[0].completed);
        assert_eq!(inputs.progress[0].completed_at, Some(at));
    }

    #[tokio::test]
    async fn test_second_active_intervention_conflicts() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let first = plan_intervention_save(None, request("u1"), "admin", now).unwrap();
        store.save_intervention(first).await.unwrap();

        let duplicate = plan_intervention_save(None, request("u1"), "admin", now).unwrap();
        let err = store.save_intervention(duplicate).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let active = store.find_active_intervention("u1", "c1").await.unwrap();
        assert!(active.is_some());
    }

    #[tokio::test]
    async fn test_list_interventions_filters_by_status() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let open = store
            .save_intervention(plan_intervention_save(None, request("u1"), "admin", now).unwrap())
            .await
            .unwrap();
        store
            .save_intervention(plan_intervention_save(None, request("u2"), "admin", now).unwrap())
            .await
            .unwrap();

        let mut close = request("u1");
        close.status = Some(InterventionStatus::Dismissed);
        let plan = plan_intervention_save(Some(&open), close, "admin", now).unwrap();
        store.save_intervention(plan).await.unwrap();

        let params = InterventionListParams {
            status: Some(InterventionStatus::Open),
            ..Default::default()
        };
        let listed = store.list_interventions(&params).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].user_id, "u2");
        assert!(store.find_active_intervention("u1", "c1").await.unwrap().is_none());
    }
}
