// src/engine/intervention.rs

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    intervention::{Intervention, InterventionStatus, RiskCandidate, SaveInterventionRequest},
    risk::RiskSignal,
};

/// Why an intervention save was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterventionError {
    /// The record is resolved or dismissed and can no longer change.
    Terminal(InterventionStatus),
    InvalidTransition {
        from: InterventionStatus,
        to: InterventionStatus,
    },
    /// New records must start as open or in_progress.
    InvalidInitialStatus(InterventionStatus),
    /// The request's (user, course) differs from the stored record.
    PairMismatch,
}

impl fmt::Display for InterventionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterventionError::Terminal(status) => {
                write!(f, "Intervention is {} and can no longer be changed", status)
            }
            InterventionError::InvalidTransition { from, to } => {
                write!(f, "Cannot move intervention from {} to {}", from, to)
            }
            InterventionError::InvalidInitialStatus(status) => {
                write!(f, "A new intervention cannot start as {}", status)
            }
            InterventionError::PairMismatch => {
                write!(f, "Intervention belongs to a different learner or course")
            }
        }
    }
}

impl std::error::Error for InterventionError {}

/// What the store should do with a save request.
#[derive(Debug, Clone, PartialEq)]
pub enum SavePlan {
    Create(Intervention),
    Update(Intervention),
}

impl SavePlan {
    pub fn intervention(&self) -> &Intervention {
        match self {
            SavePlan::Create(i) | SavePlan::Update(i) => i,
        }
    }

    pub fn into_intervention(self) -> Intervention {
        match self {
            SavePlan::Create(i) | SavePlan::Update(i) => i,
        }
    }
}

/// Computes the record to persist for a save request.
///
/// `existing` is the record addressed by the request id, or else the active
/// record for the request's (user, course). `resolved_at` is stamped exactly
/// when the status moves into `resolved` and is empty in every other state.
pub fn plan_intervention_save(
    existing: Option<&Intervention>,
    request: SaveInterventionRequest,
    actor: &str,
    now: DateTime<Utc>,
) -> Result<SavePlan, InterventionError> {
    let Some(existing) = existing else {
        let status = request.status.unwrap_or(InterventionStatus::Open);
        if !matches!(status, InterventionStatus::Open | InterventionStatus::InProgress) {
            return Err(InterventionError::InvalidInitialStatus(status));
        }
        return Ok(SavePlan::Create(Intervention {
            id: Uuid::new_v4(),
            user_id: request.user_id,
            course_id: request.course_id,
            risk_level: request.risk_level,
            risk_score: request.risk_score,
            reason: request.reason,
            assigned_to: request.assigned_to,
            status,
            action_plan: request.action_plan,
            due_date: request.due_date,
            resolved_at: None,
            created_by: actor.to_string(),
            created_at: now,
            updated_at: now,
        }));
    };

    if existing.user_id != request.user_id || existing.course_id != request.course_id {
        return Err(InterventionError::PairMismatch);
    }
    if existing.status.is_terminal() {
        return Err(InterventionError::Terminal(existing.status));
    }

    let status = request.status.unwrap_or(existing.status);
    if status != existing.status && !existing.status.can_transition_to(status) {
        return Err(InterventionError::InvalidTransition {
            from: existing.status,
            to: status,
        });
    }

    Ok(SavePlan::Update(Intervention {
        assigned_to: request.assigned_to,
        status,
        action_plan: request.action_plan,
        due_date: request.due_date,
        resolved_at: (status == InterventionStatus::Resolved).then_some(now),
        updated_at: now,
        ..existing.clone()
    }))
}

/// Active intervention id per (user, course).
fn active_by_pair(interventions: &[Intervention]) -> HashMap<(&str, &str), Uuid> {
    interventions
        .iter()
        .filter(|i| i.is_active())
        .map(|i| ((i.user_id.as_str(), i.course_id.as_str()), i.id))
        .collect()
}

/// Attaches the tracking intervention (if any) to each signal.
pub fn annotate_with_interventions(
    signals: Vec<RiskSignal>,
    interventions: &[Intervention],
) -> Vec<RiskCandidate> {
    let active = active_by_pair(interventions);
    signals
        .into_iter()
        .map(|signal| {
            let active_intervention_id = active
                .get(&(signal.user_id.as_str(), signal.course_id.as_str()))
                .copied();
            RiskCandidate {
                signal,
                active_intervention_id,
            }
        })
        .collect()
}

/// Signals for pairs no open or in-progress intervention is tracking yet.
pub fn new_candidates(signals: Vec<RiskSignal>, interventions: &[Intervention]) -> Vec<RiskSignal> {
    let active = active_by_pair(interventions);
    signals
        .into_iter()
        .filter(|s| !active.contains_key(&(s.user_id.as_str(), s.course_id.as_str())))
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::models::risk::RiskLevel;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn request(user: &str, course: &str, status: Option<InterventionStatus>) -> SaveInterventionRequest {
        SaveInterventionRequest {
            id: None,
            user_id: user.into(),
            course_id: course.into(),
            risk_level: RiskLevel::High,
            risk_score: 80,
            reason: "2 overdue assignments".into(),
            assigned_to: "staff-1".into(),
            status,
            action_plan: None,
            due_date: None,
        }
    }

    fn signal(user: &str, course: &str) -> RiskSignal {
        RiskSignal {
            user_id: user.into(),
            user_name: None,
            course_id: course.into(),
            course_title: "Course".into(),
            risk_level: RiskLevel::High,
            risk_score: 80,
            reason: "2 overdue assignments".into(),
            completion_percent: 10,
            overdue_assignments: 2,
            last_active_at: None,
            days_inactive: None,
        }
    }

    fn created(status: InterventionStatus) -> Intervention {
        let plan = plan_intervention_save(None, request("u1", "c1", None), "admin", now()).unwrap();
        Intervention {
            status,
            ..plan.into_intervention()
        }
    }

    #[test]
    fn test_create_defaults_to_open() {
        let plan = plan_intervention_save(None, request("u1", "c1", None), "admin", now()).unwrap();
        let SavePlan::Create(record) = plan else {
            panic!("expected a create plan");
        };
        assert_eq!(record.status, InterventionStatus::Open);
        assert_eq!(record.resolved_at, None);
        assert_eq!(record.created_by, "admin");
    }

    #[test]
    fn test_create_rejects_terminal_status() {
        let err = plan_intervention_save(
            None,
            request("u1", "c1", Some(InterventionStatus::Resolved)),
            "admin",
            now(),
        )
        .unwrap_err();
        assert_eq!(err, InterventionError::InvalidInitialStatus(InterventionStatus::Resolved));
    }

    #[test]
    fn test_update_keeps_identity_and_risk_snapshot() {
        let existing = created(InterventionStatus::Open);
        let mut req = request("u1", "c1", Some(InterventionStatus::InProgress));
        req.risk_score = 5;
        req.action_plan = Some("Call the learner".into());

        let later = now() + Duration::hours(2);
        let SavePlan::Update(record) = plan_intervention_save(Some(&existing), req, "admin", later).unwrap()
        else {
            panic!("expected an update plan");
        };
        assert_eq!(record.id, existing.id);
        assert_eq!(record.risk_score, 80);
        assert_eq!(record.status, InterventionStatus::InProgress);
        assert_eq!(record.action_plan.as_deref(), Some("Call the learner"));
        assert_eq!(record.created_at, existing.created_at);
        assert_eq!(record.updated_at, later);
        assert_eq!(record.resolved_at, None);
    }

    #[test]
    fn test_resolving_stamps_resolved_at() {
        let existing = created(InterventionStatus::InProgress);
        let plan = plan_intervention_save(
            Some(&existing),
            request("u1", "c1", Some(InterventionStatus::Resolved)),
            "admin",
            now(),
        )
        .unwrap();
        assert_eq!(plan.intervention().resolved_at, Some(now()));
    }

    #[test]
    fn test_dismissing_leaves_resolved_at_empty() {
        let existing = created(InterventionStatus::Open);
        let plan = plan_intervention_save(
            Some(&existing),
            request("u1", "c1", Some(InterventionStatus::Dismissed)),
            "admin",
            now(),
        )
        .unwrap();
        assert_eq!(plan.intervention().status, InterventionStatus::Dismissed);
        assert_eq!(plan.intervention().resolved_at, None);
    }

    #[test]
    fn test_terminal_records_are_frozen() {
        let existing = created(InterventionStatus::Resolved);
        let err = plan_intervention_save(Some(&existing), request("u1", "c1", None), "admin", now())
            .unwrap_err();
        assert_eq!(err, InterventionError::Terminal(InterventionStatus::Resolved));
    }

    #[test]
    fn test_in_progress_cannot_reopen() {
        let existing = created(InterventionStatus::InProgress);
        let err = plan_intervention_save(
            Some(&existing),
            request("u1", "c1", Some(InterventionStatus::Open)),
            "admin",
            now(),
        )
        .unwrap_err();
        assert!(matches!(err, InterventionError::InvalidTransition { .. }));
    }

    #[test]
    fn test_pair_mismatch_rejected() {
        let existing = created(InterventionStatus::Open);
        let err = plan_intervention_save(Some(&existing), request("u2", "c1", None), "admin", now())
            .unwrap_err();
        assert_eq!(err, InterventionError::PairMismatch);
    }

    #[test]
    fn test_transition_table() {
        use InterventionStatus::*;
        assert!(Open.can_transition_to(InProgress));
        assert!(Open.can_transition_to(Dismissed));
        assert!(InProgress.can_transition_to(Resolved));
        assert!(!InProgress.can_transition_to(Open));
        assert!(!Resolved.can_transition_to(Open));
        assert!(!Dismissed.can_transition_to(InProgress));
    }

    #[test]
    fn test_open_intervention_suppresses_new_candidate() {
        let tracked = created(InterventionStatus::Open);
        let signals = vec![signal("u1", "c1"), signal("u2", "c1")];

        let fresh = new_candidates(signals.clone(), std::slice::from_ref(&tracked));
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].user_id, "u2");

        let annotated = annotate_with_interventions(signals, std::slice::from_ref(&tracked));
        assert_eq!(annotated[0].active_intervention_id, Some(tracked.id));
        assert_eq!(annotated[1].active_intervention_id, None);
    }

    #[test]
    fn test_terminal_intervention_does_not_suppress() {
        let closed = created(InterventionStatus::Dismissed);
        let fresh = new_candidates(vec![signal("u1", "c1")], &[closed]);
        assert_eq!(fresh.len(), 1);
    }
}
