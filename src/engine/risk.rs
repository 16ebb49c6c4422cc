// src/engine/risk.rs

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::{
    config::RiskPolicy,
    models::{
        activity::{Assignment, RiskInputs},
        risk::{RiskLevel, RiskSignal},
    },
};

/// Raw metrics for one learner in one course, before scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairMetrics {
    pub completion_percent: u32,
    pub overdue_assignments: u32,
    /// `None` when the learner has no recorded activity in the course.
    pub days_inactive: Option<i64>,
}

/// Points contributed by inactivity alone.
fn inactivity_points(days_inactive: Option<i64>, policy: &RiskPolicy) -> u32 {
    let threshold = i64::from(policy.inactivity_days);
    let stale_days = match days_inactive {
        None => policy.stale_day_cap,
        Some(days) if days >= threshold => {
            u32::try_from(days - threshold).unwrap_or(u32::MAX).min(policy.stale_day_cap)
        }
        Some(_) => return 0,
    };
    policy
        .inactivity_increment
        .saturating_add(policy.stale_day_weight.saturating_mul(stale_days))
}

/// Weighted risk score. Non-decreasing as completion falls, overdue count
/// rises, or inactivity grows.
pub fn risk_score(metrics: &PairMetrics, policy: &RiskPolicy) -> u32 {
    let missing = 100 - metrics.completion_percent.min(100);
    let completion_points = policy.completion_weight.saturating_mul(missing) / 100;
    let overdue_points = policy
        .overdue_increment
        .saturating_mul(metrics.overdue_assignments);

    completion_points
        .saturating_add(overdue_points)
        .saturating_add(inactivity_points(metrics.days_inactive, policy))
}

pub fn risk_level(score: u32, policy: &RiskPolicy) -> RiskLevel {
    if score >= policy.high_threshold {
        RiskLevel::High
    } else if score >= policy.medium_threshold {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// Human-readable summary. Factors are always listed in the same order:
/// overdue work, completion, inactivity.
pub fn risk_reason(metrics: &PairMetrics, policy: &RiskPolicy) -> String {
    let mut parts = Vec::new();

    match metrics.overdue_assignments {
        0 => {}
        1 => parts.push("1 overdue assignment".to_string()),
        n => parts.push(format!("{} overdue assignments", n)),
    }

    if metrics.completion_percent < 100 {
        parts.push(format!("{}% complete", metrics.completion_percent));
    }

    match metrics.days_inactive {
        None => parts.push("no recorded activity".to_string()),
        Some(days) if days >= i64::from(policy.inactivity_days) => {
            parts.push(format!("inactive {} days", days))
        }
        Some(_) => {}
    }

    if parts.is_empty() {
        "on track".to_string()
    } else {
        parts.join(", ")
    }
}

/// Integer percent, halves rounded up; 0 when `whole == 0`.
fn percent(part: usize, whole: usize) -> u32 {
    if whole == 0 {
        return 0;
    }
    ((200 * part + whole) / (2 * whole)) as u32
}

fn later(current: Option<DateTime<Utc>>, candidate: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (current, candidate) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

/// Computes risk signals for every (learner, course) pair.
///
/// A pair is evaluated when the course has modules or published assignments
/// and the learner is enrolled in it or has progress or submissions for it.
/// Unknown users, courses, modules and assignments are ignored. Low-risk
/// pairs are only returned with `include_low`. Output is sorted by score
/// (highest first), then user id, then course id.
pub fn build_lms_risk_signals(
    inputs: &RiskInputs,
    policy: &RiskPolicy,
    now: DateTime<Utc>,
    include_low: bool,
) -> Vec<RiskSignal> {
    let users: HashMap<&str, Option<&str>> = inputs
        .users
        .iter()
        .map(|u| (u.id.as_str(), u.full_name.as_deref()))
        .collect();
    let courses: HashMap<&str, &str> = inputs
        .courses
        .iter()
        .map(|c| (c.id.as_str(), c.title.as_str()))
        .collect();

    let mut modules_by_course: HashMap<&str, usize> = HashMap::new();
    let mut module_course: HashMap<&str, &str> = HashMap::new();
    for module in inputs
        .modules
        .iter()
        .filter(|m| courses.contains_key(m.course_id.as_str()))
    {
        if module_course
            .insert(module.id.as_str(), module.course_id.as_str())
            .is_none()
        {
            *modules_by_course.entry(module.course_id.as_str()).or_default() += 1;
        }
    }

    let mut assignments_by_course: HashMap<&str, Vec<&Assignment>> = HashMap::new();
    let mut assignment_course: HashMap<&str, &str> = HashMap::new();
    for assignment in inputs
        .assignments
        .iter()
        .filter(|a| a.is_published && courses.contains_key(a.course_id.as_str()))
    {
        assignment_course.insert(assignment.id.as_str(), assignment.course_id.as_str());
        assignments_by_course
            .entry(assignment.course_id.as_str())
            .or_default()
            .push(assignment);
    }

    let qualifies = |course_id: &str| {
        modules_by_course.contains_key(course_id) || assignments_by_course.contains_key(course_id)
    };

    // (user, course) -> completed module ids and latest activity.
    let mut completed: HashMap<(&str, &str), HashSet<&str>> = HashMap::new();
    let mut last_active: HashMap<(&str, &str), Option<DateTime<Utc>>> = HashMap::new();
    let mut turned_in: HashSet<(&str, &str)> = HashSet::new();
    let mut pairs: BTreeSet<(&str, &str)> = BTreeSet::new();

    for enrollment in &inputs.enrollments {
        pairs.insert((enrollment.user_id.as_str(), enrollment.course_id.as_str()));
    }

    for row in &inputs.progress {
        let Some(course_id) = module_course.get(row.module_id.as_str()) else {
            continue;
        };
        let key = (row.user_id.as_str(), *course_id);
        pairs.insert(key);
        if row.completed {
            completed.entry(key).or_default().insert(row.module_id.as_str());
        }
        let slot = last_active.entry(key).or_default();
        *slot = later(*slot, later(row.completed_at, row.last_watched_at));
    }

    for submission in &inputs.submissions {
        let Some(course_id) = assignment_course.get(submission.assignment_id.as_str()) else {
            continue;
        };
        let key = (submission.user_id.as_str(), *course_id);
        pairs.insert(key);
        if submission.is_turned_in() {
            turned_in.insert((submission.user_id.as_str(), submission.assignment_id.as_str()));
        }
        let slot = last_active.entry(key).or_default();
        *slot = later(*slot, submission.submitted_at);
    }

    let mut signals: Vec<RiskSignal> = pairs
        .into_iter()
        .filter(|(user_id, course_id)| users.contains_key(*user_id) && qualifies(*course_id))
        .filter_map(|key @ (user_id, course_id)| {
            let total_modules = modules_by_course.get(course_id).copied().unwrap_or(0);
            let completed_modules = completed.get(&key).map(HashSet::len).unwrap_or(0);

            let overdue_assignments = assignments_by_course
                .get(course_id)
                .map(|list| {
                    list.iter()
                        .filter(|a| a.due_at.is_some_and(|due| due < now))
                        .filter(|a| !turned_in.contains(&(user_id, a.id.as_str())))
                        .count()
                })
                .unwrap_or(0) as u32;

            let last_active_at = last_active.get(&key).copied().flatten();
            let metrics = PairMetrics {
                completion_percent: percent(completed_modules, total_modules),
                overdue_assignments,
                days_inactive: last_active_at.map(|at| (now - at).num_days().max(0)),
            };

            let score = risk_score(&metrics, policy);
            let level = risk_level(score, policy);
            if level == RiskLevel::Low && !include_low {
                return None;
            }

            Some(RiskSignal {
                user_id: user_id.to_string(),
                user_name: users.get(user_id).copied().flatten().map(str::to_string),
                course_id: course_id.to_string(),
                course_title: courses.get(course_id).copied().unwrap_or_default().to_string(),
                risk_level: level,
                risk_score: score,
                reason: risk_reason(&metrics, policy),
                completion_percent: metrics.completion_percent,
                overdue_assignments,
                last_active_at,
                days_inactive: metrics.days_inactive,
            })
        })
        .collect();

    signals.sort_by(|a, b| {
        b.risk_score
            .cmp(&a.risk_score)
            .then_with(|| a.user_id.cmp(&b.user_id))
            .then_with(|| a.course_id.cmp(&b.course_id))
    });

    tracing::debug!("Computed {} risk signals", signals.len());
    signals
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::models::activity::{
        AssignmentSubmission, Course, CourseModule, Enrollment, LmsUser, ModuleProgress,
    };

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn metrics(completion: u32, overdue: u32, days: Option<i64>) -> PairMetrics {
        PairMetrics {
            completion_percent: completion,
            overdue_assignments: overdue,
            days_inactive: days,
        }
    }

    /// One course with 5 modules and one published assignment due yesterday.
    fn course_fixture() -> RiskInputs {
        RiskInputs {
            users: vec![
                LmsUser { id: "u1".into(), full_name: Some("Ada Donor".into()) },
                LmsUser { id: "u2".into(), full_name: None },
            ],
            courses: vec![Course { id: "c1".into(), title: "Stewardship 101".into() }],
            modules: (1..=5)
                .map(|i| CourseModule { id: format!("m{}", i), course_id: "c1".into() })
                .collect(),
            assignments: vec![Assignment {
                id: "a1".into(),
                course_id: "c1".into(),
                title: "Reflection".into(),
                due_at: Some(now() - Duration::days(1)),
                passing_percent: Some(70),
                is_published: true,
            }],
            ..RiskInputs::default()
        }
    }

    fn progress(user: &str, module: &str, completed: bool, days_ago: i64) -> ModuleProgress {
        let at = now() - Duration::days(days_ago);
        ModuleProgress {
            user_id: user.into(),
            module_id: module.into(),
            completed,
            completed_at: completed.then_some(at),
            last_watched_at: Some(at),
        }
    }

    fn submission(user: &str, assignment: &str, status: &str, days_ago: i64) -> AssignmentSubmission {
        AssignmentSubmission {
            assignment_id: assignment.into(),
            user_id: user.into(),
            status: status.into(),
            score: None,
            submitted_at: Some(now() - Duration::days(days_ago)),
            graded_at: None,
        }
    }

    #[test]
    fn test_score_monotonic_in_completion() {
        let policy = RiskPolicy::default();
        let mut previous = 0;
        for completion in (0..=100).rev() {
            let score = risk_score(&metrics(completion, 0, Some(1)), &policy);
            assert!(score >= previous);
            previous = score;
        }
        assert!(
            risk_score(&metrics(20, 1, Some(3)), &policy) >= risk_score(&metrics(80, 1, Some(3)), &policy)
        );
    }

    #[test]
    fn test_score_monotonic_in_overdue() {
        let policy = RiskPolicy::default();
        for overdue in 0..10 {
            assert!(
                risk_score(&metrics(50, overdue + 1, Some(2)), &policy)
                    >= risk_score(&metrics(50, overdue, Some(2)), &policy)
            );
        }
    }

    #[test]
    fn test_score_monotonic_in_inactivity() {
        let policy = RiskPolicy::default();
        let mut previous = 0;
        for days in 0..120 {
            let score = risk_score(&metrics(50, 1, Some(days)), &policy);
            assert!(score >= previous, "score dropped at day {}", days);
            previous = score;
        }
        assert!(risk_score(&metrics(50, 1, None), &policy) >= previous);
    }

    #[test]
    fn test_level_bands() {
        let policy = RiskPolicy::default();
        assert_eq!(risk_level(0, &policy), RiskLevel::Low);
        assert_eq!(risk_level(29, &policy), RiskLevel::Low);
        assert_eq!(risk_level(30, &policy), RiskLevel::Medium);
        assert_eq!(risk_level(60, &policy), RiskLevel::High);
    }

    #[test]
    fn test_reason_lists_factors_in_order() {
        let policy = RiskPolicy::default();
        assert_eq!(
            risk_reason(&metrics(12, 3, Some(21)), &policy),
            "3 overdue assignments, 12% complete, inactive 21 days"
        );
        assert_eq!(
            risk_reason(&metrics(0, 1, None), &policy),
            "1 overdue assignment, 0% complete, no recorded activity"
        );
        assert_eq!(risk_reason(&metrics(100, 0, Some(2)), &policy), "on track");
    }

    #[test]
    fn test_engaged_learner_is_low() {
        let mut inputs = course_fixture();
        for i in 1..=5 {
            inputs.progress.push(progress("u1", &format!("m{}", i), true, 2));
        }
        inputs.submissions.push(submission("u1", "a1", "graded", 3));

        let policy = RiskPolicy::default();
        assert!(build_lms_risk_signals(&inputs, &policy, now(), false).is_empty());

        let all = build_lms_risk_signals(&inputs, &policy, now(), true);
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].risk_level, RiskLevel::Low);
        assert_eq!(all[0].completion_percent, 100);
        assert_eq!(all[0].overdue_assignments, 0);
        assert_eq!(all[0].reason, "on track");
    }

    #[test]
    fn test_disengaged_learner_is_flagged() {
        let mut inputs = course_fixture();
        inputs.progress.push(progress("u2", "m1", true, 30));
        inputs.submissions.push(submission("u2", "a1", "draft", 30));

        let signals = build_lms_risk_signals(&inputs, &RiskPolicy::default(), now(), false);
        assert_eq!(signals.len(), 1);
        let signal = &signals[0];
        assert_eq!(signal.user_id, "u2");
        assert_eq!(signal.course_title, "Stewardship 101");
        assert_eq!(signal.completion_percent, 20);
        assert_eq!(signal.overdue_assignments, 1);
        assert_eq!(signal.days_inactive, Some(30));
        // 32 (completion) + 15 (overdue) + 20 + 16 (inactivity)
        assert_eq!(signal.risk_score, 83);
        assert_eq!(signal.risk_level, RiskLevel::High);
        assert_eq!(signal.reason, "1 overdue assignment, 20% complete, inactive 30 days");
    }

    #[test]
    fn test_enrolled_without_activity_is_flagged() {
        let mut inputs = course_fixture();
        inputs.enrollments.push(Enrollment { user_id: "u1".into(), course_id: "c1".into() });

        let signals = build_lms_risk_signals(&inputs, &RiskPolicy::default(), now(), false);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].last_active_at, None);
        assert_eq!(signals[0].days_inactive, None);
        assert!(signals[0].reason.contains("no recorded activity"));
    }

    #[test]
    fn test_course_without_modules_or_assignments_is_excluded() {
        let inputs = RiskInputs {
            users: vec![LmsUser { id: "u1".into(), full_name: None }],
            courses: vec![Course { id: "empty".into(), title: "Empty".into() }],
            enrollments: vec![Enrollment { user_id: "u1".into(), course_id: "empty".into() }],
            assignments: vec![Assignment {
                id: "draft".into(),
                course_id: "empty".into(),
                title: "Unpublished".into(),
                due_at: Some(now() - Duration::days(10)),
                passing_percent: None,
                is_published: false,
            }],
            ..RiskInputs::default()
        };

        assert!(build_lms_risk_signals(&inputs, &RiskPolicy::default(), now(), true).is_empty());
    }

    #[test]
    fn test_assignment_only_course_has_zero_completion() {
        let mut inputs = course_fixture();
        inputs.modules.clear();
        inputs.enrollments.push(Enrollment { user_id: "u1".into(), course_id: "c1".into() });

        let signals = build_lms_risk_signals(&inputs, &RiskPolicy::default(), now(), true);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].completion_percent, 0);
    }

    #[test]
    fn test_completion_rounds_half_up() {
        assert_eq!(percent(2, 3), 67);
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(1, 8), 13);
        assert_eq!(percent(0, 0), 0);

        let mut inputs = course_fixture();
        inputs.modules.truncate(3);
        inputs.progress.push(progress("u1", "m1", true, 20));
        inputs.progress.push(progress("u1", "m2", true, 20));

        let signals = build_lms_risk_signals(&inputs, &RiskPolicy::default(), now(), true);
        assert_eq!(signals[0].completion_percent, 67);
        assert!(signals[0].reason.contains("67% complete"));
    }

    #[test]
    fn test_future_due_dates_are_not_overdue() {
        let mut inputs = course_fixture();
        inputs.assignments[0].due_at = Some(now() + Duration::days(3));
        inputs.progress.push(progress("u1", "m1", false, 1));

        let signals = build_lms_risk_signals(&inputs, &RiskPolicy::default(), now(), true);
        assert_eq!(signals[0].overdue_assignments, 0);
    }

    #[test]
    fn test_adding_overdue_assignment_never_lowers_pair_score() {
        let mut inputs = course_fixture();
        inputs.progress.push(progress("u1", "m1", true, 5));
        let policy = RiskPolicy::default();
        let before = build_lms_risk_signals(&inputs, &policy, now(), true)[0].risk_score;

        inputs.assignments.push(Assignment {
            id: "a2".into(),
            course_id: "c1".into(),
            title: "Second".into(),
            due_at: Some(now() - Duration::days(2)),
            passing_percent: None,
            is_published: true,
        });
        let after = build_lms_risk_signals(&inputs, &policy, now(), true)[0].risk_score;
        assert!(after >= before);
    }

    #[test]
    fn test_unknown_rows_are_ignored_and_output_sorted() {
        let mut inputs = course_fixture();
        inputs.progress.push(progress("ghost", "m1", false, 40));
        inputs.progress.push(progress("u1", "m-unknown", true, 1));
        inputs.progress.push(progress("u1", "m1", false, 20));
        inputs.progress.push(progress("u2", "m1", false, 60));

        let signals = build_lms_risk_signals(&inputs, &RiskPolicy::default(), now(), true);
        let users: Vec<&str> = signals.iter().map(|s| s.user_id.as_str()).collect();
        assert_eq!(users, vec!["u2", "u1"]);
        assert!(signals[0].risk_score >= signals[1].risk_score);
    }

    #[test]
    fn test_signals_are_deterministic() {
        let mut inputs = course_fixture();
        inputs.progress.push(progress("u1", "m2", true, 18));
        inputs.progress.push(progress("u2", "m3", false, 25));
        let policy = RiskPolicy::default();
        assert_eq!(
            build_lms_risk_signals(&inputs, &policy, now(), true),
            build_lms_risk_signals(&inputs, &policy, now(), true)
        );
    }
}
