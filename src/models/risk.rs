// src/models/risk.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Risk classification of a learner in a course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            other => Err(format!("Unknown risk level '{}'", other)),
        }
    }
}

/// Derived, recomputed on demand. Only acted-on signals become interventions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskSignal {
    pub user_id: String,
    pub user_name: Option<String>,
    pub course_id: String,
    pub course_title: String,
    pub risk_level: RiskLevel,
    pub risk_score: u32,
    pub reason: String,
    pub completion_percent: u32,
    pub overdue_assignments: u32,
    pub last_active_at: Option<DateTime<Utc>>,
    /// Whole days since `last_active_at`; `None` when the learner was never active.
    pub days_inactive: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_level_round_trip_names() {
        assert_eq!("HIGH".parse::<RiskLevel>(), Ok(RiskLevel::High));
        assert_eq!(RiskLevel::Medium.to_string(), "medium");
        assert!("severe".parse::<RiskLevel>().is_err());
        assert!(RiskLevel::High > RiskLevel::Medium);
    }
}
