// src/config.rs

use std::{env, net::SocketAddr, str::FromStr};

use dotenvy::dotenv;
use serde::{Deserialize, Serialize};

/// Weights and bands for learner risk scoring.
///
/// Every weight only ever adds to the score, so lower completion, more
/// overdue work or longer inactivity can never lower it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskPolicy {
    /// Points added at 0% completion, scaled linearly down to 0 at 100%.
    pub completion_weight: u32,
    /// Points per overdue assignment.
    pub overdue_increment: u32,
    /// Days without activity before a learner counts as inactive.
    pub inactivity_days: u32,
    /// Flat points once the inactivity threshold is reached.
    pub inactivity_increment: u32,
    /// Extra points per inactive day beyond the threshold.
    pub stale_day_weight: u32,
    /// Maximum number of extra inactive days that still add points.
    pub stale_day_cap: u32,
    pub medium_threshold: u32,
    pub high_threshold: u32,
}

impl Default for RiskPolicy {
    fn default() -> Self {
        Self {
            completion_weight: 40,
            overdue_increment: 15,
            inactivity_days: 14,
            inactivity_increment: 20,
            stale_day_weight: 1,
            stale_day_cap: 20,
            medium_threshold: 30,
            high_threshold: 60,
        }
    }
}

impl RiskPolicy {
    pub fn from_env() -> Result<Self, String> {
        let defaults = Self::default();
        let policy = Self {
            completion_weight: env_or("RISK_COMPLETION_WEIGHT", defaults.completion_weight)?,
            overdue_increment: env_or("RISK_OVERDUE_INCREMENT", defaults.overdue_increment)?,
            inactivity_days: env_or("RISK_INACTIVITY_DAYS", defaults.inactivity_days)?,
            inactivity_increment: env_or("RISK_INACTIVITY_INCREMENT", defaults.inactivity_increment)?,
            stale_day_weight: env_or("RISK_STALE_DAY_WEIGHT", defaults.stale_day_weight)?,
            stale_day_cap: env_or("RISK_STALE_DAY_CAP", defaults.stale_day_cap)?,
            medium_threshold: env_or("RISK_MEDIUM_THRESHOLD", defaults.medium_threshold)?,
            high_threshold: env_or("RISK_HIGH_THRESHOLD", defaults.high_threshold)?,
        };
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.inactivity_days == 0 {
            return Err("RISK_INACTIVITY_DAYS must be at least 1".to_string());
        }
        if self.medium_threshold > self.high_threshold {
            return Err(format!(
                "RISK_MEDIUM_THRESHOLD ({}) must not exceed RISK_HIGH_THRESHOLD ({})",
                self.medium_threshold, self.high_threshold
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string. Without it the service runs on the in-memory store.
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub rust_log: String,
    pub bind_addr: SocketAddr,
    pub cors_origins: Vec<String>,
    pub risk_policy: RiskPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").ok().filter(|v| !v.trim().is_empty());

        let jwt_secret = env::var("JWT_SECRET").map_err(|_| "JWT_SECRET must be set".to_string())?;

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let bind_addr = env_or("BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 3000)))?;

        let cors_origins = env::var("CORS_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_else(|_| {
                vec![
                    "http://localhost:3000".to_string(),
                    "http://127.0.0.1:3000".to_string(),
                ]
            });

        Ok(Self {
            database_url,
            jwt_secret,
            rust_log,
            bind_addr,
            cors_origins,
            risk_policy: RiskPolicy::from_env()?,
        })
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> Result<T, String> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| format!("{} has an invalid value: '{}'", key, raw)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_is_valid() {
        assert!(RiskPolicy::default().validate().is_ok());
    }

    #[test]
    fn test_inverted_bands_rejected() {
        let policy = RiskPolicy {
            medium_threshold: 80,
            high_threshold: 50,
            ..RiskPolicy::default()
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_zero_inactivity_days_rejected() {
        let policy = RiskPolicy {
            inactivity_days: 0,
            ..RiskPolicy::default()
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_env_or_falls_back_to_default() {
        let value: u32 = env_or("LMS_ENGINE_TEST_UNSET_VARIABLE", 7).unwrap();
        assert_eq!(value, 7);
    }
}
