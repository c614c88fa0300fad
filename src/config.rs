use serde::{Deserialize, Serialize};

use crate::error::BoundaryError;
use crate::models::RiskLevel;

/// Thresholds that decide when a signal counts as a risk flag.
///
/// Out-of-range values are accepted as-is; [`ScoringConfig::validate`] exists
/// for callers that read thresholds from user input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_attendance_rate_threshold")]
    pub attendance_rate_threshold: f64,
    #[serde(default = "default_assignment_rate_threshold")]
    pub assignment_rate_threshold: f64,
    #[serde(default = "default_failed_contact_threshold")]
    pub failed_contact_threshold: u32,
}

fn default_attendance_rate_threshold() -> f64 {
    0.75
}

fn default_assignment_rate_threshold() -> f64 {
    0.50
}

fn default_failed_contact_threshold() -> u32 {
    2
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            attendance_rate_threshold: default_attendance_rate_threshold(),
            assignment_rate_threshold: default_assignment_rate_threshold(),
            failed_contact_threshold: default_failed_contact_threshold(),
        }
    }
}

impl ScoringConfig {
    /// Built-in score table: 0-1 LOW, 2 MEDIUM, 3 HIGH.
    pub fn level_for_score(&self, score: u8) -> RiskLevel {
        match score {
            0 | 1 => RiskLevel::Low,
            2 => RiskLevel::Medium,
            _ => RiskLevel::High,
        }
    }

    pub fn validate(&self) -> Result<(), BoundaryError> {
        validate_rate(self.attendance_rate_threshold, "attendance")?;
        validate_rate(self.assignment_rate_threshold, "assignment")
    }
}

fn validate_rate(rate: f64, name: &str) -> Result<(), BoundaryError> {
    if (0.0..=1.0).contains(&rate) {
        Ok(())
    } else {
        Err(BoundaryError::InvalidConfig(format!(
            "{name} rate threshold must be between 0.0 and 1.0, got {rate}"
        )))
    }
}

/// Explicit score boundaries for LOW/MEDIUM/HIGH.
///
/// `low_threshold` is stored and validated but classification only consults
/// the medium and high boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelThresholds {
    pub low_threshold: u8,
    pub medium_threshold: u8,
    pub high_threshold: u8,
}

impl Default for LevelThresholds {
    fn default() -> Self {
        Self {
            low_threshold: 1,
            medium_threshold: 2,
            high_threshold: 3,
        }
    }
}

impl LevelThresholds {
    pub const MAX_BOUNDARY: u8 = 5;

    pub fn validate(&self) -> Result<(), BoundaryError> {
        for (name, value) in [
            ("low", self.low_threshold),
            ("medium", self.medium_threshold),
            ("high", self.high_threshold),
        ] {
            if value > Self::MAX_BOUNDARY {
                return Err(BoundaryError::InvalidConfig(format!(
                    "{name} threshold must be between 0 and {}, got {value}",
                    Self::MAX_BOUNDARY
                )));
            }
        }
        Ok(())
    }
}

/// How a score is mapped to a [`RiskLevel`] for one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LevelMode {
    /// Use the scoring config's built-in table.
    #[default]
    Defaults,
    Explicit(LevelThresholds),
}

/// Settings persisted by the configuration store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemConfig {
    #[serde(default)]
    pub risk_thresholds: LevelThresholds,
    #[serde(default = "default_refresh_interval")]
    pub auto_refresh_interval: u32,
    #[serde(default = "default_enable_notifications")]
    pub enable_notifications: bool,
    #[serde(default = "default_students_per_page")]
    pub max_students_per_page: u32,
}

fn default_refresh_interval() -> u32 {
    30
}

fn default_enable_notifications() -> bool {
    true
}

fn default_students_per_page() -> u32 {
    20
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            risk_thresholds: LevelThresholds::default(),
            auto_refresh_interval: default_refresh_interval(),
            enable_notifications: default_enable_notifications(),
            max_students_per_page: default_students_per_page(),
        }
    }
}

impl SystemConfig {
    pub fn validate(&self) -> Result<(), BoundaryError> {
        self.risk_thresholds.validate()?;
        if !(10..=300).contains(&self.auto_refresh_interval) {
            return Err(BoundaryError::InvalidConfig(format!(
                "auto refresh interval must be between 10 and 300 seconds, got {}",
                self.auto_refresh_interval
            )));
        }
        if !(5..=100).contains(&self.max_students_per_page) {
            return Err(BoundaryError::InvalidConfig(format!(
                "students per page must be between 5 and 100, got {}",
                self.max_students_per_page
            )));
        }
        Ok(())
    }

    /// Applies the supplied fields of `update`; the result must still validate.
    pub fn apply(&self, update: &ConfigUpdate) -> Result<SystemConfig, BoundaryError> {
        let mut next = self.clone();
        if let Some(thresholds) = update.risk_thresholds {
            next.risk_thresholds = thresholds;
        }
        if let Some(interval) = update.auto_refresh_interval {
            next.auto_refresh_interval = interval;
        }
        if let Some(enabled) = update.enable_notifications {
            next.enable_notifications = enabled;
        }
        if let Some(per_page) = update.max_students_per_page {
            next.max_students_per_page = per_page;
        }
        next.validate()?;
        Ok(next)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigUpdate {
    pub risk_thresholds: Option<LevelThresholds>,
    pub auto_refresh_interval: Option<u32>,
    pub enable_notifications: Option<bool>,
    pub max_students_per_page: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scoring_defaults_match_policy() {
        let config = ScoringConfig::default();
        assert_eq!(config.attendance_rate_threshold, 0.75);
        assert_eq!(config.assignment_rate_threshold, 0.50);
        assert_eq!(config.failed_contact_threshold, 2);
    }

    #[test]
    fn built_in_table_maps_scores() {
        let config = ScoringConfig::default();
        assert_eq!(config.level_for_score(0), RiskLevel::Low);
        assert_eq!(config.level_for_score(1), RiskLevel::Low);
        assert_eq!(config.level_for_score(2), RiskLevel::Medium);
        assert_eq!(config.level_for_score(3), RiskLevel::High);
    }

    #[test]
    fn out_of_range_rates_are_accepted_but_fail_validation() {
        let config = ScoringConfig {
            attendance_rate_threshold: 1.5,
            ..ScoringConfig::default()
        };
        assert_eq!(config.attendance_rate_threshold, 1.5);
        assert!(config.validate().is_err());
        assert!(ScoringConfig::default().validate().is_ok());
    }

    #[test]
    fn scoring_config_fills_missing_fields() {
        let config: ScoringConfig =
            serde_json::from_str(r#"{"failed_contact_threshold": 4}"#).unwrap();
        assert_eq!(config.failed_contact_threshold, 4);
        assert_eq!(config.attendance_rate_threshold, 0.75);
    }

    #[test]
    fn level_thresholds_bounded_by_five() {
        assert!(LevelThresholds::default().validate().is_ok());
        let thresholds = LevelThresholds {
            high_threshold: 6,
            ..LevelThresholds::default()
        };
        assert!(thresholds.validate().is_err());
    }

    #[test]
    fn apply_overwrites_only_supplied_fields() {
        let current = SystemConfig::default();
        let update = ConfigUpdate {
            max_students_per_page: Some(50),
            ..ConfigUpdate::default()
        };
        let next = current.apply(&update).unwrap();
        assert_eq!(next.max_students_per_page, 50);
        assert_eq!(next.auto_refresh_interval, 30);
        assert_eq!(next.risk_thresholds, LevelThresholds::default());
    }

    #[test]
    fn apply_rejects_out_of_range_settings() {
        let update = ConfigUpdate {
            auto_refresh_interval: Some(5),
            ..ConfigUpdate::default()
        };
        assert!(SystemConfig::default().apply(&update).is_err());
    }

    #[test]
    fn system_config_round_trips_through_json() {
        let config = SystemConfig {
            enable_notifications: false,
            ..SystemConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let parsed: SystemConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
