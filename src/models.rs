use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::BoundaryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AttendanceStatus {
    Attend,
    Absent,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Attend => "ATTEND",
            AttendanceStatus::Absent => "ABSENT",
        }
    }
}

impl FromStr for AttendanceStatus {
    type Err = BoundaryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "ATTEND" => Ok(AttendanceStatus::Attend),
            "ABSENT" => Ok(AttendanceStatus::Absent),
            other => Err(BoundaryError::InvalidStatus {
                field: "attendance",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContactStatus {
    Success,
    Failed,
}

impl ContactStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContactStatus::Success => "SUCCESS",
            ContactStatus::Failed => "FAILED",
        }
    }
}

impl FromStr for ContactStatus {
    type Err = BoundaryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "SUCCESS" => Ok(ContactStatus::Success),
            "FAILED" => Ok(ContactStatus::Failed),
            other => Err(BoundaryError::InvalidStatus {
                field: "contact",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub date: NaiveDate,
    pub status: AttendanceStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentRecord {
    pub date: NaiveDate,
    pub name: String,
    pub submitted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRecord {
    pub date: NaiveDate,
    pub status: ContactStatus,
}

/// Every raw record held for one student at evaluation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentSnapshot {
    pub student_id: String,
    pub student_name: String,
    #[serde(default)]
    pub attendance: Vec<AttendanceRecord>,
    #[serde(default)]
    pub assignments: Vec<AssignmentRecord>,
    #[serde(default)]
    pub contacts: Vec<ContactRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = BoundaryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "LOW" => Ok(RiskLevel::Low),
            "MEDIUM" => Ok(RiskLevel::Medium),
            "HIGH" => Ok(RiskLevel::High),
            _ => Err(BoundaryError::InvalidRiskLevel(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RiskResult {
    pub student_id: String,
    pub score: u8,
    pub risk_level: RiskLevel,
    pub note: String,
}

/// A [`RiskResult`] as persisted by the storage layer.
#[derive(Debug, Clone, Serialize)]
pub struct StoredEvaluation {
    pub id: Uuid,
    pub student_id: String,
    pub score: u8,
    pub risk_level: RiskLevel,
    pub note: String,
    pub evaluated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct StudentRow {
    pub student_id: String,
    pub student_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentSummary {
    pub student_id: String,
    pub student_name: String,
    pub attendance_rate: f64,
    pub submission_rate: f64,
    pub failed_contacts: usize,
    pub total_attendance_sessions: usize,
    pub total_assignments: usize,
    pub total_contacts: usize,
    pub latest_evaluation: Option<StoredEvaluation>,
}
