use crate::config::{LevelMode, ScoringConfig};
use crate::models::{
    AttendanceStatus, ContactStatus, RiskLevel, RiskResult, StoredEvaluation, StudentSnapshot,
    StudentSummary,
};

pub const NO_RISK_NOTE: &str = "No signs of disengagement detected";

pub fn attendance_risk(snapshot: &StudentSnapshot, config: &ScoringConfig) -> bool {
    match attendance_rate(snapshot) {
        Some(rate) => rate < config.attendance_rate_threshold,
        None => false,
    }
}

pub fn assignment_risk(snapshot: &StudentSnapshot, config: &ScoringConfig) -> bool {
    match submission_rate(snapshot) {
        Some(rate) => rate < config.assignment_rate_threshold,
        None => false,
    }
}

pub fn contact_risk(snapshot: &StudentSnapshot, config: &ScoringConfig) -> bool {
    failed_contacts(snapshot) as u64 >= u64::from(config.failed_contact_threshold)
}

fn attendance_rate(snapshot: &StudentSnapshot) -> Option<f64> {
    if snapshot.attendance.is_empty() {
        return None;
    }
    let attended = snapshot
        .attendance
        .iter()
        .filter(|record| record.status == AttendanceStatus::Attend)
        .count();
    Some(attended as f64 / snapshot.attendance.len() as f64)
}

fn submission_rate(snapshot: &StudentSnapshot) -> Option<f64> {
    if snapshot.assignments.is_empty() {
        return None;
    }
    let submitted = snapshot
        .assignments
        .iter()
        .filter(|record| record.submitted)
        .count();
    Some(submitted as f64 / snapshot.assignments.len() as f64)
}

fn failed_contacts(snapshot: &StudentSnapshot) -> usize {
    snapshot
        .contacts
        .iter()
        .filter(|record| record.status == ContactStatus::Failed)
        .count()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RiskFlags {
    pub attendance: bool,
    pub assignment: bool,
    pub communication: bool,
}

impl RiskFlags {
    pub fn evaluate(snapshot: &StudentSnapshot, config: &ScoringConfig) -> Self {
        Self {
            attendance: attendance_risk(snapshot, config),
            assignment: assignment_risk(snapshot, config),
            communication: contact_risk(snapshot, config),
        }
    }
}

/// Counts the raised flags and names them in fixed order.
pub fn aggregate(flags: RiskFlags) -> (u8, String) {
    let factors: Vec<&str> = [
        (flags.attendance, "attendance"),
        (flags.assignment, "assignment"),
        (flags.communication, "communication"),
    ]
    .into_iter()
    .filter_map(|(raised, name)| raised.then_some(name))
    .collect();

    let note = if factors.is_empty() {
        NO_RISK_NOTE.to_string()
    } else {
        format!("{} risk factors", factors.join(", "))
    };

    (factors.len() as u8, note)
}

/// HIGH is checked before MEDIUM; boundaries are not reordered.
pub fn classify(score: u8, mode: &LevelMode, config: &ScoringConfig) -> RiskLevel {
    match mode {
        LevelMode::Explicit(thresholds) => {
            if score >= thresholds.high_threshold {
                RiskLevel::High
            } else if score >= thresholds.medium_threshold {
                RiskLevel::Medium
            } else {
                RiskLevel::Low
            }
        }
        LevelMode::Defaults => config.level_for_score(score),
    }
}

/// Stateless evaluator bound to one scoring configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct RiskEngine {
    config: ScoringConfig,
}

impl RiskEngine {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn evaluate(
        &self,
        snapshot: &StudentSnapshot,
        config: Option<&ScoringConfig>,
        levels: &LevelMode,
    ) -> RiskResult {
        let config = config.unwrap_or(&self.config);
        let flags = RiskFlags::evaluate(snapshot, config);
        let (score, note) = aggregate(flags);
        let risk_level = classify(score, levels, config);

        tracing::debug!(
            student_id = %snapshot.student_id,
            score,
            risk_level = %risk_level,
            "evaluated student"
        );

        RiskResult {
            student_id: snapshot.student_id.clone(),
            score,
            risk_level,
            note,
        }
    }

    /// Results come back in input order, always with the built-in level table.
    pub fn evaluate_batch(
        &self,
        snapshots: &[StudentSnapshot],
        config: Option<&ScoringConfig>,
    ) -> Vec<RiskResult> {
        snapshots
            .iter()
            .map(|snapshot| self.evaluate(snapshot, config, &LevelMode::Defaults))
            .collect()
    }
}

pub fn summarize(snapshot: &StudentSnapshot, latest: Option<StoredEvaluation>) -> StudentSummary {
    StudentSummary {
        student_id: snapshot.student_id.clone(),
        student_name: snapshot.student_name.clone(),
        attendance_rate: as_percent(attendance_rate(snapshot)),
        submission_rate: as_percent(submission_rate(snapshot)),
        failed_contacts: failed_contacts(snapshot),
        total_attendance_sessions: snapshot.attendance.len(),
        total_assignments: snapshot.assignments.len(),
        total_contacts: snapshot.contacts.len(),
        latest_evaluation: latest,
    }
}

fn as_percent(rate: Option<f64>) -> f64 {
    let percent = rate.unwrap_or(0.0) * 100.0;
    (percent * 100.0).round() / 100.0
}
