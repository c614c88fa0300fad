use std::fmt::Write;

use crate::models::{RiskLevel, RiskResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LevelDistribution {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
}

pub fn distribution(results: &[RiskResult]) -> LevelDistribution {
    let mut counts = LevelDistribution::default();
    for result in results {
        match result.risk_level {
            RiskLevel::Low => counts.low += 1,
            RiskLevel::Medium => counts.medium += 1,
            RiskLevel::High => counts.high += 1,
        }
    }
    counts
}

pub fn build_report(generated_for: &str, results: &[RiskResult]) -> String {
    let counts = distribution(results);

    let mut ranked: Vec<&RiskResult> = results.iter().collect();
    ranked.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| a.student_id.cmp(&b.student_id))
    });

    let mut output = String::new();

    let _ = writeln!(output, "# Dropout Risk Report");
    let _ = writeln!(
        output,
        "Generated for {} ({} students evaluated)",
        generated_for,
        results.len()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Risk Distribution");
    let _ = writeln!(output, "- HIGH: {}", counts.high);
    let _ = writeln!(output, "- MEDIUM: {}", counts.medium);
    let _ = writeln!(output, "- LOW: {}", counts.low);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Highest Risk Students");

    let flagged: Vec<&&RiskResult> = ranked.iter().filter(|r| r.score > 0).collect();
    if flagged.is_empty() {
        let _ = writeln!(output, "No students with risk factors.");
    } else {
        for result in flagged.iter().take(10) {
            let _ = writeln!(
                output,
                "- {} score {} ({})",
                result.student_id, result.score, result.risk_level
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Evaluation Notes");

    if ranked.is_empty() {
        let _ = writeln!(output, "No evaluations recorded.");
    } else {
        for result in ranked.iter() {
            let _ = writeln!(output, "- {}: {}", result.student_id, result.note);
        }
    }

    output
}
