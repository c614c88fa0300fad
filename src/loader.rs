use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{RiskResult, StoredEvaluation, StudentRow, StudentSnapshot};

pub const NOT_EVALUATED_NOTE: &str = "Not yet evaluated";

pub fn load_snapshots(path: &Path) -> anyhow::Result<Vec<StudentSnapshot>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read student file {}", path.display()))?;
    let students: Vec<StudentSnapshot> = serde_json::from_str(&raw)
        .with_context(|| format!("invalid student JSON in {}", path.display()))?;
    Ok(students)
}

#[derive(Serialize)]
struct ResultRow<'a> {
    #[serde(rename = "Student ID")]
    student_id: &'a str,
    #[serde(rename = "Score")]
    score: u8,
    #[serde(rename = "Risk Level")]
    risk_level: &'static str,
    #[serde(rename = "Note")]
    note: &'a str,
}

pub fn write_results_csv(path: &Path, results: &[RiskResult]) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    for result in results {
        writer.serialize(ResultRow {
            student_id: &result.student_id,
            score: result.score,
            risk_level: result.risk_level.as_str(),
            note: &result.note,
        })?;
    }
    writer.flush()?;
    Ok(())
}

#[derive(Serialize)]
struct ExportRow<'a> {
    #[serde(rename = "Student ID")]
    student_id: &'a str,
    #[serde(rename = "Student Name")]
    student_name: &'a str,
    #[serde(rename = "Score")]
    score: String,
    #[serde(rename = "Risk Level")]
    risk_level: &'a str,
    #[serde(rename = "Note")]
    note: &'a str,
    #[serde(rename = "Evaluated At")]
    evaluated_at: String,
}

/// Writes one row per student; unevaluated students are marked `N/A`.
pub fn write_export_csv(
    path: &Path,
    rows: &[(StudentRow, Option<StoredEvaluation>)],
) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    for (student, latest) in rows {
        let row = match latest {
            Some(evaluation) => ExportRow {
                student_id: &student.student_id,
                student_name: &student.student_name,
                score: evaluation.score.to_string(),
                risk_level: evaluation.risk_level.as_str(),
                note: &evaluation.note,
                evaluated_at: format_timestamp(evaluation.evaluated_at),
            },
            None => ExportRow {
                student_id: &student.student_id,
                student_name: &student.student_name,
                score: "N/A".to_string(),
                risk_level: "N/A",
                note: NOT_EVALUATED_NOTE,
                evaluated_at: "N/A".to_string(),
            },
        };
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RiskLevel;
    use chrono::TimeZone;
    use uuid::Uuid;

    #[test]
    fn loads_students_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("students.json");
        std::fs::write(
            &path,
            r#"[
                {
                    "student_id": "SV001",
                    "student_name": "Linh Tran",
                    "attendance": [
                        {"date": "2024-09-02", "status": "ATTEND"},
                        {"date": "2024-09-03", "status": "ABSENT"}
                    ],
                    "assignments": [
                        {"date": "2024-09-05", "name": "Essay 1", "submitted": true}
                    ],
                    "contacts": []
                }
            ]"#,
        )
        .unwrap();

        let students = load_snapshots(&path).unwrap();
        assert_eq!(students.len(), 1);
        assert_eq!(students[0].attendance.len(), 2);
        assert_eq!(students[0].assignments[0].name, "Essay 1");
    }

    #[test]
    fn missing_and_malformed_files_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_snapshots(&dir.path().join("absent.json")).is_err());

        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = load_snapshots(&path).unwrap_err();
        assert!(err.to_string().contains("invalid student JSON"));
    }

    #[test]
    fn results_csv_has_expected_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        let results = vec![RiskResult {
            student_id: "SV001".to_string(),
            score: 2,
            risk_level: RiskLevel::Medium,
            note: "attendance, assignment risk factors".to_string(),
        }];

        write_results_csv(&path, &results).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        let mut lines = written.lines();
        assert_eq!(lines.next(), Some("Student ID,Score,Risk Level,Note"));
        assert_eq!(
            lines.next(),
            Some("SV001,2,MEDIUM,\"attendance, assignment risk factors\"")
        );
    }

    #[test]
    fn export_marks_unevaluated_students() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.csv");
        let created_at = Utc.with_ymd_and_hms(2024, 9, 1, 8, 0, 0).unwrap();
        let rows = vec![
            (
                StudentRow {
                    student_id: "SV001".to_string(),
                    student_name: "Linh Tran".to_string(),
                    created_at,
                },
                Some(StoredEvaluation {
                    id: Uuid::new_v4(),
                    student_id: "SV001".to_string(),
                    score: 3,
                    risk_level: RiskLevel::High,
                    note: "attendance, assignment, communication risk factors".to_string(),
                    evaluated_at: Utc.with_ymd_and_hms(2024, 10, 1, 9, 30, 0).unwrap(),
                }),
            ),
            (
                StudentRow {
                    student_id: "SV002".to_string(),
                    student_name: "Bao Pham".to_string(),
                    created_at,
                },
                None,
            ),
        ];

        write_export_csv(&path, &rows).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(
            lines[0],
            "Student ID,Student Name,Score,Risk Level,Note,Evaluated At"
        );
        assert!(lines[1].starts_with("SV001,Linh Tran,3,HIGH,"));
        assert!(lines[1].ends_with("2024-10-01 09:30:00"));
        assert_eq!(lines[2], "SV002,Bao Pham,N/A,N/A,Not yet evaluated,N/A");
    }
}
