use std::cmp::Ordering;

use clap::ValueEnum;

use crate::models::{RiskLevel, StoredEvaluation, StudentRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum SortKey {
    #[default]
    StudentId,
    StudentName,
    RiskLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListQuery {
    pub risk_level: Option<RiskLevel>,
    pub sort_by: SortKey,
    pub descending: bool,
    /// 1-based.
    pub page: usize,
    pub limit: usize,
}

pub type ListedStudent = (StudentRow, Option<StoredEvaluation>);

/// Filters on each student's latest evaluation, sorts, then pages.
pub fn list_students(mut students: Vec<ListedStudent>, query: &ListQuery) -> Vec<ListedStudent> {
    if let Some(level) = query.risk_level {
        students.retain(|(_, latest)| {
            latest
                .as_ref()
                .is_some_and(|evaluation| evaluation.risk_level == level)
        });
    }

    students.sort_by(|a, b| {
        let ordering = compare(a, b, query.sort_by);
        if query.descending {
            ordering.reverse()
        } else {
            ordering
        }
    });

    let start = query.page.saturating_sub(1).saturating_mul(query.limit);
    students.into_iter().skip(start).take(query.limit).collect()
}

fn compare(a: &ListedStudent, b: &ListedStudent, key: SortKey) -> Ordering {
    match key {
        SortKey::StudentId => a.0.student_id.cmp(&b.0.student_id),
        SortKey::StudentName => a.0.student_name.cmp(&b.0.student_name),
        SortKey::RiskLevel => effective_level(a).cmp(&effective_level(b)),
    }
}

// Students never evaluated rank alongside LOW.
fn effective_level(student: &ListedStudent) -> RiskLevel {
    student
        .1
        .as_ref()
        .map(|evaluation| evaluation.risk_level)
        .unwrap_or(RiskLevel::Low)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn student(id: &str, name: &str, level: Option<RiskLevel>) -> ListedStudent {
        let row = StudentRow {
            student_id: id.to_string(),
            student_name: name.to_string(),
            created_at: Utc::now(),
        };
        let latest = level.map(|risk_level| StoredEvaluation {
            id: Uuid::new_v4(),
            student_id: id.to_string(),
            score: 0,
            risk_level,
            note: String::new(),
            evaluated_at: Utc::now(),
        });
        (row, latest)
    }

    fn ids(listed: &[ListedStudent]) -> Vec<&str> {
        listed.iter().map(|(row, _)| row.student_id.as_str()).collect()
    }

    fn roster() -> Vec<ListedStudent> {
        vec![
            student("SV003", "Chi", Some(RiskLevel::High)),
            student("SV001", "Binh", Some(RiskLevel::Low)),
            student("SV004", "An", None),
            student("SV002", "Dung", Some(RiskLevel::Medium)),
        ]
    }

    fn query() -> ListQuery {
        ListQuery {
            risk_level: None,
            sort_by: SortKey::StudentId,
            descending: false,
            page: 1,
            limit: 20,
        }
    }

    #[test]
    fn sorts_by_student_id_by_default() {
        let listed = list_students(roster(), &query());
        assert_eq!(ids(&listed), vec!["SV001", "SV002", "SV003", "SV004"]);
    }

    #[test]
    fn filters_on_latest_level() {
        let listed = list_students(
            roster(),
            &ListQuery {
                risk_level: Some(RiskLevel::High),
                ..query()
            },
        );
        assert_eq!(ids(&listed), vec!["SV003"]);
    }

    #[test]
    fn risk_level_sort_treats_unevaluated_as_low() {
        let listed = list_students(
            roster(),
            &ListQuery {
                sort_by: SortKey::RiskLevel,
                descending: true,
                ..query()
            },
        );
        assert_eq!(ids(&listed)[..2], ["SV003", "SV002"]);
        let tail: Vec<&str> = ids(&listed)[2..].to_vec();
        assert!(tail.contains(&"SV001") && tail.contains(&"SV004"));
    }

    #[test]
    fn sorts_by_name_descending() {
        let listed = list_students(
            roster(),
            &ListQuery {
                sort_by: SortKey::StudentName,
                descending: true,
                ..query()
            },
        );
        assert_eq!(ids(&listed), vec!["SV002", "SV003", "SV001", "SV004"]);
    }

    #[test]
    fn paginates_after_sorting() {
        let page_two = list_students(
            roster(),
            &ListQuery {
                page: 2,
                limit: 3,
                ..query()
            },
        );
        assert_eq!(ids(&page_two), vec!["SV004"]);

        let past_end = list_students(
            roster(),
            &ListQuery {
                page: 5,
                limit: 3,
                ..query()
            },
        );
        assert!(past_end.is_empty());
    }
}
