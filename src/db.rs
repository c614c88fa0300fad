use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

use crate::config::SystemConfig;
use crate::error::BoundaryError;
use crate::models::{
    AssignmentRecord, AttendanceRecord, AttendanceStatus, ContactRecord, ContactStatus,
    RiskLevel, RiskResult, StoredEvaluation, StudentRow, StudentSnapshot,
};

const SYSTEM_CONFIG_KEY: &str = "system_config";

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn date(year: i32, month: u32, day: u32) -> anyhow::Result<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day).context("invalid date")
}

/// Inserts three sample students; students already present are left untouched.
pub async fn seed(pool: &PgPool) -> anyhow::Result<usize> {
    use AttendanceStatus::{Absent, Attend};
    use ContactStatus::{Failed, Success};

    let attendance = |statuses: [AttendanceStatus; 4]| -> anyhow::Result<Vec<AttendanceRecord>> {
        statuses
            .into_iter()
            .enumerate()
            .map(|(i, status)| -> anyhow::Result<AttendanceRecord> {
                Ok(AttendanceRecord {
                    date: date(2024, 9, 2 + 7 * i as u32)?,
                    status,
                })
            })
            .collect()
    };
    let assignments = |submitted: [bool; 4]| -> anyhow::Result<Vec<AssignmentRecord>> {
        submitted
            .into_iter()
            .enumerate()
            .map(|(i, submitted)| -> anyhow::Result<AssignmentRecord> {
                Ok(AssignmentRecord {
                    date: date(2024, 9, 6 + 7 * i as u32)?,
                    name: format!("Problem set {}", i + 1),
                    submitted,
                })
            })
            .collect()
    };
    let contacts = |statuses: &[ContactStatus]| -> anyhow::Result<Vec<ContactRecord>> {
        statuses
            .iter()
            .enumerate()
            .map(|(i, status)| -> anyhow::Result<ContactRecord> {
                Ok(ContactRecord {
                    date: date(2024, 10, 1 + 3 * i as u32)?,
                    status: *status,
                })
            })
            .collect()
    };

    let students = vec![
        StudentSnapshot {
            student_id: "SV001".to_string(),
            student_name: "Nguyen Van An".to_string(),
            attendance: attendance([Attend, Absent, Attend, Absent])?,
            assignments: assignments([true, false, false, false])?,
            contacts: contacts(&[Success])?,
        },
        StudentSnapshot {
            student_id: "SV002".to_string(),
            student_name: "Tran Thi Binh".to_string(),
            attendance: attendance([Attend, Attend, Attend, Attend])?,
            assignments: assignments([true, true, true, true])?,
            contacts: contacts(&[])?,
        },
        StudentSnapshot {
            student_id: "SV003".to_string(),
            student_name: "Le Van Cuong".to_string(),
            attendance: attendance([Absent, Absent, Attend, Absent])?,
            assignments: assignments([false, false, true, false])?,
            contacts: contacts(&[Failed, Failed, Success])?,
        },
    ];

    import_snapshots(pool, &students).await
}

/// Creates each snapshot's student and records; existing students are skipped.
pub async fn import_snapshots(
    pool: &PgPool,
    students: &[StudentSnapshot],
) -> anyhow::Result<usize> {
    let mut created = 0usize;

    for student in students {
        let mut tx = pool.begin().await?;
        if student_exists(&mut tx, &student.student_id).await? {
            tracing::warn!(student_id = %student.student_id, "student already exists, skipping");
            continue;
        }

        insert_student(&mut tx, &student.student_id, &student.student_name).await?;
        insert_attendance(&mut tx, &student.student_id, &student.attendance).await?;
        insert_assignments(&mut tx, &student.student_id, &student.assignments).await?;
        insert_contacts(&mut tx, &student.student_id, &student.contacts).await?;
        tx.commit().await?;

        tracing::info!(
            student_id = %student.student_id,
            attendance = student.attendance.len(),
            assignments = student.assignments.len(),
            contacts = student.contacts.len(),
            "imported student"
        );
        created += 1;
    }

    Ok(created)
}

pub async fn create_student(
    pool: &PgPool,
    student_id: &str,
    student_name: &str,
) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;
    if student_exists(&mut tx, student_id).await? {
        return Err(BoundaryError::StudentExists(student_id.to_string()).into());
    }
    insert_student(&mut tx, student_id, student_name).await?;
    tx.commit().await?;
    Ok(())
}

pub async fn add_attendance(
    pool: &PgPool,
    student_id: &str,
    records: &[AttendanceRecord],
) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;
    ensure_student(&mut tx, student_id).await?;
    insert_attendance(&mut tx, student_id, records).await?;
    tx.commit().await?;
    Ok(())
}

pub async fn add_assignments(
    pool: &PgPool,
    student_id: &str,
    records: &[AssignmentRecord],
) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;
    ensure_student(&mut tx, student_id).await?;
    insert_assignments(&mut tx, student_id, records).await?;
    tx.commit().await?;
    Ok(())
}

pub async fn add_contacts(
    pool: &PgPool,
    student_id: &str,
    records: &[ContactRecord],
) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;
    ensure_student(&mut tx, student_id).await?;
    insert_contacts(&mut tx, student_id, records).await?;
    tx.commit().await?;
    Ok(())
}

async fn student_exists(conn: &mut PgConnection, student_id: &str) -> anyhow::Result<bool> {
    let found = sqlx::query("SELECT 1 FROM dropout_risk.students WHERE student_id = $1")
        .bind(student_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(found.is_some())
}

async fn ensure_student(conn: &mut PgConnection, student_id: &str) -> anyhow::Result<()> {
    if !student_exists(conn, student_id).await? {
        return Err(BoundaryError::StudentNotFound(student_id.to_string()).into());
    }
    Ok(())
}

async fn insert_student(
    conn: &mut PgConnection,
    student_id: &str,
    student_name: &str,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO dropout_risk.students (student_id, student_name)
        VALUES ($1, $2)
        "#,
    )
    .bind(student_id)
    .bind(student_name)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert_attendance(
    conn: &mut PgConnection,
    student_id: &str,
    records: &[AttendanceRecord],
) -> anyhow::Result<()> {
    for record in records {
        sqlx::query(
            r#"
            INSERT INTO dropout_risk.attendance (id, student_id, occurred_on, status)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(student_id)
        .bind(record.date)
        .bind(record.status.as_str())
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn insert_assignments(
    conn: &mut PgConnection,
    student_id: &str,
    records: &[AssignmentRecord],
) -> anyhow::Result<()> {
    for record in records {
        sqlx::query(
            r#"
            INSERT INTO dropout_risk.assignments (id, student_id, due_on, name, submitted)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(student_id)
        .bind(record.date)
        .bind(&record.name)
        .bind(record.submitted)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn insert_contacts(
    conn: &mut PgConnection,
    student_id: &str,
    records: &[ContactRecord],
) -> anyhow::Result<()> {
    for record in records {
        sqlx::query(
            r#"
            INSERT INTO dropout_risk.contacts (id, student_id, occurred_on, status)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(student_id)
        .bind(record.date)
        .bind(record.status.as_str())
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

pub async fn fetch_students(pool: &PgPool) -> anyhow::Result<Vec<StudentRow>> {
    let rows = sqlx::query(
        "SELECT student_id, student_name, created_at FROM dropout_risk.students ORDER BY student_id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| StudentRow {
            student_id: row.get("student_id"),
            student_name: row.get("student_name"),
            created_at: row.get("created_at"),
        })
        .collect())
}

/// Loads every record held for a student, or `None` if the student is unknown.
pub async fn fetch_snapshot(
    pool: &PgPool,
    student_id: &str,
) -> anyhow::Result<Option<StudentSnapshot>> {
    let student = sqlx::query(
        "SELECT student_id, student_name FROM dropout_risk.students WHERE student_id = $1",
    )
    .bind(student_id)
    .fetch_optional(pool)
    .await?;

    let Some(student) = student else {
        return Ok(None);
    };

    let attendance = sqlx::query(
        "SELECT occurred_on, status FROM dropout_risk.attendance WHERE student_id = $1",
    )
    .bind(student_id)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|row| -> anyhow::Result<AttendanceRecord> {
        Ok(AttendanceRecord {
            date: row.get("occurred_on"),
            status: row.get::<String, _>("status").parse()?,
        })
    })
    .collect::<anyhow::Result<Vec<_>>>()?;

    let assignments = sqlx::query(
        "SELECT due_on, name, submitted FROM dropout_risk.assignments WHERE student_id = $1",
    )
    .bind(student_id)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|row| AssignmentRecord {
        date: row.get("due_on"),
        name: row.get("name"),
        submitted: row.get("submitted"),
    })
    .collect();

    let contacts = sqlx::query(
        "SELECT occurred_on, status FROM dropout_risk.contacts WHERE student_id = $1",
    )
    .bind(student_id)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|row| -> anyhow::Result<ContactRecord> {
        Ok(ContactRecord {
            date: row.get("occurred_on"),
            status: row.get::<String, _>("status").parse()?,
        })
    })
    .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(Some(StudentSnapshot {
        student_id: student.get("student_id"),
        student_name: student.get("student_name"),
        attendance,
        assignments,
        contacts,
    }))
}

pub async fn store_evaluation(
    pool: &PgPool,
    result: &RiskResult,
) -> anyhow::Result<StoredEvaluation> {
    let stored = StoredEvaluation {
        id: Uuid::new_v4(),
        student_id: result.student_id.clone(),
        score: result.score,
        risk_level: result.risk_level,
        note: result.note.clone(),
        evaluated_at: Utc::now(),
    };

    sqlx::query(
        r#"
        INSERT INTO dropout_risk.risk_evaluations
        (id, student_id, score, risk_level, note, evaluated_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(stored.id)
    .bind(&stored.student_id)
    .bind(i16::from(stored.score))
    .bind(stored.risk_level.as_str())
    .bind(&stored.note)
    .bind(stored.evaluated_at)
    .execute(pool)
    .await
    .with_context(|| format!("failed to store evaluation for {}", stored.student_id))?;

    Ok(stored)
}

fn evaluation_from_row(row: &PgRow) -> anyhow::Result<StoredEvaluation> {
    let score: i16 = row.get("score");
    let risk_level: String = row.get("risk_level");
    Ok(StoredEvaluation {
        id: row.get("id"),
        student_id: row.get("student_id"),
        score: u8::try_from(score).context("stored score out of range")?,
        risk_level: risk_level.parse::<RiskLevel>()?,
        note: row.get("note"),
        evaluated_at: row.get::<DateTime<Utc>, _>("evaluated_at"),
    })
}

pub async fn latest_evaluation(
    pool: &PgPool,
    student_id: &str,
) -> anyhow::Result<Option<StoredEvaluation>> {
    let row = sqlx::query(
        r#"
        SELECT id, student_id, score, risk_level, note, evaluated_at
        FROM dropout_risk.risk_evaluations
        WHERE student_id = $1
        ORDER BY evaluated_at DESC
        LIMIT 1
        "#,
    )
    .bind(student_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(evaluation_from_row).transpose()
}

/// Every stored evaluation for a student, newest first.
pub async fn evaluation_history(
    pool: &PgPool,
    student_id: &str,
) -> anyhow::Result<Vec<StoredEvaluation>> {
    sqlx::query(
        r#"
        SELECT id, student_id, score, risk_level, note, evaluated_at
        FROM dropout_risk.risk_evaluations
        WHERE student_id = $1
        ORDER BY evaluated_at DESC
        "#,
    )
    .bind(student_id)
    .fetch_all(pool)
    .await?
    .iter()
    .map(evaluation_from_row)
    .collect()
}

/// Students whose most recent evaluation is at `level`.
pub async fn latest_evaluations_by_level(
    pool: &PgPool,
    level: RiskLevel,
) -> anyhow::Result<Vec<StoredEvaluation>> {
    sqlx::query(
        r#"
        SELECT id, student_id, score, risk_level, note, evaluated_at
        FROM (
            SELECT DISTINCT ON (student_id)
                id, student_id, score, risk_level, note, evaluated_at
            FROM dropout_risk.risk_evaluations
            ORDER BY student_id, evaluated_at DESC
        ) latest
        WHERE risk_level = $1
        ORDER BY evaluated_at DESC
        "#,
    )
    .bind(level.as_str())
    .fetch_all(pool)
    .await?
    .iter()
    .map(evaluation_from_row)
    .collect()
}

/// Every student paired with their latest evaluation, if any.
pub async fn fetch_roster(
    pool: &PgPool,
) -> anyhow::Result<Vec<(StudentRow, Option<StoredEvaluation>)>> {
    let rows = sqlx::query(
        r#"
        SELECT s.student_id, s.student_name, s.created_at,
               e.id, e.score, e.risk_level, e.note, e.evaluated_at
        FROM dropout_risk.students s
        LEFT JOIN LATERAL (
            SELECT id, score, risk_level, note, evaluated_at
            FROM dropout_risk.risk_evaluations r
            WHERE r.student_id = s.student_id
            ORDER BY evaluated_at DESC
            LIMIT 1
        ) e ON TRUE
        ORDER BY s.student_id
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut roster = Vec::with_capacity(rows.len());
    for row in rows {
        let student = StudentRow {
            student_id: row.get("student_id"),
            student_name: row.get("student_name"),
            created_at: row.get("created_at"),
        };
        let latest = match row.get::<Option<Uuid>, _>("id") {
            Some(_) => Some(evaluation_from_row(&row)?),
            None => None,
        };
        roster.push((student, latest));
    }

    Ok(roster)
}

/// Returns the stored system config, writing the defaults first if none exist.
pub async fn load_system_config(pool: &PgPool) -> anyhow::Result<SystemConfig> {
    let row = sqlx::query("SELECT config_value FROM dropout_risk.system_config WHERE config_key = $1")
        .bind(SYSTEM_CONFIG_KEY)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(row) => {
            let raw: String = row.get("config_value");
            let config: SystemConfig = serde_json::from_str(&raw)
                .map_err(BoundaryError::from)
                .context("stored system config is not valid JSON")?;
            Ok(config)
        }
        None => {
            let config = SystemConfig::default();
            save_system_config(pool, &config).await?;
            tracing::info!("wrote default system config");
            Ok(config)
        }
    }
}

pub async fn save_system_config(pool: &PgPool, config: &SystemConfig) -> anyhow::Result<()> {
    config.validate()?;
    let raw = serde_json::to_string(config).map_err(BoundaryError::from)?;

    sqlx::query(
        r#"
        INSERT INTO dropout_risk.system_config (config_key, config_value, updated_at)
        VALUES ($1, $2, now())
        ON CONFLICT (config_key) DO UPDATE
        SET config_value = EXCLUDED.config_value, updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(SYSTEM_CONFIG_KEY)
    .bind(raw)
    .execute(pool)
    .await?;

    Ok(())
}
