use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::Level;

mod config;
mod db;
mod error;
mod listing;
mod loader;
mod models;
mod report;
mod risk;
mod telemetry;

use config::{ConfigUpdate, LevelMode, LevelThresholds, ScoringConfig, SystemConfig};
use error::BoundaryError;
use listing::{ListQuery, SortKey};
use models::{
    AssignmentRecord, AttendanceRecord, AttendanceStatus, ContactRecord, ContactStatus,
    RiskLevel, RiskResult, StoredEvaluation,
};
use risk::RiskEngine;

#[derive(Parser)]
#[command(name = "dropout-risk")]
#[command(about = "Student dropout risk scoring from attendance, assignments and contacts", long_about = None)]
struct Cli {
    /// Postgres connection string, required by database commands
    #[arg(long, env = "DATABASE_URL", global = true, hide_env_values = true)]
    database_url: Option<String>,

    /// Default log level when RUST_LOG is not set
    #[arg(long, default_value_t = Level::INFO, global = true)]
    log_level: Level,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone, Copy)]
struct ScoringArgs {
    /// Attendance rate below which a student is flagged (0-1)
    #[arg(long = "attendance", default_value_t = 0.75)]
    attendance_rate_threshold: f64,
    /// Submission rate below which a student is flagged (0-1)
    #[arg(long = "assignment", default_value_t = 0.50)]
    assignment_rate_threshold: f64,
    /// Failed contacts at or above which a student is flagged
    #[arg(long = "contact", default_value_t = 2)]
    failed_contact_threshold: u32,
}

impl ScoringArgs {
    fn into_config(self) -> Result<ScoringConfig, BoundaryError> {
        let config = ScoringConfig {
            attendance_rate_threshold: self.attendance_rate_threshold,
            assignment_rate_threshold: self.assignment_rate_threshold,
            failed_contact_threshold: self.failed_contact_threshold,
        };
        config.validate()?;
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Score students from a JSON file without touching the database
    Score {
        #[arg(long, short, default_value = "data/sample_students.json")]
        input: PathBuf,
        /// Also write results as CSV
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Also write a markdown report
        #[arg(long)]
        report: Option<PathBuf>,
        #[command(flatten)]
        scoring: ScoringArgs,
    },
    #[command(flatten)]
    Database(DatabaseCommands),
}

#[derive(Subcommand)]
enum DatabaseCommands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load sample students
    Seed,
    /// Import students and their records from a JSON file
    Import {
        #[arg(long)]
        json: PathBuf,
    },
    /// Register a student with no records
    AddStudent {
        #[arg(long)]
        student_id: String,
        #[arg(long)]
        name: String,
    },
    /// Append a raw record for a student
    Record {
        #[command(subcommand)]
        kind: RecordKind,
    },
    /// Evaluate one student with the stored level thresholds and persist the result
    Evaluate {
        #[arg(long)]
        student_id: String,
        #[command(flatten)]
        scoring: ScoringArgs,
    },
    /// Evaluate and persist every student
    EvaluateAll {
        #[command(flatten)]
        scoring: ScoringArgs,
    },
    /// Show engagement rates and the latest evaluation for a student
    Summary {
        #[arg(long)]
        student_id: String,
    },
    /// Show every stored evaluation for a student, newest first
    History {
        #[arg(long)]
        student_id: String,
    },
    /// List students whose latest evaluation is at the given level
    AtRisk {
        #[arg(long, default_value_t = RiskLevel::High)]
        level: RiskLevel,
    },
    /// List students with filtering, sorting and paging
    List {
        #[arg(long)]
        risk_level: Option<RiskLevel>,
        #[arg(long, value_enum, default_value_t = SortKey::StudentId)]
        sort_by: SortKey,
        #[arg(long)]
        desc: bool,
        #[arg(long, default_value_t = 1)]
        page: usize,
        /// Defaults to the configured students per page
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Export every student's latest evaluation to CSV
    Export {
        #[arg(long, short, default_value = "results.csv")]
        output: PathBuf,
    },
    /// Generate a markdown report from every student's latest evaluation
    Report {
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Show or change the stored system configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum RecordKind {
    Attendance {
        #[arg(long)]
        student_id: String,
        #[arg(long)]
        date: NaiveDate,
        /// ATTEND or ABSENT
        #[arg(long)]
        status: AttendanceStatus,
    },
    Assignment {
        #[arg(long)]
        student_id: String,
        #[arg(long)]
        date: NaiveDate,
        #[arg(long)]
        name: String,
        #[arg(long)]
        submitted: bool,
    },
    Contact {
        #[arg(long)]
        student_id: String,
        #[arg(long)]
        date: NaiveDate,
        /// SUCCESS or FAILED
        #[arg(long)]
        status: ContactStatus,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Show,
    Set {
        #[arg(long)]
        low: Option<u8>,
        #[arg(long)]
        medium: Option<u8>,
        #[arg(long)]
        high: Option<u8>,
        #[arg(long)]
        auto_refresh_interval: Option<u32>,
        #[arg(long)]
        enable_notifications: Option<bool>,
        #[arg(long)]
        max_students_per_page: Option<u32>,
    },
    Reset,
}

async fn connect(database_url: Option<&str>) -> anyhow::Result<PgPool> {
    let database_url = database_url
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")
}

fn print_results(results: &[RiskResult]) {
    println!("{:<12} {:>5}  {:<7} Note", "Student ID", "Score", "Level");
    for result in results {
        println!(
            "{:<12} {:>5}  {:<7} {}",
            result.student_id, result.score, result.risk_level, result.note
        );
    }
}

fn print_evaluation(evaluation: &StoredEvaluation) {
    println!(
        "- {} score {} ({}) at {}: {}",
        evaluation.student_id,
        evaluation.score,
        evaluation.risk_level,
        evaluation.evaluated_at.format("%Y-%m-%d %H:%M:%S"),
        evaluation.note
    );
}

fn score_file(
    input: &Path,
    output: Option<&Path>,
    report_path: Option<&Path>,
    scoring: ScoringArgs,
) -> anyhow::Result<()> {
    let engine = RiskEngine::new(scoring.into_config()?);
    let students = loader::load_snapshots(input)?;
    tracing::info!(count = students.len(), input = %input.display(), "loaded students");

    let results = engine.evaluate_batch(&students, None);
    print_results(&results);

    if let Some(output) = output {
        loader::write_results_csv(output, &results)?;
        println!("Results written to {}.", output.display());
    }
    if let Some(report_path) = report_path {
        let label = input.display().to_string();
        std::fs::write(report_path, report::build_report(&label, &results))?;
        println!("Report written to {}.", report_path.display());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing(cli.log_json, cli.log_level);

    match cli.command {
        Commands::Score {
            input,
            output,
            report,
            scoring,
        } => score_file(&input, output.as_deref(), report.as_deref(), scoring),
        Commands::Database(command) => {
            let pool = connect(cli.database_url.as_deref()).await?;
            run_database(command, &pool).await
        }
    }
}

async fn run_database(command: DatabaseCommands, pool: &PgPool) -> anyhow::Result<()> {
    match command {
        DatabaseCommands::InitDb => {
            db::init_db(pool).await?;
            println!("Schema ready.");
        }
        DatabaseCommands::Seed => {
            let created = db::seed(pool).await?;
            println!("Seeded {created} students.");
        }
        DatabaseCommands::Import { json } => {
            let students = loader::load_snapshots(&json)?;
            let created = db::import_snapshots(pool, &students).await?;
            println!(
                "Imported {created} of {} students from {}.",
                students.len(),
                json.display()
            );
        }
        DatabaseCommands::AddStudent { student_id, name } => {
            db::create_student(pool, &student_id, &name).await?;
            println!("Student {student_id} created.");
        }
        DatabaseCommands::Record { kind } => match kind {
            RecordKind::Attendance {
                student_id,
                date,
                status,
            } => {
                db::add_attendance(pool, &student_id, &[AttendanceRecord { date, status }])
                    .await?;
                println!("Attendance recorded for {student_id}.");
            }
            RecordKind::Assignment {
                student_id,
                date,
                name,
                submitted,
            } => {
                let record = AssignmentRecord {
                    date,
                    name,
                    submitted,
                };
                db::add_assignments(pool, &student_id, &[record]).await?;
                println!("Assignment recorded for {student_id}.");
            }
            RecordKind::Contact {
                student_id,
                date,
                status,
            } => {
                db::add_contacts(pool, &student_id, &[ContactRecord { date, status }]).await?;
                println!("Contact recorded for {student_id}.");
            }
        },
        DatabaseCommands::Evaluate {
            student_id,
            scoring,
        } => {
            let engine = RiskEngine::new(scoring.into_config()?);
            let snapshot = db::fetch_snapshot(pool, &student_id)
                .await?
                .ok_or_else(|| BoundaryError::StudentNotFound(student_id.clone()))?;
            let system = db::load_system_config(pool).await?;
            let levels = LevelMode::Explicit(system.risk_thresholds);

            let result = engine.evaluate(&snapshot, None, &levels);
            let stored = db::store_evaluation(pool, &result).await?;
            print_evaluation(&stored);
        }
        DatabaseCommands::EvaluateAll { scoring } => {
            let engine = RiskEngine::new(scoring.into_config()?);
            let system = db::load_system_config(pool).await?;
            let levels = LevelMode::Explicit(system.risk_thresholds);

            let mut results = Vec::new();
            for student in db::fetch_students(pool).await? {
                let Some(snapshot) = db::fetch_snapshot(pool, &student.student_id).await? else {
                    tracing::warn!(student_id = %student.student_id, "student vanished during evaluation");
                    continue;
                };
                let result = engine.evaluate(&snapshot, None, &levels);
                db::store_evaluation(pool, &result).await?;
                results.push(result);
            }

            if results.is_empty() {
                println!("No students to evaluate.");
            } else {
                print_results(&results);
            }
        }
        DatabaseCommands::Summary { student_id } => {
            let snapshot = db::fetch_snapshot(pool, &student_id)
                .await?
                .ok_or_else(|| BoundaryError::StudentNotFound(student_id.clone()))?;
            let latest = db::latest_evaluation(pool, &student_id).await?;
            let summary = risk::summarize(&snapshot, latest);
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        DatabaseCommands::History { student_id } => {
            let history = db::evaluation_history(pool, &student_id).await?;
            if history.is_empty() {
                println!("No evaluations recorded for {student_id}.");
            }
            for evaluation in &history {
                print_evaluation(evaluation);
            }
        }
        DatabaseCommands::AtRisk { level } => {
            let evaluations = db::latest_evaluations_by_level(pool, level).await?;
            if evaluations.is_empty() {
                println!("No students currently at {level}.");
            }
            for evaluation in &evaluations {
                print_evaluation(evaluation);
            }
        }
        DatabaseCommands::List {
            risk_level,
            sort_by,
            desc,
            page,
            limit,
        } => {
            let limit = match limit {
                Some(limit) => limit,
                None => db::load_system_config(pool).await?.max_students_per_page as usize,
            };
            let query = ListQuery {
                risk_level,
                sort_by,
                descending: desc,
                page,
                limit,
            };
            let roster = db::fetch_roster(pool).await?;
            for (student, latest) in listing::list_students(roster, &query) {
                let level = latest
                    .as_ref()
                    .map(|evaluation| evaluation.risk_level.as_str())
                    .unwrap_or("N/A");
                println!(
                    "{:<12} {:<30} {:<7} added {}",
                    student.student_id,
                    student.student_name,
                    level,
                    student.created_at.format("%Y-%m-%d")
                );
            }
        }
        DatabaseCommands::Export { output } => {
            let roster = db::fetch_roster(pool).await?;
            loader::write_export_csv(&output, &roster)?;
            let evaluated = roster.iter().filter(|(_, latest)| latest.is_some()).count();
            println!("Students: {}", roster.len());
            println!("Evaluated: {evaluated}");
            println!("Not evaluated: {}", roster.len() - evaluated);
            println!("Results written to {}.", output.display());
        }
        DatabaseCommands::Report { out } => {
            let results: Vec<RiskResult> = db::fetch_roster(pool)
                .await?
                .into_iter()
                .filter_map(|(_, latest)| latest)
                .map(|evaluation| RiskResult {
                    student_id: evaluation.student_id,
                    score: evaluation.score,
                    risk_level: evaluation.risk_level,
                    note: evaluation.note,
                })
                .collect();
            std::fs::write(&out, report::build_report("all students", &results))?;
            println!("Report written to {}.", out.display());
        }
        DatabaseCommands::Config { action } => match action {
            ConfigAction::Show => {
                let system = db::load_system_config(pool).await?;
                println!("{}", serde_json::to_string_pretty(&system)?);
            }
            ConfigAction::Set {
                low,
                medium,
                high,
                auto_refresh_interval,
                enable_notifications,
                max_students_per_page,
            } => {
                let current = db::load_system_config(pool).await?;
                let risk_thresholds = if low.is_some() || medium.is_some() || high.is_some() {
                    Some(LevelThresholds {
                        low_threshold: low.unwrap_or(current.risk_thresholds.low_threshold),
                        medium_threshold: medium
                            .unwrap_or(current.risk_thresholds.medium_threshold),
                        high_threshold: high.unwrap_or(current.risk_thresholds.high_threshold),
                    })
                } else {
                    None
                };
                let update = ConfigUpdate {
                    risk_thresholds,
                    auto_refresh_interval,
                    enable_notifications,
                    max_students_per_page,
                };
                let next = current.apply(&update)?;
                db::save_system_config(pool, &next).await?;
                tracing::info!(?next, "system config updated");
                println!("{}", serde_json::to_string_pretty(&next)?);
            }
            ConfigAction::Reset => {
                db::save_system_config(pool, &SystemConfig::default()).await?;
                println!("Configuration reset to defaults.");
            }
        },
    }

    Ok(())
}
