//! Command-line front end for the score book.
//!
//! # Responsibility
//! - Map subcommands onto `scorebook_core` use-cases.
//! - Print results as JSON; not-found outcomes exit with code 2.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use scorebook_core::config::DEFAULT_DB_FILE_NAME;
use scorebook_core::db::open_db;
use scorebook_core::{
    default_log_level, init_logging, CoreConfig, LogNotificationSink, NewStudent,
    NotificationDispatcher, RepoError, ScoreKey, ScoreService, ScoreServiceError,
    SqliteScoreRepository, SqliteStudentRepository, SubjectScores,
};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

const EXIT_NOT_FOUND: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "scorebook", version, about = "Per-semester student score records")]
struct Cli {
    /// SQLite database file.
    #[arg(long, env = "SCOREBOOK_DB", default_value = DEFAULT_DB_FILE_NAME, global = true)]
    db: PathBuf,

    /// Log level (trace|debug|info|warn|error).
    #[arg(long, env = "SCOREBOOK_LOG_LEVEL", global = true)]
    log_level: Option<String>,

    /// Absolute directory for rolling log files; logging is off without it.
    #[arg(long, env = "SCOREBOOK_LOG_DIR", global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage the student directory.
    #[command(subcommand)]
    Student(StudentCommand),
    /// Record and query scores.
    #[command(subcommand)]
    Score(ScoreCommand),
}

#[derive(Subcommand, Debug)]
enum StudentCommand {
    /// Register a student.
    Add {
        #[arg(long)]
        num: i64,
        #[arg(long)]
        name: String,
        #[arg(long)]
        grade: u32,
        #[arg(long)]
        classroom: u32,
        /// Linked user account that receives score notifications.
        #[arg(long)]
        user_id: Option<String>,
    },
    /// List all students.
    List,
    /// Remove a student and all of their score records.
    Remove {
        #[arg(long)]
        id: i64,
    },
}

#[derive(Subcommand, Debug)]
enum ScoreCommand {
    /// Create the record for a triple or merge subjects into it.
    Set {
        #[command(flatten)]
        key: KeyArgs,
        #[command(flatten)]
        subjects: SubjectArgs,
    },
    /// Merge subjects into an existing record only.
    Update {
        #[command(flatten)]
        key: KeyArgs,
        #[command(flatten)]
        subjects: SubjectArgs,
    },
    /// Show a student's records, optionally for one semester.
    Show {
        #[arg(long)]
        student: i64,
        #[arg(long)]
        semester: Option<u32>,
    },
    /// Show one semester's records for a classroom.
    Class {
        #[arg(long)]
        grade: u32,
        #[arg(long)]
        semester: u32,
        #[arg(long)]
        classroom: u32,
    },
    /// Delete the record for a triple.
    Delete {
        #[command(flatten)]
        key: KeyArgs,
    },
}

#[derive(Args, Debug)]
struct KeyArgs {
    #[arg(long)]
    student: i64,
    #[arg(long)]
    grade: u32,
    #[arg(long)]
    semester: u32,
}

impl KeyArgs {
    fn key(&self) -> ScoreKey {
        ScoreKey::new(self.student, self.grade, self.semester)
    }
}

#[derive(Args, Debug)]
struct SubjectArgs {
    /// Subject score as `N=SCORE` (N in 1..=8); repeatable.
    #[arg(long = "subject", value_name = "N=SCORE", value_parser = parse_subject)]
    subjects: Vec<(usize, f64)>,
}

impl SubjectArgs {
    fn scores(&self) -> Result<SubjectScores> {
        if self.subjects.is_empty() {
            bail!("at least one --subject N=SCORE is required");
        }
        Ok(SubjectScores::try_from_pairs(self.subjects.iter().copied())?)
    }
}

fn parse_subject(raw: &str) -> Result<(usize, f64), String> {
    let (subject, score) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected N=SCORE, got `{raw}`"))?;
    let subject = subject
        .trim()
        .parse::<usize>()
        .map_err(|err| format!("invalid subject number `{subject}`: {err}"))?;
    let score = score
        .trim()
        .parse::<f64>()
        .map_err(|err| format!("invalid score `{score}`: {err}"))?;
    Ok((subject, score))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            if is_not_found(&err) {
                ExitCode::from(EXIT_NOT_FOUND)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn is_not_found(err: &anyhow::Error) -> bool {
    if let Some(service_err) = err.downcast_ref::<ScoreServiceError>() {
        return service_err.is_not_found();
    }
    matches!(err.downcast_ref::<RepoError>(), Some(RepoError::NotFound(_)))
}

fn run(cli: Cli) -> Result<()> {
    let config = CoreConfig {
        db_path: cli.db,
        log_level: cli
            .log_level
            .unwrap_or_else(|| default_log_level().to_string()),
        log_dir: cli.log_dir,
    };
    config.validate().context("invalid configuration")?;
    if let Some(log_dir) = config.log_dir.as_ref() {
        init_logging(&config.log_level, log_dir).context("failed to initialize logging")?;
    }

    let conn = open_db(&config.db_path)
        .with_context(|| format!("failed to open `{}`", config.db_path.display()))?;
    let students = SqliteStudentRepository::try_new(&conn)?;

    let command = match cli.command {
        Command::Student(command) => return run_student(&students, command),
        Command::Score(command) => command,
    };

    let dispatcher = NotificationDispatcher::spawn(Arc::new(LogNotificationSink))
        .context("failed to start notification worker")?;
    let service = ScoreService::new(
        &students,
        SqliteScoreRepository::try_new(&conn)?,
        &dispatcher,
    );

    match command {
        ScoreCommand::Set { key, subjects } => {
            print_json(&service.create_or_update_score(key.key(), &subjects.scores()?)?)
        }
        ScoreCommand::Update { key, subjects } => {
            print_json(&service.update_score(key.key(), &subjects.scores()?)?)
        }
        ScoreCommand::Show {
            student,
            semester: Some(semester),
        } => print_json(&service.get_student_scores_for_semester(student, semester)?),
        ScoreCommand::Show {
            student,
            semester: None,
        } => print_json(&service.get_student_scores(student)?),
        ScoreCommand::Class {
            grade,
            semester,
            classroom,
        } => print_json(&service.get_class_scores(grade, semester, classroom)?),
        ScoreCommand::Delete { key } => print_json(&service.delete_score(key.key())?),
    }
}

fn run_student(students: &SqliteStudentRepository<'_>, command: StudentCommand) -> Result<()> {
    match command {
        StudentCommand::Add {
            num,
            name,
            grade,
            classroom,
            user_id,
        } => print_json(&students.create_student(&NewStudent {
            student_num: num,
            name,
            grade,
            classroom,
            user_id,
        })?),
        StudentCommand::List => print_json(&students.list_students()?),
        StudentCommand::Remove { id } => {
            students.delete_student(id)?;
            print_json(&serde_json::json!({ "message": "student removed", "student_id": id }))
        }
    }
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
