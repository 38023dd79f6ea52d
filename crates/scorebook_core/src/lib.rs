//! Core domain logic for the score book.
//! This crate is the single source of truth for score invariants: one record
//! per (student, grade, semester), totals always derived from subjects.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod notify;
pub mod repo;
pub mod service;

pub use config::{ConfigError, CoreConfig};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::score::{
    ScoreDraft, ScoreId, ScoreKey, ScoreOutcome, ScoreRecord, ScoreTotals, ScoreValidationError,
    SubjectScores, SUBJECT_COUNT,
};
pub use model::student::{NewStudent, Student, StudentId};
pub use notify::{
    DeliveryError, LogNotificationSink, Notification, NotificationDispatcher, NotificationSink,
    Notifier,
};
pub use repo::score_repo::{ScoreStore, SqliteScoreRepository};
pub use repo::student_repo::{SqliteStudentRepository, StudentDirectory};
pub use repo::{NotFoundTarget, RepoError, RepoResult};
pub use service::aggregator::aggregate;
pub use service::score_service::{
    ClassScoreEntry, ClassScoresResult, DeleteScoreResult, ScoreService, ScoreServiceError,
    ScoreUpsertResult, SemesterScoreSummary, StudentScoresResult,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
