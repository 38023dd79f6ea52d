//! Score reconciliation use-case service.
//!
//! # Responsibility
//! - Create or merge per-semester score records keyed by
//!   (student, grade, semester).
//! - Keep `total`/`average` derived from the merged subjects on every write.
//! - Serve single-student and class-wide score queries, and deletes.
//! - Hand change notifications to the notifier without waiting on delivery.
//!
//! # Invariants
//! - Partial submissions overwrite only the subjects they carry.
//! - A student with no records is a not-found condition for single-student
//!   queries; an empty class query is a successful empty result.
//! - Delete detects a missing triple from the affected-row count.

use crate::model::now_epoch_ms;
use crate::model::score::{
    ScoreDraft, ScoreId, ScoreKey, ScoreOutcome, ScoreRecord, SubjectScores,
};
use crate::model::student::{Student, StudentId};
use crate::notify::Notifier;
use crate::repo::score_repo::ScoreStore;
use crate::repo::student_repo::StudentDirectory;
use crate::repo::{NotFoundTarget, RepoError};
use crate::service::aggregator::aggregate;
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

const MSG_SCORE_CREATED: &str = "score record created";
const MSG_SCORE_UPDATED: &str = "score record updated";
const MSG_SCORE_DELETED: &str = "score record deleted";
const MSG_STUDENT_SCORES: &str = "student scores retrieved";
const MSG_CLASS_SCORES: &str = "class scores retrieved";
const MSG_CLASS_EMPTY: &str = "no score records found for this class";

/// Service error for score use-cases.
#[derive(Debug)]
pub enum ScoreServiceError {
    /// Student id does not resolve in the directory.
    StudentNotFound(StudentId),
    /// Student exists but has no score records (in the queried range).
    NoScoresForStudent(StudentId),
    /// No record for the addressed triple.
    ScoreNotFound(ScoreKey),
    /// Store failure, propagated unchanged.
    Repo(RepoError),
}

impl ScoreServiceError {
    /// True for every variant of the not-found kind.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::StudentNotFound(_) | Self::NoScoresForStudent(_) | Self::ScoreNotFound(_)
        )
    }

    fn code(&self) -> &'static str {
        match self {
            Self::StudentNotFound(_) => "student_not_found",
            Self::NoScoresForStudent(_) => "scores_not_found",
            Self::ScoreNotFound(_) => "score_not_found",
            Self::Repo(_) => "repo_failed",
        }
    }
}

impl Display for ScoreServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StudentNotFound(id) => write!(f, "student not found: {id}"),
            Self::NoScoresForStudent(id) => write!(f, "no score records for student {id}"),
            Self::ScoreNotFound(key) => write!(f, "score record not found: {key}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ScoreServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ScoreServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(NotFoundTarget::Student(id)) => Self::StudentNotFound(id),
            RepoError::NotFound(NotFoundTarget::Score(key)) => Self::ScoreNotFound(key),
            other => Self::Repo(other),
        }
    }
}

/// Result of a create-or-update (or targeted update) call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreUpsertResult {
    pub outcome: ScoreOutcome,
    pub message: String,
    pub record_id: ScoreId,
    pub student_id: StudentId,
    pub grade: u32,
    pub semester: u32,
    pub subjects: SubjectScores,
    pub total: f64,
    pub average: f64,
}

/// One grade/semester entry in a student's score listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemesterScoreSummary {
    pub grade: u32,
    pub semester: u32,
    pub subjects: SubjectScores,
    pub total_score: f64,
    pub average_score: f64,
}

impl From<&ScoreRecord> for SemesterScoreSummary {
    fn from(record: &ScoreRecord) -> Self {
        Self {
            grade: record.key.grade,
            semester: record.key.semester,
            subjects: record.subjects,
            total_score: record.totals.total,
            average_score: record.totals.average,
        }
    }
}

/// Single-student score listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentScoresResult {
    pub message: String,
    pub student_id: StudentId,
    /// Display number rendered as text.
    pub student_num: String,
    pub student_name: String,
    /// Current grade of the student profile.
    pub grade: u32,
    pub scores: Vec<SemesterScoreSummary>,
}

/// One student's row in a class-wide query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassScoreEntry {
    pub student_id: StudentId,
    pub name: String,
    pub grade: u32,
    pub classroom: u32,
    pub semester: u32,
    pub subjects: SubjectScores,
    pub total_score: f64,
    pub average_score: f64,
}

/// Class-wide score listing; may be empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassScoresResult {
    pub message: String,
    pub students: Vec<ClassScoreEntry>,
}

impl ClassScoresResult {
    pub fn is_empty(&self) -> bool {
        self.students.is_empty()
    }
}

/// Result of a successful delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteScoreResult {
    pub message: String,
    pub student_id: StudentId,
    pub grade: u32,
    pub semester: u32,
}

/// Score service over a student directory, a score store and a notifier.
pub struct ScoreService<D, S, N>
where
    D: StudentDirectory,
    S: ScoreStore,
    N: Notifier,
{
    students: D,
    scores: S,
    notifier: N,
}

impl<D, S, N> ScoreService<D, S, N>
where
    D: StudentDirectory,
    S: ScoreStore,
    N: Notifier,
{
    pub fn new(students: D, scores: S, notifier: N) -> Self {
        Self {
            students,
            scores,
            notifier,
        }
    }

    /// Creates the record for `key` or merges `subjects` into the existing one.
    ///
    /// # Contract
    /// - Fails with `StudentNotFound` when the student does not resolve.
    /// - Only subjects present in `subjects` overwrite stored values.
    /// - Concurrent calls for one triple never produce two records.
    /// - Notifies the student's linked user, if any, after the write commits.
    pub fn create_or_update_score(
        &self,
        key: ScoreKey,
        subjects: &SubjectScores,
    ) -> Result<ScoreUpsertResult, ScoreServiceError> {
        let started_at = Instant::now();
        let result = self.upsert_inner(key, subjects);
        log_write("score_upsert", key, started_at, &result);
        result
    }

    /// Merges `subjects` into an existing record; never creates one.
    ///
    /// Fails with `ScoreNotFound` when the triple has no record.
    pub fn update_score(
        &self,
        key: ScoreKey,
        subjects: &SubjectScores,
    ) -> Result<ScoreUpsertResult, ScoreServiceError> {
        let started_at = Instant::now();
        let result = self.update_inner(key, subjects);
        log_write("score_update", key, started_at, &result);
        result
    }

    /// Lists every score record of one student.
    ///
    /// Fails with `StudentNotFound` for an unknown student and with
    /// `NoScoresForStudent` when the student has no records.
    pub fn get_student_scores(
        &self,
        student_id: StudentId,
    ) -> Result<StudentScoresResult, ScoreServiceError> {
        let student = self.require_student(student_id)?;
        let records = self.scores.find_all_by_student(student_id)?;
        student_scores_result(student, &records)
    }

    /// Lists one semester's score records of one student, across grades.
    pub fn get_student_scores_for_semester(
        &self,
        student_id: StudentId,
        semester: u32,
    ) -> Result<StudentScoresResult, ScoreServiceError> {
        let student = self.require_student(student_id)?;
        let records = self.scores.find_by_student_semester(student_id, semester)?;
        student_scores_result(student, &records)
    }

    /// Lists the records of every student in a classroom for one semester.
    ///
    /// Students without a record are skipped; an empty listing is not an error.
    pub fn get_class_scores(
        &self,
        grade: u32,
        semester: u32,
        classroom: u32,
    ) -> Result<ClassScoresResult, ScoreServiceError> {
        let students = self.students.find_by_grade_and_classroom(grade, classroom)?;
        let mut entries = Vec::with_capacity(students.len());
        for student in students {
            let key = ScoreKey::new(student.id, grade, semester);
            let Some(record) = self.scores.find_by_student_grade_semester(key)? else {
                continue;
            };
            entries.push(ClassScoreEntry {
                student_id: student.id,
                name: student.name,
                grade: student.grade,
                classroom: student.classroom,
                semester: record.key.semester,
                subjects: record.subjects,
                total_score: record.totals.total,
                average_score: record.totals.average,
            });
        }

        let message = if entries.is_empty() {
            MSG_CLASS_EMPTY
        } else {
            MSG_CLASS_SCORES
        };
        Ok(ClassScoresResult {
            message: message.to_string(),
            students: entries,
        })
    }

    /// Deletes the record for `key`.
    ///
    /// Fails with `ScoreNotFound` when nothing was removed.
    pub fn delete_score(&self, key: ScoreKey) -> Result<DeleteScoreResult, ScoreServiceError> {
        let started_at = Instant::now();
        let result = match self.scores.delete(key) {
            Ok(0) => Err(ScoreServiceError::ScoreNotFound(key)),
            Ok(_) => Ok(DeleteScoreResult {
                message: MSG_SCORE_DELETED.to_string(),
                student_id: key.student_id,
                grade: key.grade,
                semester: key.semester,
            }),
            Err(err) => Err(err.into()),
        };
        log_write("score_delete", key, started_at, &result);
        result
    }

    fn upsert_inner(
        &self,
        key: ScoreKey,
        subjects: &SubjectScores,
    ) -> Result<ScoreUpsertResult, ScoreServiceError> {
        let student = self.require_student(key.student_id)?;
        let now = now_epoch_ms();
        let mut outcome = ScoreOutcome::Created;
        let stored = self.scores.upsert(key, &mut |existing| {
            outcome = if existing.is_some() {
                ScoreOutcome::Updated
            } else {
                ScoreOutcome::Created
            };
            reconcile(key, existing, subjects, now)
        })?;

        self.notify_change(&student, key, outcome);
        Ok(upsert_result(outcome, &stored))
    }

    fn update_inner(
        &self,
        key: ScoreKey,
        subjects: &SubjectScores,
    ) -> Result<ScoreUpsertResult, ScoreServiceError> {
        let student = self.require_student(key.student_id)?;
        let now = now_epoch_ms();
        let stored = self
            .scores
            .update_existing(key, &mut |existing| reconcile(key, existing, subjects, now))?;

        self.notify_change(&student, key, ScoreOutcome::Updated);
        Ok(upsert_result(ScoreOutcome::Updated, &stored))
    }

    fn require_student(&self, student_id: StudentId) -> Result<Student, ScoreServiceError> {
        self.students
            .find_by_id(student_id)?
            .ok_or(ScoreServiceError::StudentNotFound(student_id))
    }

    fn notify_change(&self, student: &Student, key: ScoreKey, outcome: ScoreOutcome) {
        let Some(user_id) = student.notify_target() else {
            return;
        };
        let verb = match outcome {
            ScoreOutcome::Created => "registered",
            ScoreOutcome::Updated => "updated",
        };
        let message = format!(
            "{}'s scores for grade {} semester {} have been {verb}.",
            student.name, key.grade, key.semester
        );
        self.notifier.notify(user_id, &message);
    }
}

/// Builds the draft for `key` from the current row and a partial patch.
fn reconcile(
    key: ScoreKey,
    existing: Option<&ScoreRecord>,
    patch: &SubjectScores,
    now: i64,
) -> ScoreDraft {
    let (subjects, created_at) = match existing {
        Some(current) => {
            let mut merged = current.subjects;
            merged.merge(patch);
            (merged, current.created_at)
        }
        None => (*patch, now),
    };

    ScoreDraft {
        key,
        subjects,
        totals: aggregate(&subjects),
        created_at,
        updated_at: now,
    }
}

fn upsert_result(outcome: ScoreOutcome, record: &ScoreRecord) -> ScoreUpsertResult {
    let message = match outcome {
        ScoreOutcome::Created => MSG_SCORE_CREATED,
        ScoreOutcome::Updated => MSG_SCORE_UPDATED,
    };
    ScoreUpsertResult {
        outcome,
        message: message.to_string(),
        record_id: record.id,
        student_id: record.key.student_id,
        grade: record.key.grade,
        semester: record.key.semester,
        subjects: record.subjects,
        total: record.totals.total,
        average: record.totals.average,
    }
}

fn student_scores_result(
    student: Student,
    records: &[ScoreRecord],
) -> Result<StudentScoresResult, ScoreServiceError> {
    if records.is_empty() {
        return Err(ScoreServiceError::NoScoresForStudent(student.id));
    }

    Ok(StudentScoresResult {
        message: MSG_STUDENT_SCORES.to_string(),
        student_id: student.id,
        student_num: student.student_num.to_string(),
        student_name: student.name,
        grade: student.grade,
        scores: records.iter().map(SemesterScoreSummary::from).collect(),
    })
}

fn log_write<T>(
    event: &str,
    key: ScoreKey,
    started_at: Instant,
    result: &Result<T, ScoreServiceError>,
) {
    let duration_ms = started_at.elapsed().as_millis();
    match result {
        Ok(_) => info!(
            "event={event} module=service status=ok student_id={} grade={} semester={} duration_ms={duration_ms}",
            key.student_id, key.grade, key.semester
        ),
        Err(err) if err.is_not_found() => info!(
            "event={event} module=service status=not_found student_id={} grade={} semester={} duration_ms={duration_ms} error_code={}",
            key.student_id, key.grade, key.semester, err.code()
        ),
        Err(err) => error!(
            "event={event} module=service status=error student_id={} grade={} semester={} duration_ms={duration_ms} error_code={} error={err}",
            key.student_id, key.grade, key.semester, err.code()
        ),
    }
}
