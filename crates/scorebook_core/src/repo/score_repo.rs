//! Score store contract and SQLite implementation.
//!
//! # Responsibility
//! - Persist one score record per (student, grade, semester) triple.
//! - Run read-reconcile-write cycles atomically per triple.
//!
//! # Invariants
//! - `scores` carries `UNIQUE(student_id, grade, semester)`; writes go
//!   through `INSERT .. ON CONFLICT DO UPDATE`, never check-then-insert.
//! - Reconcile cycles hold the SQLite write lock (`BEGIN IMMEDIATE`) from the
//!   read of the current row until commit, so a concurrent writer on another
//!   connection waits and then observes the committed row.
//! - Stored `total_score`/`average_score` always equal `aggregate(subjects)`
//!   and are finite; drafts carrying anything else are rejected.
//! - Delete reports affected rows; callers decide what zero means.

use crate::model::score::{
    ScoreDraft, ScoreKey, ScoreRecord, ScoreTotals, SubjectScores, SUBJECT_COUNT,
};
use crate::model::student::StudentId;
use crate::repo::{ensure_table_columns, NotFoundTarget, RepoError, RepoResult};
use crate::service::aggregator::aggregate;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};

const SUBJECT_COLUMNS: [&str; SUBJECT_COUNT] = [
    "subject1", "subject2", "subject3", "subject4", "subject5", "subject6", "subject7",
    "subject8",
];

const SCORE_SELECT_SQL: &str = "SELECT
    id,
    student_id,
    grade,
    semester,
    subject1,
    subject2,
    subject3,
    subject4,
    subject5,
    subject6,
    subject7,
    subject8,
    total_score,
    average_score,
    created_at,
    updated_at
FROM scores";

/// Callback deciding the next state of a triple from its current row.
pub type Reconcile<'a> = dyn FnMut(Option<&ScoreRecord>) -> ScoreDraft + 'a;

/// Persistent keyed table of score records.
pub trait ScoreStore {
    fn find_by_student_grade_semester(&self, key: ScoreKey) -> RepoResult<Option<ScoreRecord>>;

    fn find_all_by_student(&self, student_id: StudentId) -> RepoResult<Vec<ScoreRecord>>;

    /// Records of one student in one semester, across grades.
    fn find_by_student_semester(
        &self,
        student_id: StudentId,
        semester: u32,
    ) -> RepoResult<Vec<ScoreRecord>> {
        Ok(self
            .find_all_by_student(student_id)?
            .into_iter()
            .filter(|record| record.key.semester == semester)
            .collect())
    }

    /// Atomically inserts or replaces the record at `key`.
    ///
    /// `reconcile` receives the current row (if any) while the triple is
    /// locked and returns the draft to persist. Returns the stored record.
    fn upsert(&self, key: ScoreKey, reconcile: &mut Reconcile<'_>) -> RepoResult<ScoreRecord>;

    /// Like `upsert`, but only for an existing row; `NotFound` otherwise.
    fn update_existing(
        &self,
        key: ScoreKey,
        reconcile: &mut Reconcile<'_>,
    ) -> RepoResult<ScoreRecord>;

    /// Deletes the record at `key` and returns how many rows were removed.
    fn delete(&self, key: ScoreKey) -> RepoResult<usize>;
}

impl<T: ScoreStore + ?Sized> ScoreStore for &T {
    fn find_by_student_grade_semester(&self, key: ScoreKey) -> RepoResult<Option<ScoreRecord>> {
        (**self).find_by_student_grade_semester(key)
    }

    fn find_all_by_student(&self, student_id: StudentId) -> RepoResult<Vec<ScoreRecord>> {
        (**self).find_all_by_student(student_id)
    }

    fn find_by_student_semester(
        &self,
        student_id: StudentId,
        semester: u32,
    ) -> RepoResult<Vec<ScoreRecord>> {
        (**self).find_by_student_semester(student_id, semester)
    }

    fn upsert(&self, key: ScoreKey, reconcile: &mut Reconcile<'_>) -> RepoResult<ScoreRecord> {
        (**self).upsert(key, reconcile)
    }

    fn update_existing(
        &self,
        key: ScoreKey,
        reconcile: &mut Reconcile<'_>,
    ) -> RepoResult<ScoreRecord> {
        (**self).update_existing(key, reconcile)
    }

    fn delete(&self, key: ScoreKey) -> RepoResult<usize> {
        (**self).delete(key)
    }
}

/// SQLite-backed score store.
pub struct SqliteScoreRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteScoreRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        let mut columns = vec![
            "id",
            "student_id",
            "grade",
            "semester",
            "total_score",
            "average_score",
            "created_at",
            "updated_at",
        ];
        columns.extend(SUBJECT_COLUMNS);
        ensure_table_columns(conn, "scores", &columns)?;
        Ok(Self { conn })
    }

    fn begin_write(&self) -> RepoResult<Transaction<'conn>> {
        Ok(Transaction::new_unchecked(
            self.conn,
            TransactionBehavior::Immediate,
        )?)
    }
}

impl ScoreStore for SqliteScoreRepository<'_> {
    fn find_by_student_grade_semester(&self, key: ScoreKey) -> RepoResult<Option<ScoreRecord>> {
        load_score(self.conn, key)
    }

    fn find_all_by_student(&self, student_id: StudentId) -> RepoResult<Vec<ScoreRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "{SCORE_SELECT_SQL}
             WHERE student_id = ?1
             ORDER BY grade ASC, semester ASC;"
        ))?;
        let mut rows = stmt.query([student_id])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(parse_score_row(row)?);
        }
        Ok(records)
    }

    fn find_by_student_semester(
        &self,
        student_id: StudentId,
        semester: u32,
    ) -> RepoResult<Vec<ScoreRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "{SCORE_SELECT_SQL}
             WHERE student_id = ?1
               AND semester = ?2
             ORDER BY grade ASC;"
        ))?;
        let mut rows = stmt.query(params![student_id, semester])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(parse_score_row(row)?);
        }
        Ok(records)
    }

    fn upsert(&self, key: ScoreKey, reconcile: &mut Reconcile<'_>) -> RepoResult<ScoreRecord> {
        key.validate()?;
        let tx = self.begin_write()?;
        let existing = load_score(&tx, key)?;
        let draft = reconcile(existing.as_ref());
        check_draft(key, &draft)?;

        let s = draft.subjects.slots();
        tx.execute(
            "INSERT INTO scores (
                student_id,
                grade,
                semester,
                subject1,
                subject2,
                subject3,
                subject4,
                subject5,
                subject6,
                subject7,
                subject8,
                total_score,
                average_score,
                created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            ON CONFLICT (student_id, grade, semester) DO UPDATE SET
                subject1 = excluded.subject1,
                subject2 = excluded.subject2,
                subject3 = excluded.subject3,
                subject4 = excluded.subject4,
                subject5 = excluded.subject5,
                subject6 = excluded.subject6,
                subject7 = excluded.subject7,
                subject8 = excluded.subject8,
                total_score = excluded.total_score,
                average_score = excluded.average_score,
                updated_at = excluded.updated_at;",
            params![
                key.student_id,
                key.grade,
                key.semester,
                s[0],
                s[1],
                s[2],
                s[3],
                s[4],
                s[5],
                s[6],
                s[7],
                draft.totals.total,
                draft.totals.average,
                draft.created_at,
                draft.updated_at,
            ],
        )?;

        let stored = load_score(&tx, key)?.ok_or_else(|| {
            RepoError::InvalidData(format!("score record ({key}) missing after upsert"))
        })?;
        tx.commit()?;
        Ok(stored)
    }

    fn update_existing(
        &self,
        key: ScoreKey,
        reconcile: &mut Reconcile<'_>,
    ) -> RepoResult<ScoreRecord> {
        key.validate()?;
        let tx = self.begin_write()?;
        // The current row feeds the merge; the write below still detects a
        // vanished row from its affected-row count.
        let Some(existing) = load_score(&tx, key)? else {
            return Err(RepoError::NotFound(NotFoundTarget::Score(key)));
        };
        let draft = reconcile(Some(&existing));
        check_draft(key, &draft)?;

        let s = draft.subjects.slots();
        let changed = tx.execute(
            "UPDATE scores
             SET
                subject1 = ?4,
                subject2 = ?5,
                subject3 = ?6,
                subject4 = ?7,
                subject5 = ?8,
                subject6 = ?9,
                subject7 = ?10,
                subject8 = ?11,
                total_score = ?12,
                average_score = ?13,
                updated_at = ?14
             WHERE student_id = ?1
               AND grade = ?2
               AND semester = ?3;",
            params![
                key.student_id,
                key.grade,
                key.semester,
                s[0],
                s[1],
                s[2],
                s[3],
                s[4],
                s[5],
                s[6],
                s[7],
                draft.totals.total,
                draft.totals.average,
                draft.updated_at,
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(NotFoundTarget::Score(key)));
        }

        let stored = load_score(&tx, key)?
            .ok_or(RepoError::NotFound(NotFoundTarget::Score(key)))?;
        tx.commit()?;
        Ok(stored)
    }

    fn delete(&self, key: ScoreKey) -> RepoResult<usize> {
        let removed = self.conn.execute(
            "DELETE FROM scores
             WHERE student_id = ?1
               AND grade = ?2
               AND semester = ?3;",
            params![key.student_id, key.grade, key.semester],
        )?;
        Ok(removed)
    }
}

fn check_draft(key: ScoreKey, draft: &ScoreDraft) -> RepoResult<()> {
    if draft.key != key {
        return Err(RepoError::InvalidInput(format!(
            "draft for ({}) cannot be stored at ({key})",
            draft.key
        )));
    }
    draft.validate()?;

    let expected = aggregate(&draft.subjects);
    if draft.totals != expected {
        return Err(RepoError::InvalidInput(format!(
            "draft totals ({}, {}) do not match subjects ({}, {}) at ({key})",
            draft.totals.total, draft.totals.average, expected.total, expected.average
        )));
    }
    if !draft.totals.total.is_finite() || !draft.totals.average.is_finite() {
        return Err(RepoError::InvalidInput(format!(
            "score totals overflow at ({key})"
        )));
    }
    Ok(())
}

fn load_score(conn: &Connection, key: ScoreKey) -> RepoResult<Option<ScoreRecord>> {
    let record = conn
        .query_row(
            &format!(
                "{SCORE_SELECT_SQL}
                 WHERE student_id = ?1
                   AND grade = ?2
                   AND semester = ?3;"
            ),
            params![key.student_id, key.grade, key.semester],
            |row| Ok(parse_score_row(row)),
        )
        .optional()?;
    record.transpose()
}

fn parse_score_row(row: &Row<'_>) -> RepoResult<ScoreRecord> {
    let mut slots = [None; SUBJECT_COUNT];
    for (slot, column) in slots.iter_mut().zip(SUBJECT_COLUMNS) {
        *slot = row.get::<_, Option<f64>>(column)?;
    }

    let record = ScoreRecord {
        id: row.get("id")?,
        key: ScoreKey {
            student_id: row.get("student_id")?,
            grade: row.get("grade")?,
            semester: row.get("semester")?,
        },
        subjects: SubjectScores::from_slots(slots),
        totals: ScoreTotals {
            total: row.get("total_score")?,
            average: row.get("average_score")?,
        },
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    };
    record.key.validate().map_err(|err| {
        RepoError::InvalidData(format!("score row {} has invalid key: {err}", record.id))
    })?;
    Ok(record)
}
