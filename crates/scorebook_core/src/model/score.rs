//! Score record model.
//!
//! # Responsibility
//! - Define the composite identity of a score record (`ScoreKey`).
//! - Model the eight subject slots as a fixed array of optional values.
//! - Provide partial-merge and persistence validation helpers.
//!
//! # Invariants
//! - Subject numbers are 1-based (`subject1`..`subject8`) at every API
//!   boundary; the array index is an internal detail.
//! - `totals` on a draft or record is derived from `subjects` and is never
//!   edited on its own.

use crate::model::student::StudentId;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Number of subject slots carried by every score record.
pub const SUBJECT_COUNT: usize = 8;

/// Storage identity of a persisted score row.
pub type ScoreId = i64;

/// Reasons a score record cannot be persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum ScoreValidationError {
    /// Subject number outside `1..=SUBJECT_COUNT`.
    SubjectOutOfRange(usize),
    /// NaN or infinite subject value.
    NonFiniteScore { subject: usize, value: f64 },
    ZeroGrade,
    ZeroSemester,
}

impl Display for ScoreValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SubjectOutOfRange(subject) => write!(
                f,
                "subject number {subject} is out of range 1..={SUBJECT_COUNT}"
            ),
            Self::NonFiniteScore { subject, value } => {
                write!(f, "subject{subject} has non-finite score {value}")
            }
            Self::ZeroGrade => write!(f, "grade must be greater than zero"),
            Self::ZeroSemester => write!(f, "semester must be greater than zero"),
        }
    }
}

impl Error for ScoreValidationError {}

/// Composite identity: at most one record exists per triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScoreKey {
    pub student_id: StudentId,
    pub grade: u32,
    pub semester: u32,
}

impl ScoreKey {
    pub fn new(student_id: StudentId, grade: u32, semester: u32) -> Self {
        Self {
            student_id,
            grade,
            semester,
        }
    }

    pub fn validate(&self) -> Result<(), ScoreValidationError> {
        if self.grade == 0 {
            return Err(ScoreValidationError::ZeroGrade);
        }
        if self.semester == 0 {
            return Err(ScoreValidationError::ZeroSemester);
        }
        Ok(())
    }
}

impl Display for ScoreKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "student={} grade={} semester={}",
            self.student_id, self.grade, self.semester
        )
    }
}

/// Eight independent optional subject scores.
///
/// Serialized with named slots (`subject1`..`subject8`) so callers never
/// depend on array positions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "NamedSubjects", into = "NamedSubjects")]
pub struct SubjectScores([Option<f64>; SUBJECT_COUNT]);

impl SubjectScores {
    /// Creates an empty set: no subject entered.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_slots(slots: [Option<f64>; SUBJECT_COUNT]) -> Self {
        Self(slots)
    }

    /// Builds a partial set from `(subject number, score)` pairs.
    ///
    /// Later pairs for the same subject win.
    pub fn try_from_pairs(
        pairs: impl IntoIterator<Item = (usize, f64)>,
    ) -> Result<Self, ScoreValidationError> {
        let mut subjects = Self::new();
        for (subject, score) in pairs {
            subjects.set(subject, Some(score))?;
        }
        Ok(subjects)
    }

    pub fn slots(&self) -> &[Option<f64>; SUBJECT_COUNT] {
        &self.0
    }

    /// Score for a 1-based subject number; `None` if absent or out of range.
    pub fn get(&self, subject: usize) -> Option<f64> {
        let index = subject.checked_sub(1)?;
        self.0.get(index).copied().flatten()
    }

    /// Sets or clears a 1-based subject slot.
    pub fn set(&mut self, subject: usize, score: Option<f64>) -> Result<(), ScoreValidationError> {
        let slot = subject
            .checked_sub(1)
            .and_then(|index| self.0.get_mut(index))
            .ok_or(ScoreValidationError::SubjectOutOfRange(subject))?;
        *slot = score;
        Ok(())
    }

    /// Overwrites only the slots present in `patch`; omitted slots keep
    /// their current value.
    pub fn merge(&mut self, patch: &SubjectScores) {
        for (slot, incoming) in self.0.iter_mut().zip(patch.0.iter()) {
            if incoming.is_some() {
                *slot = *incoming;
            }
        }
    }

    /// Iterates entered scores in subject order.
    pub fn present(&self) -> impl Iterator<Item = f64> + '_ {
        self.0.iter().filter_map(|slot| *slot)
    }

    pub fn present_count(&self) -> usize {
        self.0.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.present_count() == 0
    }

    /// Rejects values SQLite cannot store faithfully (NaN reads back as NULL).
    pub fn validate(&self) -> Result<(), ScoreValidationError> {
        for (index, slot) in self.0.iter().enumerate() {
            if let Some(value) = slot {
                if !value.is_finite() {
                    return Err(ScoreValidationError::NonFiniteScore {
                        subject: index + 1,
                        value: *value,
                    });
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
struct NamedSubjects {
    subject1: Option<f64>,
    subject2: Option<f64>,
    subject3: Option<f64>,
    subject4: Option<f64>,
    subject5: Option<f64>,
    subject6: Option<f64>,
    subject7: Option<f64>,
    subject8: Option<f64>,
}

impl From<NamedSubjects> for SubjectScores {
    fn from(value: NamedSubjects) -> Self {
        Self([
            value.subject1,
            value.subject2,
            value.subject3,
            value.subject4,
            value.subject5,
            value.subject6,
            value.subject7,
            value.subject8,
        ])
    }
}

impl From<SubjectScores> for NamedSubjects {
    fn from(value: SubjectScores) -> Self {
        let [subject1, subject2, subject3, subject4, subject5, subject6, subject7, subject8] =
            value.0;
        Self {
            subject1,
            subject2,
            subject3,
            subject4,
            subject5,
            subject6,
            subject7,
            subject8,
        }
    }
}

/// Derived total and average of the entered subjects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreTotals {
    pub total: f64,
    pub average: f64,
}

/// Whether an upsert inserted a new triple or merged into an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreOutcome {
    Created,
    Updated,
}

/// Score record ready to be written; carries no storage id yet.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreDraft {
    pub key: ScoreKey,
    pub subjects: SubjectScores,
    pub totals: ScoreTotals,
    /// Epoch milliseconds.
    pub created_at: i64,
    /// Epoch milliseconds.
    pub updated_at: i64,
}

impl ScoreDraft {
    pub fn validate(&self) -> Result<(), ScoreValidationError> {
        self.key.validate()?;
        self.subjects.validate()
    }
}

/// Persisted score record for one (student, grade, semester) triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub id: ScoreId,
    pub key: ScoreKey,
    pub subjects: SubjectScores,
    pub totals: ScoreTotals,
    pub created_at: i64,
    pub updated_at: i64,
}
