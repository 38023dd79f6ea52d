//! Domain model for students and their per-semester score records.
//!
//! # Responsibility
//! - Define the records shared by repositories, services and callers.
//! - Own field-level merge semantics for partial score submissions.
//!
//! # Invariants
//! - A score record is identified by its `ScoreKey` triple.
//! - An absent subject score means "not entered yet", never zero.

pub mod score;
pub mod student;

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in Unix epoch milliseconds.
///
/// Clocks set before 1970 read as `0`.
pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| {
            i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX)
        })
}
