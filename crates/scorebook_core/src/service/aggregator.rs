//! Score aggregation: total and arithmetic mean of entered subjects.

use crate::model::score::{ScoreTotals, SubjectScores};

/// Computes total and average over the entered subjects only.
///
/// Absent slots never count toward the divisor; an entered `0.0` does.
/// With nothing entered both values are `0.0`.
pub fn aggregate(subjects: &SubjectScores) -> ScoreTotals {
    let (total, count) = subjects
        .present()
        .fold((0.0_f64, 0_usize), |(sum, count), score| (sum + score, count + 1));
    let average = if count > 0 { total / count as f64 } else { 0.0 };
    ScoreTotals { total, average }
}
