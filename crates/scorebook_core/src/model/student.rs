//! Student profile as seen by the score book.

use serde::{Deserialize, Serialize};

/// Integer identity of a student in the directory.
pub type StudentId = i64;

/// Read-only student profile resolved from the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    /// School-assigned display number (e.g. roll number).
    pub student_num: i64,
    pub name: String,
    pub grade: u32,
    pub classroom: u32,
    /// Linked external user account; notifications go here when present.
    pub user_id: Option<String>,
}

impl Student {
    /// Returns the linked user id when it is present and non-blank.
    pub fn notify_target(&self) -> Option<&str> {
        self.user_id
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

/// Input for registering or editing a student profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewStudent {
    pub student_num: i64,
    pub name: String,
    pub grade: u32,
    pub classroom: u32,
    pub user_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::Student;

    fn student(user_id: Option<&str>) -> Student {
        Student {
            id: 1,
            student_num: 12,
            name: "Kim".to_string(),
            grade: 2,
            classroom: 3,
            user_id: user_id.map(str::to_string),
        }
    }

    #[test]
    fn notify_target_skips_blank_user_ids() {
        assert_eq!(student(None).notify_target(), None);
        assert_eq!(student(Some("  ")).notify_target(), None);
        assert_eq!(student(Some(" parent-7 ")).notify_target(), Some("parent-7"));
    }
}
