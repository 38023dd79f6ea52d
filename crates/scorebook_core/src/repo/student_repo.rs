//! Student directory contract and SQLite implementation.
//!
//! # Responsibility
//! - Resolve student profiles for the score service (read-only contract).
//! - Provide registry writes used by administration paths and fixtures.
//!
//! # Invariants
//! - The score service only depends on `StudentDirectory`.
//! - Deleting a student cascades to its score records.

use crate::model::student::{NewStudent, Student, StudentId};
use crate::repo::{ensure_table_columns, NotFoundTarget, RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Row};

const STUDENT_SELECT_SQL: &str = "SELECT
    id,
    student_num,
    name,
    grade,
    classroom,
    user_id
FROM students";

/// Read-only student lookups consumed by the score service.
pub trait StudentDirectory {
    fn find_by_id(&self, id: StudentId) -> RepoResult<Option<Student>>;
    /// Students of one classroom; order is not part of the contract.
    fn find_by_grade_and_classroom(&self, grade: u32, classroom: u32)
        -> RepoResult<Vec<Student>>;
}

impl<T: StudentDirectory + ?Sized> StudentDirectory for &T {
    fn find_by_id(&self, id: StudentId) -> RepoResult<Option<Student>> {
        (**self).find_by_id(id)
    }

    fn find_by_grade_and_classroom(
        &self,
        grade: u32,
        classroom: u32,
    ) -> RepoResult<Vec<Student>> {
        (**self).find_by_grade_and_classroom(grade, classroom)
    }
}

/// SQLite-backed student registry.
pub struct SqliteStudentRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteStudentRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_table_columns(
            conn,
            "students",
            &["id", "student_num", "name", "grade", "classroom", "user_id"],
        )?;
        Ok(Self { conn })
    }

    /// Registers a student and returns the stored profile.
    pub fn create_student(&self, input: &NewStudent) -> RepoResult<Student> {
        validate_new_student(input)?;
        self.conn.execute(
            "INSERT INTO students (student_num, name, grade, classroom, user_id)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                input.student_num,
                input.name.trim(),
                input.grade,
                input.classroom,
                input.user_id.as_deref(),
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.find_by_id(id)?.ok_or_else(|| {
            RepoError::InvalidData(format!("student {id} missing after insert"))
        })
    }

    /// Replaces a student profile.
    pub fn update_student(&self, id: StudentId, input: &NewStudent) -> RepoResult<Student> {
        validate_new_student(input)?;
        let changed = self.conn.execute(
            "UPDATE students
             SET
                student_num = ?2,
                name = ?3,
                grade = ?4,
                classroom = ?5,
                user_id = ?6,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![
                id,
                input.student_num,
                input.name.trim(),
                input.grade,
                input.classroom,
                input.user_id.as_deref(),
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(NotFoundTarget::Student(id)));
        }

        self.find_by_id(id)?
            .ok_or(RepoError::NotFound(NotFoundTarget::Student(id)))
    }

    /// Removes a student together with its score records.
    pub fn delete_student(&self, id: StudentId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM students WHERE id = ?1;", [id])?;
        if changed == 0 {
            return Err(RepoError::NotFound(NotFoundTarget::Student(id)));
        }
        Ok(())
    }

    /// Lists every student ordered by grade, classroom and display number.
    pub fn list_students(&self) -> RepoResult<Vec<Student>> {
        let mut stmt = self.conn.prepare(&format!(
            "{STUDENT_SELECT_SQL} ORDER BY grade ASC, classroom ASC, student_num ASC, id ASC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut students = Vec::new();
        while let Some(row) = rows.next()? {
            students.push(parse_student_row(row)?);
        }
        Ok(students)
    }
}

impl StudentDirectory for SqliteStudentRepository<'_> {
    fn find_by_id(&self, id: StudentId) -> RepoResult<Option<Student>> {
        let student = self
            .conn
            .query_row(
                &format!("{STUDENT_SELECT_SQL} WHERE id = ?1;"),
                [id],
                |row| Ok(parse_student_row(row)),
            )
            .optional()?;
        student.transpose()
    }

    fn find_by_grade_and_classroom(
        &self,
        grade: u32,
        classroom: u32,
    ) -> RepoResult<Vec<Student>> {
        let mut stmt = self.conn.prepare(&format!(
            "{STUDENT_SELECT_SQL}
             WHERE grade = ?1
               AND classroom = ?2
             ORDER BY student_num ASC, id ASC;"
        ))?;
        let mut rows = stmt.query(params![grade, classroom])?;
        let mut students = Vec::new();
        while let Some(row) = rows.next()? {
            students.push(parse_student_row(row)?);
        }
        Ok(students)
    }
}

fn validate_new_student(input: &NewStudent) -> RepoResult<()> {
    if input.name.trim().is_empty() {
        return Err(RepoError::InvalidInput(
            "student name cannot be empty".to_string(),
        ));
    }
    if input.grade == 0 || input.classroom == 0 {
        return Err(RepoError::InvalidInput(format!(
            "grade and classroom must be positive, got grade={} classroom={}",
            input.grade, input.classroom
        )));
    }
    Ok(())
}

fn parse_student_row(row: &Row<'_>) -> RepoResult<Student> {
    Ok(Student {
        id: row.get("id")?,
        student_num: row.get("student_num")?,
        name: row.get("name")?,
        grade: row.get("grade")?,
        classroom: row.get("classroom")?,
        user_id: row.get("user_id")?,
    })
}
