use scorebook_core::db::open_db_in_memory;
use scorebook_core::{
    NewStudent, NotFoundTarget, RepoError, SqliteStudentRepository, StudentDirectory,
};
use rusqlite::Connection;

fn new_student(num: i64, name: &str, grade: u32, classroom: u32) -> NewStudent {
    NewStudent {
        student_num: num,
        name: name.to_string(),
        grade,
        classroom,
        user_id: None,
    }
}

#[test]
fn create_and_find_by_id_roundtrip() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteStudentRepository::try_new(&conn).unwrap();

    let mut input = new_student(7, "  Park Minji ", 2, 3);
    input.user_id = Some("parent-17".to_string());
    let created = repo.create_student(&input).unwrap();

    let loaded = repo.find_by_id(created.id).unwrap().unwrap();
    assert_eq!(loaded, created);
    assert_eq!(loaded.name, "Park Minji");
    assert_eq!(loaded.user_id.as_deref(), Some("parent-17"));
    assert!(repo.find_by_id(created.id + 100).unwrap().is_none());
}

#[test]
fn find_by_grade_and_classroom_filters_both_fields() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteStudentRepository::try_new(&conn).unwrap();

    let a = repo.create_student(&new_student(2, "A", 2, 1)).unwrap();
    let b = repo.create_student(&new_student(1, "B", 2, 1)).unwrap();
    repo.create_student(&new_student(3, "C", 2, 2)).unwrap();
    repo.create_student(&new_student(4, "D", 3, 1)).unwrap();

    let class = repo.find_by_grade_and_classroom(2, 1).unwrap();
    let mut ids: Vec<_> = class.iter().map(|student| student.id).collect();
    ids.sort_unstable();
    let mut expected = vec![a.id, b.id];
    expected.sort_unstable();
    assert_eq!(ids, expected);

    assert!(repo.find_by_grade_and_classroom(9, 9).unwrap().is_empty());
}

#[test]
fn update_and_delete_report_missing_students() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteStudentRepository::try_new(&conn).unwrap();

    let created = repo.create_student(&new_student(1, "Choi", 1, 1)).unwrap();
    let updated = repo
        .update_student(created.id, &new_student(1, "Choi Yuna", 2, 4))
        .unwrap();
    assert_eq!(updated.grade, 2);
    assert_eq!(updated.classroom, 4);
    assert_eq!(updated.name, "Choi Yuna");

    repo.delete_student(created.id).unwrap();
    let err = repo.delete_student(created.id).unwrap_err();
    assert!(matches!(
        err,
        RepoError::NotFound(NotFoundTarget::Student(id)) if id == created.id
    ));
    let err = repo
        .update_student(created.id, &new_student(1, "Ghost", 1, 1))
        .unwrap_err();
    assert!(matches!(err, RepoError::NotFound(_)));
}

#[test]
fn create_rejects_blank_name_and_zero_grade() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteStudentRepository::try_new(&conn).unwrap();

    let err = repo.create_student(&new_student(1, "   ", 1, 1)).unwrap_err();
    assert!(matches!(err, RepoError::InvalidInput(_)));
    let err = repo.create_student(&new_student(1, "Han", 0, 1)).unwrap_err();
    assert!(matches!(err, RepoError::InvalidInput(_)));
    assert!(repo.list_students().unwrap().is_empty());
}

#[test]
fn list_students_orders_by_grade_classroom_and_number() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteStudentRepository::try_new(&conn).unwrap();

    repo.create_student(&new_student(2, "Second", 1, 1)).unwrap();
    repo.create_student(&new_student(1, "Upper", 2, 1)).unwrap();
    repo.create_student(&new_student(1, "First", 1, 1)).unwrap();

    let names: Vec<_> = repo
        .list_students()
        .unwrap()
        .into_iter()
        .map(|student| student.name)
        .collect();
    assert_eq!(names, vec!["First", "Second", "Upper"]);
}

#[test]
fn try_new_rejects_unmigrated_connection() {
    let conn = Connection::open_in_memory().unwrap();
    let err = SqliteStudentRepository::try_new(&conn).err().unwrap();
    assert!(matches!(err, RepoError::MissingRequiredTable("students")));
}
