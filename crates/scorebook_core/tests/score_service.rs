use scorebook_core::db::open_db_in_memory;
use scorebook_core::{
    NewStudent, Notifier, ScoreKey, ScoreOutcome, ScoreService, ScoreServiceError, ScoreStore,
    SqliteScoreRepository, SqliteStudentRepository, Student, SubjectScores,
};
use rusqlite::Connection;
use std::sync::Mutex;

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, user_id: &str, message: &str) {
        self.sent
            .lock()
            .unwrap()
            .push((user_id.to_string(), message.to_string()));
    }
}

fn add_student(
    conn: &Connection,
    num: i64,
    name: &str,
    grade: u32,
    classroom: u32,
    user_id: Option<&str>,
) -> Student {
    SqliteStudentRepository::try_new(conn)
        .unwrap()
        .create_student(&NewStudent {
            student_num: num,
            name: name.to_string(),
            grade,
            classroom,
            user_id: user_id.map(str::to_string),
        })
        .unwrap()
}

fn subjects(pairs: &[(usize, f64)]) -> SubjectScores {
    SubjectScores::try_from_pairs(pairs.iter().copied()).unwrap()
}

#[test]
fn create_then_partial_update_merges_and_recomputes() {
    let conn = open_db_in_memory().unwrap();
    let student = add_student(&conn, 1, "Kim Jisoo", 2, 1, None);
    let students = SqliteStudentRepository::try_new(&conn).unwrap();
    let notifier = RecordingNotifier::default();
    let service = ScoreService::new(
        &students,
        SqliteScoreRepository::try_new(&conn).unwrap(),
        &notifier,
    );
    let key = ScoreKey::new(student.id, 2, 1);

    let created = service
        .create_or_update_score(key, &subjects(&[(1, 90.0), (2, 80.0)]))
        .unwrap();
    assert_eq!(created.outcome, ScoreOutcome::Created);
    assert_eq!(created.total, 170.0);
    assert_eq!(created.average, 85.0);

    let updated = service
        .create_or_update_score(key, &subjects(&[(3, 70.0)]))
        .unwrap();
    assert_eq!(updated.outcome, ScoreOutcome::Updated);
    assert_eq!(updated.record_id, created.record_id);
    assert_eq!(updated.total, 240.0);
    assert_eq!(updated.average, 80.0);
    assert_eq!(updated.subjects.get(1), Some(90.0));
    assert_eq!(updated.subjects.get(2), Some(80.0));
    assert_eq!(updated.subjects.get(3), Some(70.0));
    assert_eq!(updated.message, "score record updated");
}

#[test]
fn repeated_calls_keep_one_record_with_union_of_subjects() {
    let conn = open_db_in_memory().unwrap();
    let student = add_student(&conn, 1, "Lee", 1, 1, None);
    let students = SqliteStudentRepository::try_new(&conn).unwrap();
    let scores = SqliteScoreRepository::try_new(&conn).unwrap();
    let notifier = RecordingNotifier::default();
    let service = ScoreService::new(&students, &scores, &notifier);
    let key = ScoreKey::new(student.id, 1, 2);

    service
        .create_or_update_score(key, &subjects(&[(1, 60.0), (4, 40.0)]))
        .unwrap();
    service
        .create_or_update_score(key, &subjects(&[(5, 100.0), (8, 0.0)]))
        .unwrap();

    let records = scores.find_all_by_student(student.id).unwrap();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.subjects.present_count(), 4);
    assert_eq!(record.totals.total, 200.0);
    assert_eq!(record.totals.average, 50.0);
    assert!(record.updated_at >= record.created_at);
}

#[test]
fn create_for_unknown_student_is_not_found() {
    let conn = open_db_in_memory().unwrap();
    let students = SqliteStudentRepository::try_new(&conn).unwrap();
    let notifier = RecordingNotifier::default();
    let service = ScoreService::new(
        &students,
        SqliteScoreRepository::try_new(&conn).unwrap(),
        &notifier,
    );

    let err = service
        .create_or_update_score(ScoreKey::new(77, 1, 1), &subjects(&[(1, 10.0)]))
        .unwrap_err();
    assert!(matches!(err, ScoreServiceError::StudentNotFound(77)));
    assert!(err.is_not_found());
    assert!(notifier.sent().is_empty());
}

#[test]
fn notifications_follow_outcome_and_linked_user() {
    let conn = open_db_in_memory().unwrap();
    let linked = add_student(&conn, 1, "Park", 3, 2, Some("parent-1"));
    let unlinked = add_student(&conn, 2, "Jung", 3, 2, None);
    let students = SqliteStudentRepository::try_new(&conn).unwrap();
    let notifier = RecordingNotifier::default();
    let service = ScoreService::new(
        &students,
        SqliteScoreRepository::try_new(&conn).unwrap(),
        &notifier,
    );

    let linked_key = ScoreKey::new(linked.id, 3, 1);
    service
        .create_or_update_score(linked_key, &subjects(&[(1, 88.0)]))
        .unwrap();
    service
        .create_or_update_score(linked_key, &subjects(&[(2, 77.0)]))
        .unwrap();
    service
        .create_or_update_score(ScoreKey::new(unlinked.id, 3, 1), &subjects(&[(1, 50.0)]))
        .unwrap();

    let sent = notifier.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|(user_id, _)| user_id == "parent-1"));
    assert!(sent[0].1.contains("registered"));
    assert!(sent[1].1.contains("updated"));
}

#[test]
fn update_score_never_creates() {
    let conn = open_db_in_memory().unwrap();
    let student = add_student(&conn, 1, "Yoon", 2, 1, Some("parent-9"));
    let students = SqliteStudentRepository::try_new(&conn).unwrap();
    let scores = SqliteScoreRepository::try_new(&conn).unwrap();
    let notifier = RecordingNotifier::default();
    let service = ScoreService::new(&students, &scores, &notifier);
    let key = ScoreKey::new(student.id, 2, 2);

    let err = service
        .update_score(key, &subjects(&[(1, 90.0)]))
        .unwrap_err();
    assert!(matches!(err, ScoreServiceError::ScoreNotFound(missing) if missing == key));
    assert!(scores.find_by_student_grade_semester(key).unwrap().is_none());
    assert!(notifier.sent().is_empty());

    service
        .create_or_update_score(key, &subjects(&[(1, 90.0)]))
        .unwrap();
    let updated = service.update_score(key, &subjects(&[(1, 60.0)])).unwrap();
    assert_eq!(updated.outcome, ScoreOutcome::Updated);
    assert_eq!(updated.total, 60.0);
    assert_eq!(notifier.sent().len(), 2);
}

#[test]
fn student_query_distinguishes_missing_student_from_missing_scores() {
    let conn = open_db_in_memory().unwrap();
    let student = add_student(&conn, 12, "Han", 2, 1, None);
    let students = SqliteStudentRepository::try_new(&conn).unwrap();
    let notifier = RecordingNotifier::default();
    let service = ScoreService::new(
        &students,
        SqliteScoreRepository::try_new(&conn).unwrap(),
        &notifier,
    );

    let err = service.get_student_scores(student.id + 1).unwrap_err();
    assert!(matches!(err, ScoreServiceError::StudentNotFound(_)));
    let err = service.get_student_scores(student.id).unwrap_err();
    assert!(matches!(err, ScoreServiceError::NoScoresForStudent(id) if id == student.id));
    assert!(err.is_not_found());

    service
        .create_or_update_score(ScoreKey::new(student.id, 1, 1), &subjects(&[(1, 70.0)]))
        .unwrap();
    service
        .create_or_update_score(ScoreKey::new(student.id, 2, 1), &subjects(&[(1, 80.0)]))
        .unwrap();
    service
        .create_or_update_score(ScoreKey::new(student.id, 2, 2), &subjects(&[(1, 90.0)]))
        .unwrap();

    let listing = service.get_student_scores(student.id).unwrap();
    assert_eq!(listing.student_num, "12");
    assert_eq!(listing.student_name, "Han");
    assert_eq!(listing.grade, 2);
    assert_eq!(listing.scores.len(), 3);

    let second_semester = service
        .get_student_scores_for_semester(student.id, 2)
        .unwrap();
    assert_eq!(second_semester.scores.len(), 1);
    assert_eq!(second_semester.scores[0].total_score, 90.0);
    let err = service
        .get_student_scores_for_semester(student.id, 3)
        .unwrap_err();
    assert!(matches!(err, ScoreServiceError::NoScoresForStudent(_)));
}

#[test]
fn class_query_skips_students_without_records() {
    let conn = open_db_in_memory().unwrap();
    let scored = add_student(&conn, 1, "Scored", 2, 3, None);
    add_student(&conn, 2, "Unscored", 2, 3, None);
    let other_class = add_student(&conn, 3, "Elsewhere", 2, 4, None);
    let students = SqliteStudentRepository::try_new(&conn).unwrap();
    let notifier = RecordingNotifier::default();
    let service = ScoreService::new(
        &students,
        SqliteScoreRepository::try_new(&conn).unwrap(),
        &notifier,
    );

    service
        .create_or_update_score(ScoreKey::new(scored.id, 2, 1), &subjects(&[(1, 70.0), (2, 90.0)]))
        .unwrap();
    service
        .create_or_update_score(ScoreKey::new(scored.id, 2, 2), &subjects(&[(1, 10.0)]))
        .unwrap();
    service
        .create_or_update_score(ScoreKey::new(other_class.id, 2, 1), &subjects(&[(1, 50.0)]))
        .unwrap();

    let class = service.get_class_scores(2, 1, 3).unwrap();
    assert_eq!(class.students.len(), 1);
    let entry = &class.students[0];
    assert_eq!(entry.student_id, scored.id);
    assert_eq!(entry.classroom, 3);
    assert_eq!(entry.semester, 1);
    assert_eq!(entry.total_score, 160.0);
    assert_eq!(entry.average_score, 80.0);
}

#[test]
fn empty_class_query_is_a_successful_empty_result() {
    let conn = open_db_in_memory().unwrap();
    add_student(&conn, 1, "Nobody scored", 1, 1, None);
    let students = SqliteStudentRepository::try_new(&conn).unwrap();
    let notifier = RecordingNotifier::default();
    let service = ScoreService::new(
        &students,
        SqliteScoreRepository::try_new(&conn).unwrap(),
        &notifier,
    );

    let with_students = service.get_class_scores(1, 1, 1).unwrap();
    assert!(with_students.is_empty());
    assert_eq!(with_students.message, "no score records found for this class");

    let without_students = service.get_class_scores(6, 2, 9).unwrap();
    assert!(without_students.is_empty());
}

#[test]
fn delete_removes_only_the_addressed_triple() {
    let conn = open_db_in_memory().unwrap();
    let student = add_student(&conn, 1, "Seo", 2, 1, None);
    let students = SqliteStudentRepository::try_new(&conn).unwrap();
    let scores = SqliteScoreRepository::try_new(&conn).unwrap();
    let notifier = RecordingNotifier::default();
    let service = ScoreService::new(&students, &scores, &notifier);
    let first = ScoreKey::new(student.id, 2, 1);
    let second = ScoreKey::new(student.id, 2, 2);
    for key in [first, second] {
        service
            .create_or_update_score(key, &subjects(&[(1, 75.0)]))
            .unwrap();
    }

    let deleted = service.delete_score(first).unwrap();
    assert_eq!(deleted.message, "score record deleted");
    assert_eq!(deleted.semester, 1);

    let remaining = scores.find_all_by_student(student.id).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].key, second);

    let err = service.delete_score(first).unwrap_err();
    assert!(matches!(err, ScoreServiceError::ScoreNotFound(missing) if missing == first));
    assert!(err.is_not_found());
}

#[test]
fn upsert_result_serializes_named_subject_slots() {
    let conn = open_db_in_memory().unwrap();
    let student = add_student(&conn, 1, "Oh", 1, 1, None);
    let students = SqliteStudentRepository::try_new(&conn).unwrap();
    let notifier = RecordingNotifier::default();
    let service = ScoreService::new(
        &students,
        SqliteScoreRepository::try_new(&conn).unwrap(),
        &notifier,
    );

    let result = service
        .create_or_update_score(ScoreKey::new(student.id, 1, 1), &subjects(&[(2, 88.0)]))
        .unwrap();
    let json = serde_json::to_value(&result).unwrap();

    assert_eq!(json["outcome"], "created");
    assert_eq!(json["subjects"]["subject2"], 88.0);
    assert!(json["subjects"]["subject1"].is_null());
    assert!(json["subjects"].get("subject8").is_some());
    assert_eq!(json["total"], 88.0);
}
