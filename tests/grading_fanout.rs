/// Integration tests for the grading fan-out: one review moves experience,
/// task counters and several achievement checks, and pushes each change.
mod common;

use growquest::engine::achievement::unlocked_achievements;
use growquest::engine::grading::{grade_summary, list_submissions, review_submission, submit_task};
use growquest::engine::progression::progress;
use growquest::engine::realtime::user_room;
use growquest::engine::{EngineError, SubmissionStatus};

#[test]
fn accepted_review_pushes_every_change() {
    let (_dir, engine) = common::temp_engine();
    let now = common::t0();
    let submission = submit_task(&engine, "alice", "algebra_basics", now).unwrap();

    let mut session = engine.realtime.connect();
    engine.realtime.authenticate(&session.id, "alice").unwrap();
    engine.realtime.join(&session.id, &user_room("alice")).unwrap();

    let outcome = review_submission(&engine, &submission.id, 92, now).unwrap();
    assert!(outcome.accepted);
    assert_eq!(outcome.submission.status, SubmissionStatus::Reviewed);

    let mut names = Vec::new();
    while let Ok(event) = session.events.try_recv() {
        names.push(event.name);
    }
    assert_eq!(names[0], "submission:reviewed");
    assert_eq!(names[1], "progress:updated");
    // first_steps, first_task, perfectionist, honor_roll
    assert_eq!(
        names.iter().filter(|n| *n == "achievement:unlocked").count(),
        4
    );
}

#[test]
fn ten_accepted_reviews_across_zones_unlock_ten_tasks() {
    let (_dir, engine) = common::temp_engine();
    let now = common::t0();
    for i in 0..10 {
        let task = if i % 2 == 0 { "fractions_intro" } else { "cell_biology" };
        let submission = submit_task(&engine, "alice", task, now).unwrap();
        review_submission(&engine, &submission.id, 70, now).unwrap();
    }
    // neither zone reaches ten on its own
    assert_eq!(progress(&engine, "alice", "math", now).unwrap().tasks_completed, 5);
    assert_eq!(progress(&engine, "alice", "science", now).unwrap().tasks_completed, 5);

    let ids: Vec<String> = unlocked_achievements(&engine, "alice")
        .unwrap()
        .into_iter()
        .map(|u| u.achievement.id)
        .collect();
    assert!(ids.contains(&"ten_tasks".to_string()));
    assert!(!ids.contains(&"perfectionist".to_string()));
    assert!(!ids.contains(&"honor_roll".to_string()));
}

#[test]
fn rejected_reviews_still_count_toward_the_average() {
    let (_dir, engine) = common::temp_engine();
    let now = common::t0();
    let low = submit_task(&engine, "alice", "fractions_intro", now).unwrap();
    review_submission(&engine, &low.id, 40, now).unwrap();
    let high = submit_task(&engine, "alice", "fractions_intro", now).unwrap();
    let outcome = review_submission(&engine, &high.id, 100, now).unwrap();

    // average (40 + 100) / 2 = 70, below the honor roll
    let summary = grade_summary(&engine, "alice").unwrap();
    assert_eq!(summary.reviewed, 2);
    assert!((summary.average - 70.0).abs() < f64::EPSILON);
    assert!(outcome
        .unlocked
        .iter()
        .all(|u| u.achievement.id != "honor_roll"));
    assert!(outcome
        .unlocked
        .iter()
        .any(|u| u.achievement.id == "perfectionist"));
}

#[test]
fn grade_persists_and_cannot_be_reviewed_again() {
    let (_dir, engine) = common::temp_engine();
    let now = common::t0();
    let submission = submit_task(&engine, "alice", "cell_biology", now).unwrap();
    review_submission(&engine, &submission.id, 88, now).unwrap();
    assert!(matches!(
        review_submission(&engine, &submission.id, 100, now),
        Err(EngineError::Conflict(_))
    ));
    let stored = list_submissions(&engine, "alice").unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].grade, Some(88));
    assert_eq!(progress(&engine, "alice", "science", now).unwrap().experience, 500);
}
