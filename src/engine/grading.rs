//! Task submissions and the grading fan-out.
//!
//! Reviewing a submission writes the grade and, for an accepted grade, the
//! zone's experience and task counter in one transaction. The achievement
//! checks that follow run independently after commit; each failure is logged
//! and the grade stays written.

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;
use sled::transaction::Transactional;

use crate::engine::achievement::{check_logged, UnlockedAchievement};
use crate::engine::errors::EngineError;
use crate::engine::progression::{add_experience_in, check_experience, increment_tasks_in};
use crate::engine::storage::{keys, tx_abort, tx_get, tx_put, TxResult};
use crate::engine::types::{
    ConditionType, ExperienceOutcome, GradeSummary, Submission, SubmissionStatus, ZoneProgress,
};
use crate::engine::Engine;
use crate::metrics;

/// Result of reviewing a submission.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ReviewOutcome {
    pub submission: Submission,
    pub accepted: bool,
    /// Experience awarded; `None` when the grade was below the passing mark.
    pub experience: Option<ExperienceOutcome>,
    pub unlocked: Vec<UnlockedAchievement>,
}

/// Record a pending submission for a catalog task.
pub fn submit_task(
    engine: &Engine,
    user_id: &str,
    task_id: &str,
    now: DateTime<Utc>,
) -> Result<Submission, EngineError> {
    let task = engine.catalog.task(task_id)?;
    let submission = Submission::new(user_id, task_id, &task.zone_id, now);
    engine
        .store
        .submissions
        .transaction(|submissions| -> TxResult<()> {
            tx_put(submissions, &keys::submission(&submission.id), &submission)?;
            submissions.insert(
                keys::user_submission(user_id, &submission.id),
                submission.id.as_bytes(),
            )?;
            Ok(())
        })?;
    engine.store.flush()?;

    info!("submission: {} submitted {} ({})", user_id, task_id, submission.id);
    engine.notify(user_id, "submission", "created", &submission);
    Ok(submission)
}

/// Grade a pending submission.
///
/// Grades at or above the passing mark award the task's experience and count
/// a completed task, then run the achievement checks: `xp_earned`,
/// `level_reached` (on level-up), the zone's `tasks_completed`,
/// `perfect_grade`, `high_average` and `tasks_completed` against the user's
/// total reviewed submissions.
pub fn review_submission(
    engine: &Engine,
    submission_id: &str,
    grade: u8,
    now: DateTime<Utc>,
) -> Result<ReviewOutcome, EngineError> {
    if grade > 100 {
        return Err(EngineError::InvalidInput(format!(
            "grade {} is outside 0..=100",
            grade
        )));
    }
    let pending = engine.store.get_submission(submission_id)?;
    let task = engine.catalog.task(&pending.task_id)?;
    let rules = &engine.progression_rules;
    let accepted = grade >= rules.passing_grade;

    let (submission, experience, tasks) = (&engine.store.submissions, &engine.store.progress)
        .transaction(
            |(submissions, progress)| -> TxResult<(Submission, Option<ExperienceOutcome>, Option<ZoneProgress>)> {
                let key = keys::submission(submission_id);
                let Some(mut submission) = tx_get::<Submission>(submissions, &key)? else {
                    return tx_abort(EngineError::NotFound(format!(
                        "submission: {}",
                        submission_id
                    )));
                };
                if submission.status == SubmissionStatus::Reviewed {
                    return tx_abort(EngineError::Conflict(format!(
                        "submission {} is already reviewed",
                        submission_id
                    )));
                }
                submission.status = SubmissionStatus::Reviewed;
                submission.grade = Some(grade);
                submission.reviewed_at = Some(now);
                tx_put(submissions, &key, &submission)?;

                if !accepted {
                    return Ok((submission, None, None));
                }
                let experience = add_experience_in(
                    progress,
                    &submission.user_id,
                    &submission.zone_id,
                    u64::from(task.experience),
                    rules.xp_per_level,
                    now,
                )?;
                let tasks =
                    increment_tasks_in(progress, &submission.user_id, &submission.zone_id, now)?;
                Ok((submission, Some(experience), Some(tasks)))
            },
        )?;
    engine.store.flush()?;

    let user_id = submission.user_id.clone();
    info!(
        "submission: {} graded {} for {} ({})",
        submission_id,
        grade,
        user_id,
        if accepted { "accepted" } else { "rejected" }
    );
    engine.notify(&user_id, "submission", "reviewed", &submission);

    let mut unlocked = Vec::new();
    if let (Some(experience), Some(tasks)) = (&experience, &tasks) {
        engine.notify(&user_id, "progress", "updated", tasks);
        unlocked = fan_out(engine, &user_id, grade, experience, tasks, now);
    }

    Ok(ReviewOutcome {
        submission,
        accepted,
        experience,
        unlocked,
    })
}

/// Post-commit achievement checks for an accepted grade. Every check runs
/// regardless of what the others found or whether they failed.
fn fan_out(
    engine: &Engine,
    user_id: &str,
    grade: u8,
    experience: &ExperienceOutcome,
    tasks: &ZoneProgress,
    now: DateTime<Utc>,
) -> Vec<UnlockedAchievement> {
    let rules = &engine.progression_rules;
    let mut unlocked = check_experience(engine, user_id, experience, now);
    unlocked.extend(check_logged(
        engine,
        user_id,
        ConditionType::TasksCompleted,
        u64::from(tasks.tasks_completed),
        now,
    ));
    if grade >= rules.perfect_grade {
        unlocked.extend(check_logged(
            engine,
            user_id,
            ConditionType::PerfectGrade,
            u64::from(grade),
            now,
        ));
    }

    match grade_summary(engine, user_id) {
        Ok(summary) => {
            if summary.average >= rules.high_average {
                unlocked.extend(check_logged(
                    engine,
                    user_id,
                    ConditionType::HighAverage,
                    summary.average.floor() as u64,
                    now,
                ));
            }
            unlocked.extend(check_logged(
                engine,
                user_id,
                ConditionType::TasksCompleted,
                u64::from(summary.reviewed),
                now,
            ));
        }
        Err(e) => {
            warn!("grade summary for {} failed: {}", user_id, e);
            metrics::inc_achievement_check_failures();
        }
    }
    unlocked
}

/// All-time count and average of the user's reviewed submissions, across zones.
pub fn grade_summary(engine: &Engine, user_id: &str) -> Result<GradeSummary, EngineError> {
    let grades: Vec<u32> = engine
        .store
        .list_submissions(user_id)?
        .into_iter()
        .filter(|s| s.status == SubmissionStatus::Reviewed)
        .filter_map(|s| s.grade.map(u32::from))
        .collect();
    let reviewed = grades.len() as u32;
    let average = if grades.is_empty() {
        0.0
    } else {
        f64::from(grades.iter().sum::<u32>()) / f64::from(reviewed)
    };
    Ok(GradeSummary { reviewed, average })
}

pub fn list_submissions(engine: &Engine, user_id: &str) -> Result<Vec<Submission>, EngineError> {
    engine.store.list_submissions(user_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::progression::progress;
    use crate::engine::{Catalog, EngineStoreBuilder};
    use tempfile::TempDir;

    fn setup() -> (TempDir, Engine) {
        let dir = TempDir::new().expect("tempdir");
        let store = EngineStoreBuilder::new(dir.path()).open().expect("store");
        (dir, Engine::new(store, Catalog::starter()))
    }

    #[test]
    fn accepted_grade_awards_experience_and_task() {
        let (_dir, engine) = setup();
        let now = Utc::now();
        let submission = submit_task(&engine, "alice", "fractions_intro", now).unwrap();
        assert_eq!(submission.status, SubmissionStatus::Pending);

        let outcome = review_submission(&engine, &submission.id, 75, now).unwrap();
        assert!(outcome.accepted);
        let math = progress(&engine, "alice", "math", now).unwrap();
        assert_eq!(math.experience, 400);
        assert_eq!(math.tasks_completed, 1);

        let ids: Vec<&str> = outcome
            .unlocked
            .iter()
            .map(|u| u.achievement.id.as_str())
            .collect();
        assert!(ids.contains(&"first_steps"));
        assert!(ids.contains(&"first_task"));
        assert!(!ids.contains(&"perfectionist"));
    }

    #[test]
    fn rejected_grade_is_recorded_without_experience() {
        let (_dir, engine) = setup();
        let now = Utc::now();
        let submission = submit_task(&engine, "alice", "cell_biology", now).unwrap();
        let outcome = review_submission(&engine, &submission.id, 59, now).unwrap();
        assert!(!outcome.accepted);
        assert!(outcome.experience.is_none());
        assert!(outcome.unlocked.is_empty());
        assert_eq!(outcome.submission.grade, Some(59));
        assert_eq!(progress(&engine, "alice", "science", now).unwrap().experience, 0);
        assert_eq!(grade_summary(&engine, "alice").unwrap().reviewed, 1);
    }

    #[test]
    fn perfect_grade_unlocks_perfect_and_average_achievements() {
        let (_dir, engine) = setup();
        let now = Utc::now();
        let submission = submit_task(&engine, "alice", "algebra_basics", now).unwrap();
        let outcome = review_submission(&engine, &submission.id, 95, now).unwrap();
        let ids: Vec<&str> = outcome
            .unlocked
            .iter()
            .map(|u| u.achievement.id.as_str())
            .collect();
        assert!(ids.contains(&"perfectionist"));
        assert!(ids.contains(&"honor_roll"));
        // first_task comes from the zone counter; the global count check skips it
        assert_eq!(ids.iter().filter(|id| **id == "first_task").count(), 1);
    }

    #[test]
    fn review_twice_conflicts() {
        let (_dir, engine) = setup();
        let now = Utc::now();
        let submission = submit_task(&engine, "alice", "fractions_intro", now).unwrap();
        review_submission(&engine, &submission.id, 80, now).unwrap();
        assert!(matches!(
            review_submission(&engine, &submission.id, 80, now),
            Err(EngineError::Conflict(_))
        ));
        assert_eq!(progress(&engine, "alice", "math", now).unwrap().experience, 400);
    }

    #[test]
    fn invalid_grades_and_unknown_ids_are_rejected() {
        let (_dir, engine) = setup();
        let now = Utc::now();
        let submission = submit_task(&engine, "alice", "fractions_intro", now).unwrap();
        assert!(matches!(
            review_submission(&engine, &submission.id, 101, now),
            Err(EngineError::InvalidInput(_))
        ));
        assert!(matches!(
            review_submission(&engine, "missing", 80, now),
            Err(EngineError::NotFound(_))
        ));
        assert!(matches!(
            submit_task(&engine, "alice", "no_such_task", now),
            Err(EngineError::NotFound(_))
        ));
    }

    #[test]
    fn summary_averages_reviewed_grades_only() {
        let (_dir, engine) = setup();
        let now = Utc::now();
        let a = submit_task(&engine, "alice", "fractions_intro", now).unwrap();
        let b = submit_task(&engine, "alice", "cell_biology", now).unwrap();
        submit_task(&engine, "alice", "algebra_basics", now).unwrap();
        review_submission(&engine, &a.id, 90, now).unwrap();
        review_submission(&engine, &b.id, 70, now).unwrap();
        let summary = grade_summary(&engine, "alice").unwrap();
        assert_eq!(summary.reviewed, 2);
        assert!((summary.average - 80.0).abs() < f64::EPSILON);
    }

    #[test]
    fn grade_survives_a_failing_achievement_check() {
        let (_dir, engine) = setup();
        let now = Utc::now();
        engine
            .store
            .submissions
            .insert(keys::submission("garbled"), b"not a submission".to_vec())
            .unwrap();
        engine
            .store
            .submissions
            .insert(keys::user_submission("alice", "garbled"), b"garbled".to_vec())
            .unwrap();
        assert!(grade_summary(&engine, "alice").is_err());

        let submission = submit_task(&engine, "alice", "algebra_basics", now).unwrap();
        let before = metrics::snapshot();
        let outcome = review_submission(&engine, &submission.id, 95, now).unwrap();
        assert!(metrics::snapshot().achievement_check_failures > before.achievement_check_failures);

        // the checks that do not need the summary still ran
        assert!(outcome
            .unlocked
            .iter()
            .any(|u| u.achievement.id == "perfectionist"));
        let stored = engine.store.get_submission(&submission.id).unwrap();
        assert_eq!(stored.grade, Some(95));
        assert_eq!(stored.status, SubmissionStatus::Reviewed);
        assert!(progress(&engine, "alice", "math", now).unwrap().experience > 0);
    }
}
