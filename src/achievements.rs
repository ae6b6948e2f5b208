//! Achievement templates and the achievement evaluator.
//!
//! Nine achievements are predefined. Evaluation walks the ones a user has
//! not completed yet, checks each against its rule on a snapshot of the
//! user's activities, and for every hit awards the reward and records the
//! completion. Completion rows are upserted, so evaluating twice with the
//! same data completes each achievement at most once.

use chrono::NaiveDate;
use tracing::{debug, info};

use crate::error::{GameError, Result};
use crate::model::{Achievement, AchievementCategory, User};
use crate::progression::{self, ProgressSender};
use crate::rules::{ActivityLog, RuleRegistry};
use crate::storage::Storage;

/// The predefined achievements.
pub fn templates() -> Vec<Achievement> {
    use AchievementCategory::*;

    vec![
        Achievement::new(
            "1",
            "First activity of the day",
            "Log any workout as your first activity of the day",
            50,
            Daily,
        ),
        Achievement::new(
            "2",
            "Meet the time goal",
            "Reach today's time or distance goal",
            100,
            Daily,
        ),
        Achievement::new(
            "3",
            "Group activity",
            "Take part in a group activity",
            150,
            Daily,
        ),
        Achievement::new(
            "4",
            "Three day streak",
            "Be active on three different days in a row",
            200,
            Weekly,
        ),
        Achievement::new(
            "5",
            "Sport variety",
            "Practise at least three different sports in a week",
            250,
            Weekly,
        ),
        Achievement::new(
            "6",
            "Personal best",
            "Beat your best time or distance in any sport",
            300,
            Weekly,
        ),
        Achievement::new(
            "7",
            "Competitor",
            "Take part in at least one competition this month",
            400,
            Monthly,
        ),
        Achievement::new(
            "8",
            "Accumulated goals",
            "Cover 10,000 metres of activity this month",
            500,
            Monthly,
        ),
        Achievement::new(
            "9",
            "Ranking leader",
            "Finish first in a competition ranking",
            600,
            Monthly,
        ),
    ]
}

/// Insert the predefined achievements, leaving existing rows untouched.
pub async fn seed(storage: &Storage) -> Result<()> {
    for achievement in templates() {
        storage.insert_achievement(&achievement).await?;
    }
    Ok(())
}

/// Complete every pending achievement whose rule holds for `user` on
/// `today`. Returns the ids completed by this call.
pub async fn evaluate(
    storage: &Storage,
    registry: &RuleRegistry,
    notifier: &ProgressSender,
    user: &mut User,
    today: NaiveDate,
) -> Result<Vec<String>> {
    let pending = storage.pending_achievements(&user.id).await?;
    if pending.is_empty() {
        return Ok(Vec::new());
    }

    let log = ActivityLog::new(today, storage.list_activities(&user.id).await?);
    let mut completed = Vec::new();

    for mut achievement in pending {
        let Some(rule) = registry.achievement(&achievement.id) else {
            continue;
        };
        if !rule.is_met(&log) || !achievement.complete(&user.id, today) {
            continue;
        }

        storage
            .upsert_achievement_completion(&user.id, &achievement.id, today)
            .await?;
        progression::award_points(storage, notifier, user, achievement.reward_points).await?;

        info!(
            user_id = %user.id,
            achievement_id = %achievement.id,
            reward = achievement.reward_points,
            "Achievement unlocked"
        );
        completed.push(achievement.id);
    }

    debug!(user_id = %user.id, count = completed.len(), "Achievement evaluation finished");
    Ok(completed)
}

/// Progress percentage shown for an achievement.
///
/// Completed achievements and zero objectives report 100; otherwise the
/// user's all-time minutes against the objective, capped at 100.
pub fn progress_percent(achievement: &Achievement, total_minutes: i64) -> i64 {
    if achievement.completed || achievement.objective == 0 {
        return 100;
    }
    (total_minutes.max(0) * 100 / achievement.objective).min(100)
}

/// Progress of one achievement for one user.
pub async fn progress(storage: &Storage, user_id: &str, achievement_id: &str) -> Result<i64> {
    let achievement = storage
        .achievements_for_user(user_id)
        .await?
        .into_iter()
        .find(|a| a.id == achievement_id)
        .ok_or_else(|| GameError::AchievementNotFound(achievement_id.to_string()))?;

    let total_minutes = storage.total_minutes(user_id).await?;
    Ok(progress_percent(&achievement, total_minutes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Activity, SportType};
    use tokio::sync::broadcast;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 10).unwrap()
    }

    async fn setup() -> (Storage, User, ProgressSender) {
        let storage = Storage::new("sqlite::memory:").await.unwrap();
        seed(&storage).await.unwrap();
        let user = User::new("ana", "Ana");
        storage.insert_user(&user, "hash").await.unwrap();
        let (tx, _rx) = broadcast::channel(16);
        (storage, user, tx)
    }

    async fn log_activity(storage: &Storage, day: NaiveDate, hour: u32, sport: SportType, minutes: i64, km: f64) {
        let at = day.and_hms_opt(hour, 0, 0).unwrap();
        storage
            .insert_activity(&Activity::new("ana", sport, minutes, km, false, at))
            .await
            .unwrap();
    }

    #[test]
    fn test_templates() {
        let all = templates();
        assert_eq!(all.len(), 9);
        let points: Vec<i64> = all.iter().map(|a| a.reward_points).collect();
        assert_eq!(points, vec![50, 100, 150, 200, 250, 300, 400, 500, 600]);
        assert_eq!(all[3].category, AchievementCategory::Weekly);
        assert_eq!(all[8].category, AchievementCategory::Monthly);
    }

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let (storage, _, _) = setup().await;
        seed(&storage).await.unwrap();
        assert_eq!(storage.pending_achievements("ana").await.unwrap().len(), 9);
    }

    #[tokio::test]
    async fn test_evaluate_morning_workout() {
        let (storage, mut user, tx) = setup().await;
        let registry = RuleRegistry::default();

        log_activity(&storage, today(), 8, SportType::Run, 30, 5.0).await;

        let completed = evaluate(&storage, &registry, &tx, &mut user, today()).await.unwrap();
        // Morning start and the daily goal both hold
        assert_eq!(completed, vec!["1".to_string(), "2".to_string()]);
        assert_eq!(user.total_points, 150);

        let stored = storage.get_user("ana").await.unwrap().unwrap();
        assert_eq!(stored.total_points, 150);
        assert_eq!(stored.experience, 150);
    }

    #[tokio::test]
    async fn test_evaluate_twice_completes_once() {
        let (storage, mut user, tx) = setup().await;
        let registry = RuleRegistry::default();

        log_activity(&storage, today(), 8, SportType::Run, 30, 5.0).await;

        evaluate(&storage, &registry, &tx, &mut user, today()).await.unwrap();
        let again = evaluate(&storage, &registry, &tx, &mut user, today()).await.unwrap();

        assert!(again.is_empty());
        assert_eq!(user.total_points, 150);
        assert_eq!(storage.count_achievement_completions("ana").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_completion_recorded_before_payout() {
        let (storage, mut user, tx) = setup().await;
        log_activity(&storage, today(), 8, SportType::Run, 30, 5.0).await;

        // Make the progression write fail
        storage.execute_raw("DROP TABLE Usuarios").await.unwrap();
        let result = evaluate(&storage, &RuleRegistry::default(), &tx, &mut user, today()).await;
        assert!(result.is_err());

        // The completion is on record, so a retry cannot pay it again
        assert_eq!(storage.count_achievement_completions("ana").await.unwrap(), 1);
        let pending = storage.pending_achievements("ana").await.unwrap();
        assert!(pending.iter().all(|a| a.id != "1"));
    }

    #[tokio::test]
    async fn test_evaluate_nothing_logged() {
        let (storage, mut user, tx) = setup().await;
        let completed = evaluate(&storage, &RuleRegistry::default(), &tx, &mut user, today())
            .await
            .unwrap();
        assert!(completed.is_empty());
        assert_eq!(user.total_points, 0);
    }

    #[test]
    fn test_progress_percent() {
        let mut achievement = templates().remove(0);
        assert_eq!(progress_percent(&achievement, 0), 0);
        assert_eq!(progress_percent(&achievement, 1), 33);
        assert_eq!(progress_percent(&achievement, 500), 100);

        achievement.objective = 0;
        assert_eq!(progress_percent(&achievement, 0), 100);

        achievement.objective = 3;
        achievement.completed = true;
        assert_eq!(progress_percent(&achievement, 0), 100);
    }

    #[tokio::test]
    async fn test_progress_lookup() {
        let (storage, _, _) = setup().await;
        log_activity(&storage, today(), 18, SportType::Gym, 2, 0.0).await;

        assert_eq!(progress(&storage, "ana", "6").await.unwrap(), 66);
        assert!(matches!(
            progress(&storage, "ana", "42").await,
            Err(GameError::AchievementNotFound(_))
        ));
    }
}
