//! Activity recorder.
//!
//! A plain workout is stored and then both evaluators run for its owner in
//! the same call. A competition workout is not stored: its points go to the
//! user's in-progress competition for that sport, and the call is rejected
//! when no such competition exists.

use chrono::{Days, NaiveDate, NaiveDateTime};
use tracing::{info, warn};

use crate::achievements;
use crate::challenges;
use crate::competition;
use crate::error::{GameError, Result};
use crate::model::{Activity, ActivityRequest, Evaluation, RecordOutcome, SportType, User};
use crate::progression::ProgressSender;
use crate::rules::RuleRegistry;
use crate::storage::Storage;

/// Look-back for the "recent sports" query.
const RECENT_SPORTS_DAYS: u64 = 7;

/// Longest single workout accepted: one day.
pub const MAX_DURATION_MINUTES: i64 = 24 * 60;

/// Longest single distance accepted.
pub const MAX_DISTANCE_KM: f64 = 1_000.0;

/// Reject out-of-range or non-finite measurements before touching the
/// store. The bounds keep calorie and score arithmetic far from `i64`
/// overflow.
pub fn validate(request: &ActivityRequest) -> Result<()> {
    if !(0..=MAX_DURATION_MINUTES).contains(&request.duration_minutes) {
        return Err(GameError::InvalidInput(format!(
            "duration must be between 0 and {MAX_DURATION_MINUTES} minutes"
        )));
    }
    if !request.distance_km.is_finite() || !(0.0..=MAX_DISTANCE_KM).contains(&request.distance_km) {
        return Err(GameError::InvalidInput(format!(
            "distance must be between 0 and {MAX_DISTANCE_KM} km"
        )));
    }
    Ok(())
}

/// Record a workout for `user` at `now`.
pub async fn record(
    storage: &Storage,
    registry: &RuleRegistry,
    notifier: &ProgressSender,
    user: &mut User,
    request: &ActivityRequest,
    now: NaiveDateTime,
) -> Result<RecordOutcome> {
    validate(request)?;

    let mut activity = Activity::new(
        user.id.clone(),
        request.sport,
        request.duration_minutes,
        request.distance_km,
        request.is_competition,
        now,
    );

    if activity.is_competition {
        return record_in_competition(storage, user, &activity).await;
    }

    activity.id = Some(storage.insert_activity(&activity).await?);
    info!(
        user_id = %user.id,
        sport = %activity.sport,
        calories = activity.calories_burned,
        "Activity recorded"
    );

    let evaluation = evaluate(storage, registry, notifier, user, now.date()).await?;

    Ok(RecordOutcome::Recorded {
        activity,
        evaluation,
    })
}

async fn record_in_competition(
    storage: &Storage,
    user: &User,
    activity: &Activity,
) -> Result<RecordOutcome> {
    let Some(competition_id) = storage
        .active_competition_for(&user.id, activity.sport)
        .await?
    else {
        warn!(user_id = %user.id, sport = %activity.sport, "No active competition for activity");
        return Err(GameError::NoActiveCompetition {
            user_id: user.id.clone(),
            sport: activity.sport.to_string(),
        });
    };

    let points = competition::points_for(activity.duration_minutes, activity.distance_km);
    competition::add_score(storage, &competition_id, &user.id, points).await?;

    Ok(RecordOutcome::Competition {
        competition_id,
        points,
        calories_burned: activity.calories_burned,
    })
}

/// Run the achievement evaluator, then the challenge evaluator.
pub async fn evaluate(
    storage: &Storage,
    registry: &RuleRegistry,
    notifier: &ProgressSender,
    user: &mut User,
    today: NaiveDate,
) -> Result<Evaluation> {
    let achievements = achievements::evaluate(storage, registry, notifier, user, today).await?;
    let challenges = challenges::evaluate(storage, registry, notifier, user, today).await?;

    Ok(Evaluation {
        achievements,
        challenges,
    })
}

/// Distinct sports the user practised during the last week.
pub async fn recent_sports(
    storage: &Storage,
    user_id: &str,
    today: NaiveDate,
) -> Result<Vec<SportType>> {
    let since = today
        .checked_sub_days(Days::new(RECENT_SPORTS_DAYS))
        .unwrap_or(NaiveDate::MIN);
    storage.sports_since(user_id, since).await
}
