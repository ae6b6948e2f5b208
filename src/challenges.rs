//! Default challenges and the challenge evaluator.
//!
//! Rule evaluation ignores the challenge's own lifecycle state; the
//! date-driven transition lives on [`Challenge::refresh_state`] and is
//! applied separately.

use chrono::{Days, NaiveDate};
use tracing::{info, warn};

use crate::error::{GameError, Result};
use crate::model::{Challenge, ChallengeState, User};
use crate::progression::{self, ProgressSender};
use crate::rules::{ActivityLog, RuleRegistry};
use crate::storage::Storage;

const DEFAULT_CHALLENGE_DAYS: u64 = 7;

/// The two challenges created on first start, running from `today` for a
/// week.
pub fn defaults(today: NaiveDate) -> Vec<Challenge> {
    let end = today
        .checked_add_days(Days::new(DEFAULT_CHALLENGE_DAYS))
        .unwrap_or(today);

    let mut distance = Challenge::new(
        "D001",
        "Distance challenge",
        "Cover 5 km in total.",
        200,
        today,
        end,
    );
    let mut steady = Challenge::new(
        "D002",
        "Steady training",
        "Work out on 3 consecutive days.",
        300,
        today,
        end,
    );
    distance.state = ChallengeState::Active;
    steady.state = ChallengeState::Active;

    vec![distance, steady]
}

/// Insert the default challenges if the table is empty.
pub async fn seed(storage: &Storage, today: NaiveDate) -> Result<()> {
    if storage.count_challenges().await? > 0 {
        return Ok(());
    }
    for challenge in defaults(today) {
        storage.insert_challenge(&challenge).await?;
    }
    info!("Seeded default challenges");
    Ok(())
}

/// Complete every challenge the user has not completed yet whose rule
/// holds on `today`. Returns the completed ids.
pub async fn evaluate(
    storage: &Storage,
    registry: &RuleRegistry,
    notifier: &ProgressSender,
    user: &mut User,
    today: NaiveDate,
) -> Result<Vec<String>> {
    let pending = storage.pending_challenges(&user.id).await?;
    if pending.is_empty() {
        return Ok(Vec::new());
    }

    let log = ActivityLog::new(today, storage.list_activities(&user.id).await?);
    let mut completed = Vec::new();

    for challenge in pending {
        let met = registry
            .challenge(&challenge.id)
            .is_some_and(|rule| rule.is_met(&log));
        if !met {
            continue;
        }

        storage
            .upsert_challenge_completion(&user.id, &challenge.id, today)
            .await?;
        progression::award_points(storage, notifier, user, challenge.reward_points).await?;

        info!(
            user_id = %user.id,
            challenge_id = %challenge.id,
            reward = challenge.reward_points,
            "Challenge completed"
        );
        completed.push(challenge.id);
    }

    Ok(completed)
}

/// Apply the date-driven transition to every challenge.
pub fn refresh_states(challenges: &mut [Challenge], today: NaiveDate) {
    for challenge in challenges.iter_mut() {
        challenge.refresh_state(today);
    }
}

/// Enrol a user in a challenge. Joining twice is a no-op that returns
/// `false`.
pub async fn join(storage: &Storage, challenge_id: &str, user_id: &str) -> Result<bool> {
    if storage.challenge_for_user(challenge_id, user_id).await?.is_none() {
        return Err(GameError::ChallengeNotFound(challenge_id.to_string()));
    }

    let joined = storage.join_challenge(challenge_id, user_id).await?;
    if joined {
        info!(challenge_id, user_id, "Joined challenge");
    }
    Ok(joined)
}

/// Complete a challenge the user joined, as of `today`.
///
/// The challenge must be active on `today` and not yet completed by this
/// user.
pub async fn complete(
    storage: &Storage,
    notifier: &ProgressSender,
    user: &mut User,
    challenge_id: &str,
    today: NaiveDate,
) -> Result<Challenge> {
    let mut challenge = storage
        .challenge_for_user(challenge_id, &user.id)
        .await?
        .ok_or_else(|| GameError::ChallengeNotFound(challenge_id.to_string()))?;
    challenge.refresh_state(today);

    if !complete_enrolled(storage, notifier, user, &mut challenge, today).await? {
        return Err(GameError::ChallengeNotCompletable(challenge_id.to_string()));
    }
    Ok(challenge)
}

/// Complete an enrolled, active challenge outside rule evaluation and
/// award its reward.
///
/// Returns `false` (and changes nothing) when the challenge is not active
/// or the user never joined it.
pub async fn complete_enrolled(
    storage: &Storage,
    notifier: &ProgressSender,
    user: &mut User,
    challenge: &mut Challenge,
    today: NaiveDate,
) -> Result<bool> {
    if !challenge.complete(&user.id) {
        warn!(
            user_id = %user.id,
            challenge_id = %challenge.id,
            state = ?challenge.state,
            "Challenge cannot be completed"
        );
        return Ok(false);
    }

    storage
        .upsert_challenge_completion(&user.id, &challenge.id, today)
        .await?;
    progression::award_points(storage, notifier, user, challenge.reward_points).await?;

    Ok(true)
}
