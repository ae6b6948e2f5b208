//! Competition ledger.
//!
//! Participation and scores live only in the store: one participation row
//! and one score row per (competition, user). The ledger registers users,
//! accumulates score increments, ranks participants and closes the
//! competition for everyone.
//!
//! # Scoring
//!
//! A competition activity is worth `trunc(distance_km * 10) + duration_minutes`
//! points, so a 30 minute, 5 km run scores 80.

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::error::{GameError, Result};
use crate::model::{Competition, CompetitionState, RankingEntry, SportType};
use crate::storage::Storage;

/// Points for one competition activity.
pub fn points_for(duration_minutes: i64, distance_km: f64) -> i64 {
    (distance_km * 10.0).trunc() as i64 + duration_minutes
}

/// The competitions created on first start.
pub fn defaults() -> Vec<Competition> {
    vec![
        Competition::new("C001", "School marathon", SportType::Run),
        Competition::new("C002", "Swimming league", SportType::Swim),
    ]
}

/// Insert the default competitions if the table is empty.
pub async fn seed(storage: &Storage) -> Result<()> {
    if storage.count_competitions().await? > 0 {
        return Ok(());
    }
    for competition in defaults() {
        storage.insert_competition(&competition).await?;
    }
    info!("Seeded default competitions");
    Ok(())
}

/// Register a user into a competition with a zero score.
///
/// Rejected when the competition is closed, the user is already competing
/// or the user's participation has finished.
pub async fn register(
    storage: &Storage,
    competition_id: &str,
    user_id: &str,
    today: NaiveDate,
) -> Result<()> {
    let competition = load(storage, competition_id).await?;
    if competition.state == CompetitionState::Finished {
        warn!(competition_id, user_id, "Registration into closed competition rejected");
        return Err(GameError::CompetitionFinished(competition_id.to_string()));
    }
    if storage.get_user(user_id).await?.is_none() {
        return Err(GameError::UserNotFound(user_id.to_string()));
    }

    match storage.participation_state(competition_id, user_id).await? {
        Some(CompetitionState::InProgress) => {
            warn!(competition_id, user_id, "Duplicate registration rejected");
            return Err(GameError::AlreadyRegistered(competition_id.to_string()));
        }
        Some(CompetitionState::Finished) => {
            warn!(competition_id, user_id, "Registration into finished competition rejected");
            return Err(GameError::CompetitionFinished(competition_id.to_string()));
        }
        Some(CompetitionState::Registration) | None => {}
    }

    storage
        .insert_participation(competition_id, user_id, today)
        .await?;

    info!(competition_id, user_id, "Registered into competition");
    Ok(())
}

/// Add `points` to the user's score. No state check is made here; callers
/// only route activities into in-progress participations.
pub async fn add_score(
    storage: &Storage,
    competition_id: &str,
    user_id: &str,
    points: i64,
) -> Result<()> {
    let updated = storage.add_score(competition_id, user_id, points).await?;
    if updated == 0 {
        warn!(competition_id, user_id, "No score row to update");
    } else {
        info!(competition_id, user_id, points, "Score added");
    }
    Ok(())
}

/// Participants by descending score. Ties keep store order.
pub async fn rank(storage: &Storage, competition_id: &str) -> Result<Vec<RankingEntry>> {
    let mut entries = storage.scores(competition_id).await?;
    entries.sort_by(|a, b| b.score.cmp(&a.score));
    Ok(entries)
}

/// The top-scoring participant, if anyone registered.
pub async fn winner(storage: &Storage, competition_id: &str) -> Result<Option<RankingEntry>> {
    Ok(rank(storage, competition_id).await?.into_iter().next())
}

/// Finish every participation in the competition. Scores and the
/// competition's own state are left untouched. Returns the number of
/// participations closed.
pub async fn finish(storage: &Storage, competition_id: &str) -> Result<u64> {
    load(storage, competition_id).await?;

    let closed = storage.finish_participations(competition_id).await?;
    info!(competition_id, closed, "Competition finished");
    Ok(closed)
}

/// Set the dates of a competition that is still open for registration.
pub async fn schedule(
    storage: &Storage,
    competition_id: &str,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Result<Competition> {
    if end_date < start_date {
        return Err(GameError::InvalidInput(
            "end date must not be before start date".to_string(),
        ));
    }

    let mut competition = load(storage, competition_id).await?;
    if competition.state != CompetitionState::Registration {
        return Err(state_conflict(&competition));
    }

    competition.start_date = Some(start_date);
    competition.end_date = Some(end_date);
    storage.update_competition(&competition).await?;

    info!(competition_id, %start_date, %end_date, "Competition scheduled");
    Ok(competition)
}

/// Start a competition on its start date.
pub async fn begin(storage: &Storage, competition_id: &str, today: NaiveDate) -> Result<Competition> {
    let mut competition = load(storage, competition_id).await?;
    if !competition.begin(today) {
        warn!(competition_id, state = ?competition.state, "Competition cannot start today");
        return Err(state_conflict(&competition));
    }

    storage.update_competition(&competition).await?;
    info!(competition_id, "Competition started");
    Ok(competition)
}

/// Close a running competition, finish every participation in it and
/// return the podium (top three of the ranking).
pub async fn close(storage: &Storage, competition_id: &str) -> Result<Vec<RankingEntry>> {
    let mut competition = load(storage, competition_id).await?;
    let ranking = rank(storage, competition_id).await?;

    let Some(podium) = competition.close(&ranking) else {
        warn!(competition_id, state = ?competition.state, "Competition is not running");
        return Err(state_conflict(&competition));
    };

    storage.update_competition(&competition).await?;
    let closed = storage.finish_participations(competition_id).await?;
    info!(competition_id, closed, podium = podium.len(), "Competition closed");
    Ok(podium)
}

async fn load(storage: &Storage, competition_id: &str) -> Result<Competition> {
    storage
        .get_competition(competition_id)
        .await?
        .ok_or_else(|| GameError::CompetitionNotFound(competition_id.to_string()))
}

fn state_conflict(competition: &Competition) -> GameError {
    GameError::CompetitionStateConflict {
        competition_id: competition.id.clone(),
        state: competition.state,
    }
}
