//! The gamification service.
//!
//! [`Gamification`] bundles the store, the rule registry, the session file
//! and the progress channel. It is cheap to clone and is handed to every
//! caller that needs it; there is no process-wide current user. Each
//! operation takes the user id it acts on and the time it runs at.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use tokio::sync::broadcast;
use tracing::info;

use crate::achievements;
use crate::activity;
use crate::challenges;
use crate::competition;
use crate::config::Config;
use crate::error::{GameError, Result};
use crate::model::{
    Activity, ActivityRequest, ActivitySummary, Challenge, Competition, Evaluation, NewAccount,
    Profile, ProfileUpdate, ProgressChange, RankingEntry, RecordOutcome, User,
};
use crate::progression::ProgressSender;
use crate::rules::RuleRegistry;
use crate::session::{self, SessionFile};
use crate::storage::Storage;

/// Capacity of the progress broadcast channel.
const PROGRESS_CHANNEL_CAPACITY: usize = 64;

#[derive(Clone)]
pub struct Gamification {
    storage: Storage,
    rules: Arc<RuleRegistry>,
    session_file: SessionFile,
    notifier: ProgressSender,
}

impl Gamification {
    pub fn new(storage: Storage, config: &Config) -> Self {
        let (notifier, _) = broadcast::channel(PROGRESS_CHANNEL_CAPACITY);
        Self {
            storage,
            rules: Arc::new(RuleRegistry::from_config(&config.rules)),
            session_file: SessionFile::new(config.session_file.clone()),
            notifier,
        }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Receive every progression change from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressChange> {
        self.notifier.subscribe()
    }

    /// Insert the predefined achievements, challenges and competitions.
    pub async fn seed(&self, today: NaiveDate) -> Result<()> {
        achievements::seed(&self.storage).await?;
        challenges::seed(&self.storage, today).await?;
        competition::seed(&self.storage).await?;
        info!("Reference data ready");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Accounts and session
    // ------------------------------------------------------------------

    pub async fn create_account(&self, account: &NewAccount) -> Result<User> {
        session::create_account(&self.storage, account).await
    }

    pub async fn login(&self, user_id: &str, password_hash: &str) -> Result<User> {
        session::login(&self.storage, &self.session_file, user_id, password_hash).await
    }

    pub async fn logout(&self) -> Result<()> {
        session::logout(&self.session_file).await
    }

    pub async fn restore_session(&self) -> Result<Option<User>> {
        session::restore(&self.storage, &self.session_file).await
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    pub async fn user(&self, user_id: &str) -> Result<User> {
        self.storage
            .get_user(user_id)
            .await?
            .ok_or_else(|| GameError::UserNotFound(user_id.to_string()))
    }

    /// Load everything the profile view shows, querying concurrently.
    pub async fn profile(&self, user_id: &str, today: NaiveDate) -> Result<Profile> {
        let (user, achievements, mut challenges, competitions, activities) = tokio::try_join!(
            self.user(user_id),
            self.storage.achievements_for_user(user_id),
            self.storage.challenges_for_user(user_id),
            self.storage.competitions_for_user(user_id),
            self.storage.list_activities(user_id),
        )?;

        challenges::refresh_states(&mut challenges, today);

        Ok(Profile {
            user,
            achievements,
            challenges,
            competitions,
            activities,
        })
    }

    /// Change display name and/or photo.
    pub async fn update_profile(&self, user_id: &str, update: &ProfileUpdate) -> Result<User> {
        let mut user = self.user(user_id).await?;

        if let Some(name) = &update.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(GameError::InvalidInput("name must not be empty".to_string()));
            }
            if self.storage.name_taken(name, user_id).await? {
                return Err(GameError::UserExists(name.to_string()));
            }
            user.name = name.to_string();
        }
        if let Some(photo) = &update.photo {
            user.photo = Some(photo.clone());
        }

        self.storage
            .update_profile(user_id, &user.name, user.photo.as_deref())
            .await?;
        info!(user_id, "Profile updated");
        Ok(user)
    }

    // ------------------------------------------------------------------
    // Activities and evaluation
    // ------------------------------------------------------------------

    pub async fn record_activity(
        &self,
        user_id: &str,
        request: &ActivityRequest,
        now: NaiveDateTime,
    ) -> Result<RecordOutcome> {
        activity::validate(request)?;
        let mut user = self.user(user_id).await?;
        activity::record(&self.storage, &self.rules, &self.notifier, &mut user, request, now).await
    }

    pub async fn activities(&self, user_id: &str) -> Result<Vec<Activity>> {
        self.user(user_id).await?;
        self.storage.list_activities(user_id).await
    }

    pub async fn activity_summary(&self, user_id: &str, today: NaiveDate) -> Result<ActivitySummary> {
        self.user(user_id).await?;
        let (latest, recent_sports, active_dates) = tokio::try_join!(
            self.storage.latest_activity(user_id),
            activity::recent_sports(&self.storage, user_id, today),
            self.storage.active_dates(user_id),
        )?;

        Ok(ActivitySummary {
            latest,
            recent_sports,
            active_dates: active_dates.into_iter().collect(),
        })
    }

    /// Run both evaluators without logging anything new.
    pub async fn evaluate(&self, user_id: &str, today: NaiveDate) -> Result<Evaluation> {
        let mut user = self.user(user_id).await?;
        activity::evaluate(&self.storage, &self.rules, &self.notifier, &mut user, today).await
    }

    pub async fn achievement_progress(&self, user_id: &str, achievement_id: &str) -> Result<i64> {
        self.user(user_id).await?;
        achievements::progress(&self.storage, user_id, achievement_id).await
    }

    // ------------------------------------------------------------------
    // Challenges
    // ------------------------------------------------------------------

    /// Enrol a user; `false` when already enrolled.
    pub async fn join_challenge(&self, challenge_id: &str, user_id: &str) -> Result<bool> {
        self.user(user_id).await?;
        challenges::join(&self.storage, challenge_id, user_id).await
    }

    pub async fn complete_challenge(
        &self,
        challenge_id: &str,
        user_id: &str,
        today: NaiveDate,
    ) -> Result<Challenge> {
        let mut user = self.user(user_id).await?;
        challenges::complete(&self.storage, &self.notifier, &mut user, challenge_id, today).await
    }

    // ------------------------------------------------------------------
    // Competitions
    // ------------------------------------------------------------------

    pub async fn schedule_competition(
        &self,
        competition_id: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Competition> {
        competition::schedule(&self.storage, competition_id, start_date, end_date).await
    }

    pub async fn begin_competition(&self, competition_id: &str, today: NaiveDate) -> Result<Competition> {
        competition::begin(&self.storage, competition_id, today).await
    }

    /// Close a running competition and return its podium.
    pub async fn close_competition(&self, competition_id: &str) -> Result<Vec<RankingEntry>> {
        competition::close(&self.storage, competition_id).await
    }

    pub async fn register(&self, competition_id: &str, user_id: &str, today: NaiveDate) -> Result<()> {
        competition::register(&self.storage, competition_id, user_id, today).await
    }

    pub async fn ranking(&self, competition_id: &str) -> Result<Vec<RankingEntry>> {
        self.require_competition(competition_id).await?;
        competition::rank(&self.storage, competition_id).await
    }

    pub async fn winner(&self, competition_id: &str) -> Result<Option<RankingEntry>> {
        self.require_competition(competition_id).await?;
        competition::winner(&self.storage, competition_id).await
    }

    pub async fn finish(&self, competition_id: &str) -> Result<u64> {
        competition::finish(&self.storage, competition_id).await
    }

    async fn require_competition(&self, competition_id: &str) -> Result<()> {
        match self.storage.get_competition(competition_id).await? {
            Some(_) => Ok(()),
            None => Err(GameError::CompetitionNotFound(competition_id.to_string())),
        }
    }
}
