//! Data models for Podium.
//!
//! The domain types mirror the rows of the relational store: users,
//! activities, achievements, challenges and competitions. Enumerations carry
//! two spellings: the serde name used by the HTTP API and the code stored in
//! the database (`as_db_str` / `from_db_str`), which predates this crate and
//! is kept as-is.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// Experience needed to climb one level.
pub const EXPERIENCE_PER_LEVEL: i64 = 1000;

/// Objective used by every achievement unless a rule overrides it.
pub const DEFAULT_OBJECTIVE: i64 = 3;

/// Level for a given amount of experience: `floor(experience / 1000) + 1`.
pub fn level_for_experience(experience: i64) -> i64 {
    experience.max(0) / EXPERIENCE_PER_LEVEL + 1
}

/// A registered user and their progression totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    /// Derived from `experience`; never decremented.
    pub level: i64,
    pub total_points: i64,
    pub experience: i64,
    pub is_admin: bool,
    /// Profile photo as stored (raw image bytes). Not part of API payloads.
    #[serde(skip)]
    pub photo: Option<Vec<u8>>,
}

impl User {
    /// A fresh user at level 1 with no points.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            level: 1,
            total_points: 0,
            experience: 0,
            is_admin: false,
            photo: None,
        }
    }
}

/// Sports a user can log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SportType {
    Run,
    Swim,
    Cycle,
    Soccer,
    Basketball,
    Volleyball,
    Gym,
}

impl SportType {
    pub const ALL: [SportType; 7] = [
        SportType::Run,
        SportType::Swim,
        SportType::Cycle,
        SportType::Soccer,
        SportType::Basketball,
        SportType::Volleyball,
        SportType::Gym,
    ];

    /// Code stored in the `tipo` / `tipoDeporte` columns.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            SportType::Run => "CORRER",
            SportType::Swim => "NATACION",
            SportType::Cycle => "CICLISMO",
            SportType::Soccer => "FUTBOL",
            SportType::Basketball => "BALONCESTO",
            SportType::Volleyball => "VOLLEYBALL",
            SportType::Gym => "GIMNASIO",
        }
    }

    pub fn from_db_str(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_db_str() == code)
    }

    /// Calories burned for a session of this sport.
    ///
    /// - `Run`: 10 per minute + 50 per km
    /// - `Swim`: 12 per minute + 60 per km
    /// - `Cycle`: 8 per minute + 40 per km
    /// - anything else: 6 per minute, distance ignored
    ///
    /// The fractional part is truncated.
    pub fn calories(&self, duration_minutes: i64, distance_km: f64) -> i64 {
        let minutes = duration_minutes as f64;
        let total = match self {
            SportType::Run => minutes * 10.0 + distance_km * 50.0,
            SportType::Swim => minutes * 12.0 + distance_km * 60.0,
            SportType::Cycle => minutes * 8.0 + distance_km * 40.0,
            _ => return duration_minutes * 6,
        };
        total as i64
    }
}

impl std::fmt::Display for SportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_db_str())
    }
}

/// A logged workout.
///
/// Calories are computed once in [`Activity::new`] and never recomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    /// Store-assigned identifier; `None` until persisted.
    pub id: Option<i64>,
    pub user_id: String,
    pub sport: SportType,
    pub duration_minutes: i64,
    pub distance_km: f64,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub calories_burned: i64,
    pub is_competition: bool,
}

impl Activity {
    pub fn new(
        user_id: impl Into<String>,
        sport: SportType,
        duration_minutes: i64,
        distance_km: f64,
        is_competition: bool,
        at: NaiveDateTime,
    ) -> Self {
        Self {
            id: None,
            user_id: user_id.into(),
            sport,
            duration_minutes,
            distance_km,
            date: at.date(),
            time: at.time(),
            calories_burned: sport.calories(duration_minutes, distance_km),
            is_competition,
        }
    }
}

/// How often an achievement is meant to be pursued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AchievementCategory {
    Daily,
    Weekly,
    Monthly,
}

impl AchievementCategory {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            AchievementCategory::Daily => "DIARIO",
            AchievementCategory::Weekly => "SEMANAL",
            AchievementCategory::Monthly => "MENSUAL",
        }
    }

    pub fn from_db_str(code: &str) -> Option<Self> {
        match code {
            "DIARIO" => Some(AchievementCategory::Daily),
            "SEMANAL" => Some(AchievementCategory::Weekly),
            "MENSUAL" => Some(AchievementCategory::Monthly),
            _ => None,
        }
    }
}

/// A one-time, rule-gated award of points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Achievement {
    pub id: String,
    pub name: String,
    pub description: String,
    pub reward_points: i64,
    pub category: AchievementCategory,
    pub objective: i64,
    pub completed: bool,
    pub completed_on: Option<NaiveDate>,
    pub completed_by: Option<String>,
}

impl Achievement {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        reward_points: i64,
        category: AchievementCategory,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            reward_points,
            category,
            objective: DEFAULT_OBJECTIVE,
            completed: false,
            completed_on: None,
            completed_by: None,
        }
    }

    /// Mark the achievement as completed by `user_id` on `today`.
    ///
    /// Returns `false` if it was already completed.
    pub fn complete(&mut self, user_id: &str, today: NaiveDate) -> bool {
        if self.completed {
            return false;
        }
        self.completed = true;
        self.completed_on = Some(today);
        self.completed_by = Some(user_id.to_string());
        true
    }
}

/// Lifecycle of a challenge. Driven by dates, except `Completed` which
/// sticks once set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChallengeState {
    Pending,
    Active,
    Completed,
    Expired,
}

impl ChallengeState {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            ChallengeState::Pending => "PENDIENTE",
            ChallengeState::Active => "ACTIVO",
            ChallengeState::Completed => "COMPLETADO",
            ChallengeState::Expired => "EXPIRADO",
        }
    }

    pub fn from_db_str(code: &str) -> Option<Self> {
        match code {
            "PENDIENTE" => Some(ChallengeState::Pending),
            "ACTIVO" => Some(ChallengeState::Active),
            "COMPLETADO" => Some(ChallengeState::Completed),
            "EXPIRADO" => Some(ChallengeState::Expired),
            _ => None,
        }
    }

    /// State for `today` given the challenge window.
    ///
    /// - before `start` -> `Pending`
    /// - after `end` -> `Expired`
    /// - otherwise `Active`, unless the current state is `Completed`
    pub fn transition(self, start: NaiveDate, end: NaiveDate, today: NaiveDate) -> Self {
        if today < start {
            ChallengeState::Pending
        } else if today > end {
            ChallengeState::Expired
        } else if self == ChallengeState::Completed {
            ChallengeState::Completed
        } else {
            ChallengeState::Active
        }
    }
}

/// A time-boxed, rule-gated award of points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Challenge {
    pub id: String,
    pub name: String,
    pub description: String,
    pub reward_points: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub state: ChallengeState,
    /// Users who joined this challenge.
    pub participants: Vec<String>,
}

impl Challenge {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        reward_points: i64,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            reward_points,
            start_date,
            end_date,
            state: ChallengeState::Pending,
            participants: Vec::new(),
        }
    }

    /// Apply the date-driven state transition for `today`.
    pub fn refresh_state(&mut self, today: NaiveDate) -> ChallengeState {
        self.state = self.state.transition(self.start_date, self.end_date, today);
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == ChallengeState::Active
    }

    /// Enrol a user. Returns `false` if already enrolled.
    pub fn join(&mut self, user_id: &str) -> bool {
        if self.participants.iter().any(|p| p == user_id) {
            return false;
        }
        self.participants.push(user_id.to_string());
        true
    }

    /// Move an active challenge to `Completed` for an enrolled user.
    ///
    /// Returns `true` when the transition happened; the caller is
    /// responsible for awarding the reward.
    pub fn complete(&mut self, user_id: &str) -> bool {
        if !self.is_active() || !self.participants.iter().any(|p| p == user_id) {
            return false;
        }
        self.state = ChallengeState::Completed;
        true
    }
}

/// State of a competition, also used for a user's participation in one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompetitionState {
    Registration,
    InProgress,
    Finished,
}

impl CompetitionState {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            CompetitionState::Registration => "REGISTRO",
            CompetitionState::InProgress => "EN_PROGRESO",
            CompetitionState::Finished => "FINALIZADA",
        }
    }

    pub fn from_db_str(code: &str) -> Option<Self> {
        match code {
            "REGISTRO" => Some(CompetitionState::Registration),
            "EN_PROGRESO" => Some(CompetitionState::InProgress),
            "FINALIZADA" => Some(CompetitionState::Finished),
            _ => None,
        }
    }
}

/// A scored, multi-user contest over one sport.
///
/// Participants and scores live only in the store (see `competition`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Competition {
    pub id: String,
    pub name: String,
    pub sport: SportType,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub state: CompetitionState,
}

impl Competition {
    pub fn new(id: impl Into<String>, name: impl Into<String>, sport: SportType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            sport,
            start_date: None,
            end_date: None,
            state: CompetitionState::Registration,
        }
    }

    /// Start the competition if it is open for registration and `today` is
    /// its start date.
    pub fn begin(&mut self, today: NaiveDate) -> bool {
        if self.state == CompetitionState::Registration && self.start_date == Some(today) {
            self.state = CompetitionState::InProgress;
            return true;
        }
        false
    }

    /// Close a running competition and return its top three from `ranking`.
    ///
    /// Returns `None` if the competition was not in progress.
    pub fn close(&mut self, ranking: &[RankingEntry]) -> Option<Vec<RankingEntry>> {
        if self.state != CompetitionState::InProgress {
            return None;
        }
        self.state = CompetitionState::Finished;
        Some(ranking.iter().take(3).cloned().collect())
    }
}

/// One row of a competition ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingEntry {
    pub user_id: String,
    pub name: String,
    pub score: i64,
}

/// Broadcast after every progression mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressChange {
    pub user_id: String,
    pub total_points: i64,
    pub experience: i64,
    pub level: i64,
}

impl From<&User> for ProgressChange {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id.clone(),
            total_points: user.total_points,
            experience: user.experience,
            level: user.level,
        }
    }
}

/// Everything the profile view shows for one user.
#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    pub user: User,
    pub achievements: Vec<Achievement>,
    pub challenges: Vec<Challenge>,
    pub competitions: Vec<Competition>,
    pub activities: Vec<Activity>,
}

/// Short view over a user's recent training.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivitySummary {
    pub latest: Option<Activity>,
    /// Distinct sports over the last week.
    pub recent_sports: Vec<SportType>,
    /// Every date with at least one activity, oldest first.
    pub active_dates: Vec<NaiveDate>,
}

// ============================================================================
// API request/response bodies
// ============================================================================

/// Request body for `POST /users`.
#[derive(Debug, Clone, Deserialize)]
pub struct NewAccount {
    pub id: String,
    pub name: String,
    /// Already-hashed password; hashing happens outside this crate.
    pub password_hash: String,
}

/// Request body for `POST /login`.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub id: String,
    pub password_hash: String,
}

/// Request body for `PATCH /users/:id`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub photo: Option<Vec<u8>>,
}

/// Request body for `POST /users/:id/activities`.
#[derive(Debug, Clone, Deserialize)]
pub struct ActivityRequest {
    pub sport: SportType,
    pub duration_minutes: i64,
    #[serde(default)]
    pub distance_km: f64,
    #[serde(default)]
    pub is_competition: bool,
}

/// Request body for `POST /competitions/:cid/register` and the challenge
/// join/complete routes.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationRequest {
    pub user_id: String,
}

/// Request body for `PUT /competitions/:cid/schedule`.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleRequest {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// Ids completed by one evaluation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Evaluation {
    pub achievements: Vec<String>,
    pub challenges: Vec<String>,
}

/// Result of logging a workout.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordOutcome {
    /// Stored as a plain activity; evaluators ran afterwards.
    Recorded {
        activity: Activity,
        evaluation: Evaluation,
    },
    /// Routed into a competition ledger instead of being stored.
    Competition {
        competition_id: String,
        points: i64,
        calories_burned: i64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_calories_per_sport() {
        assert_eq!(SportType::Run.calories(30, 5.0), 550);
        assert_eq!(SportType::Swim.calories(20, 1.0), 300);
        assert_eq!(SportType::Cycle.calories(60, 20.0), 1280);
        assert_eq!(SportType::Gym.calories(45, 0.0), 270);
        // Distance is ignored for sports without a distance term
        assert_eq!(SportType::Soccer.calories(90, 10.0), 540);
        assert_eq!(SportType::Volleyball.calories(0, 0.0), 0);
    }

    #[test]
    fn test_calories_truncate_fraction() {
        // 10*1 + 50*0.33 = 26.5
        assert_eq!(SportType::Run.calories(1, 0.33), 26);
    }

    #[test]
    fn test_sport_db_codes_roundtrip() {
        for sport in SportType::ALL {
            assert_eq!(SportType::from_db_str(sport.as_db_str()), Some(sport));
        }
        assert_eq!(SportType::from_db_str("RUN"), None);
    }

    #[test]
    fn test_level_formula() {
        assert_eq!(level_for_experience(0), 1);
        assert_eq!(level_for_experience(999), 1);
        assert_eq!(level_for_experience(1000), 2);
        assert_eq!(level_for_experience(2500), 3);
    }

    #[test]
    fn test_activity_new_computes_calories() {
        let at = day(2026, 3, 1).and_hms_opt(7, 30, 0).unwrap();
        let activity = Activity::new("ana", SportType::Run, 30, 5.0, false, at);
        assert_eq!(activity.calories_burned, 550);
        assert_eq!(activity.date, day(2026, 3, 1));
        assert!(activity.id.is_none());
    }

    #[test]
    fn test_achievement_complete_once() {
        let mut achievement =
            Achievement::new("1", "First", "desc", 50, AchievementCategory::Daily);
        assert_eq!(achievement.objective, DEFAULT_OBJECTIVE);
        assert!(achievement.complete("ana", day(2026, 3, 1)));
        assert!(!achievement.complete("ben", day(2026, 3, 2)));
        assert_eq!(achievement.completed_by.as_deref(), Some("ana"));
        assert_eq!(achievement.completed_on, Some(day(2026, 3, 1)));
    }

    #[test]
    fn test_challenge_state_transition() {
        let start = day(2026, 3, 10);
        let end = day(2026, 3, 17);
        let s = ChallengeState::Pending;

        assert_eq!(s.transition(start, end, day(2026, 3, 9)), ChallengeState::Pending);
        assert_eq!(s.transition(start, end, day(2026, 3, 10)), ChallengeState::Active);
        assert_eq!(s.transition(start, end, day(2026, 3, 17)), ChallengeState::Active);
        assert_eq!(s.transition(start, end, day(2026, 3, 18)), ChallengeState::Expired);
    }

    #[test]
    fn test_challenge_completed_is_sticky_inside_window() {
        let start = day(2026, 3, 10);
        let end = day(2026, 3, 17);
        let done = ChallengeState::Completed;

        assert_eq!(done.transition(start, end, day(2026, 3, 12)), ChallengeState::Completed);
        // Date comparisons still win outside the window
        assert_eq!(done.transition(start, end, day(2026, 3, 20)), ChallengeState::Expired);
    }

    #[test]
    fn test_challenge_join_and_complete() {
        let mut challenge = Challenge::new("D001", "Distance", "", 200, day(2026, 3, 1), day(2026, 3, 8));
        assert!(!challenge.complete("ana")); // still pending

        challenge.refresh_state(day(2026, 3, 2));
        assert!(!challenge.complete("ana")); // not enrolled

        assert!(challenge.join("ana"));
        assert!(!challenge.join("ana"));
        assert!(challenge.complete("ana"));
        assert_eq!(challenge.state, ChallengeState::Completed);
    }

    #[test]
    fn test_competition_begin_and_close() {
        let mut competition = Competition::new("C001", "Marathon", SportType::Run);
        competition.start_date = Some(day(2026, 4, 1));

        assert!(!competition.begin(day(2026, 3, 31)));
        assert!(competition.close(&[]).is_none());
        assert!(competition.begin(day(2026, 4, 1)));

        let ranking: Vec<RankingEntry> = (0..5)
            .map(|i| RankingEntry {
                user_id: format!("u{i}"),
                name: format!("User {i}"),
                score: 100 - i,
            })
            .collect();
        let podium = competition.close(&ranking).unwrap();
        assert_eq!(podium.len(), 3);
        assert_eq!(podium[0].user_id, "u0");
        assert_eq!(competition.state, CompetitionState::Finished);
    }

    #[test]
    fn test_competition_state_db_codes() {
        assert_eq!(CompetitionState::InProgress.as_db_str(), "EN_PROGRESO");
        assert_eq!(
            CompetitionState::from_db_str("FINALIZADA"),
            Some(CompetitionState::Finished)
        );
        assert_eq!(CompetitionState::from_db_str("DONE"), None);
    }
}
