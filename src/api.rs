//! HTTP API handlers for Podium.
//!
//! Each request runs as its own task and acts on the user or competition
//! named in its path. Failures come back as JSON bodies built from
//! [`GameError`](crate::error::GameError); a failed request leaves the
//! store as it was and can be retried.
//!
//! | method + path                              | action                      |
//! |--------------------------------------------|-----------------------------|
//! | `GET /health`                              | liveness                    |
//! | `POST /users`                              | create an account           |
//! | `POST /login`, `POST /logout`              | session file                |
//! | `GET /users/:id`, `PATCH /users/:id`       | profile load / edit         |
//! | `POST /users/:id/activities`               | log a workout               |
//! | `GET /users/:id/activities[/summary]`      | activity queries            |
//! | `POST /users/:id/evaluate`                 | re-run both evaluators      |
//! | `GET /users/:id/achievements/:aid/progress`| achievement progress        |
//! | `POST /challenges/:cid/join`, `/complete`  | challenge enrolment         |
//! | `POST /competitions/:cid/register`         | join a competition          |
//! | `GET /competitions/:cid/ranking`, `/winner`| standings                   |
//! | `POST /competitions/:cid/finish`           | close every participation   |
//! | `PUT /competitions/:cid/schedule`          | set start and end dates     |
//! | `POST /competitions/:cid/begin`, `/close`  | competition lifecycle       |
//!
//! Request bodies go through [`AppJson`], so a malformed body is reported
//! like any other input error.

use axum::{
    Json, Router,
    extract::{FromRequest, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};
use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

use crate::engine::Gamification;
use crate::error::{GameError, Result};
use crate::model::{
    Activity, ActivityRequest, ActivitySummary, Challenge, Competition, Evaluation, LoginRequest,
    NewAccount, Profile, ProfileUpdate, RankingEntry, RecordOutcome, RegistrationRequest,
    ScheduleRequest, User,
};

/// JSON body extractor that rejects with [`GameError::InvalidInput`].
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(GameError))]
pub struct AppJson<T>(pub T);

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Gamification,
}

/// Build the router with every route and request tracing.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/users", post(create_user))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/users/:id", get(get_profile).patch(update_profile))
        .route(
            "/users/:id/activities",
            post(record_activity).get(list_activities),
        )
        .route("/users/:id/activities/summary", get(activity_summary))
        .route("/users/:id/evaluate", post(evaluate))
        .route(
            "/users/:id/achievements/:aid/progress",
            get(achievement_progress),
        )
        .route("/challenges/:cid/join", post(join_challenge))
        .route("/challenges/:cid/complete", post(complete_challenge))
        .route("/competitions/:cid/register", post(register))
        .route("/competitions/:cid/ranking", get(ranking))
        .route("/competitions/:cid/winner", get(winner))
        .route("/competitions/:cid/finish", post(finish))
        .route("/competitions/:cid/schedule", put(schedule_competition))
        .route("/competitions/:cid/begin", post(begin_competition))
        .route("/competitions/:cid/close", post(close_competition))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// GET /health - Simple health check endpoint.
pub async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

/// POST /users - Create an account.
///
/// ```json
/// { "id": "ana", "name": "Ana", "password_hash": "..." }
/// ```
///
/// Returns `201 Created` with the new user, `409` if the id or name is
/// taken.
#[instrument(skip(state, account))]
pub async fn create_user(
    State(state): State<AppState>,
    AppJson(account): AppJson<NewAccount>,
) -> Result<(StatusCode, Json<User>)> {
    let user = state.engine.create_account(&account).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// POST /login - Check credentials and write the session file.
#[instrument(skip(state, request))]
pub async fn login(
    State(state): State<AppState>,
    AppJson(request): AppJson<LoginRequest>,
) -> Result<Json<User>> {
    let user = state.engine.login(&request.id, &request.password_hash).await?;
    Ok(Json(user))
}

/// POST /logout - Remove the session file.
#[instrument(skip(state))]
pub async fn logout(State(state): State<AppState>) -> Result<StatusCode> {
    state.engine.logout().await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /users/:id - User, achievements, challenges, competitions and
/// activities in one response.
#[instrument(skip(state))]
pub async fn get_profile(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Profile>> {
    let profile = state.engine.profile(&user_id, now().date()).await?;
    Ok(Json(profile))
}

/// PATCH /users/:id - Change display name and/or photo.
#[instrument(skip(state, update))]
pub async fn update_profile(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    AppJson(update): AppJson<ProfileUpdate>,
) -> Result<Json<User>> {
    let user = state.engine.update_profile(&user_id, &update).await?;
    Ok(Json(user))
}

/// POST /users/:id/activities - Log a workout.
///
/// ```json
/// { "sport": "RUN", "duration_minutes": 30, "distance_km": 5.0, "is_competition": false }
/// ```
///
/// A plain workout answers `201` with `kind: "recorded"`, the stored
/// activity and the achievements/challenges it unlocked. A competition
/// workout answers `201` with `kind: "competition"` and the points added,
/// or `404` when the user has no running competition for that sport.
#[instrument(skip(state))]
pub async fn record_activity(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    AppJson(request): AppJson<ActivityRequest>,
) -> Result<(StatusCode, Json<RecordOutcome>)> {
    let outcome = state.engine.record_activity(&user_id, &request, now()).await?;

    if let RecordOutcome::Competition {
        competition_id,
        points,
        ..
    } = &outcome
    {
        info!(user_id = %user_id, competition_id = %competition_id, points, "Competition activity recorded");
    }

    Ok((StatusCode::CREATED, Json(outcome)))
}

/// GET /users/:id/activities - Every logged workout, oldest first.
#[instrument(skip(state))]
pub async fn list_activities(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<Activity>>> {
    Ok(Json(state.engine.activities(&user_id).await?))
}

/// GET /users/:id/activities/summary
#[instrument(skip(state))]
pub async fn activity_summary(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<ActivitySummary>> {
    Ok(Json(
        state.engine.activity_summary(&user_id, now().date()).await?,
    ))
}

/// POST /users/:id/evaluate - Re-run both evaluators.
#[instrument(skip(state))]
pub async fn evaluate(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Evaluation>> {
    let evaluation = state.engine.evaluate(&user_id, now().date()).await?;
    info!(
        user_id = %user_id,
        achievements = evaluation.achievements.len(),
        challenges = evaluation.challenges.len(),
        "Evaluation requested"
    );
    Ok(Json(evaluation))
}

#[derive(Debug, Serialize)]
pub struct ProgressResponse {
    pub achievement_id: String,
    pub progress: i64,
}

/// GET /users/:id/achievements/:aid/progress - Percentage from 0 to 100.
#[instrument(skip(state))]
pub async fn achievement_progress(
    State(state): State<AppState>,
    Path((user_id, achievement_id)): Path<(String, String)>,
) -> Result<Json<ProgressResponse>> {
    let progress = state
        .engine
        .achievement_progress(&user_id, &achievement_id)
        .await?;
    Ok(Json(ProgressResponse {
        achievement_id,
        progress,
    }))
}

#[derive(Debug, Serialize)]
pub struct JoinResponse {
    pub challenge_id: String,
    pub joined: bool,
}

/// POST /challenges/:cid/join - Enrol a user; `joined` is false on repeat.
#[instrument(skip(state))]
pub async fn join_challenge(
    State(state): State<AppState>,
    Path(challenge_id): Path<String>,
    AppJson(request): AppJson<RegistrationRequest>,
) -> Result<Json<JoinResponse>> {
    let joined = state
        .engine
        .join_challenge(&challenge_id, &request.user_id)
        .await?;
    Ok(Json(JoinResponse {
        challenge_id,
        joined,
    }))
}

/// POST /challenges/:cid/complete - Complete a joined, active challenge
/// and award its reward. `409` when it cannot be completed.
#[instrument(skip(state))]
pub async fn complete_challenge(
    State(state): State<AppState>,
    Path(challenge_id): Path<String>,
    AppJson(request): AppJson<RegistrationRequest>,
) -> Result<Json<Challenge>> {
    let challenge = state
        .engine
        .complete_challenge(&challenge_id, &request.user_id, now().date())
        .await?;
    Ok(Json(challenge))
}

/// POST /competitions/:cid/register
///
/// ```json
/// { "user_id": "ana" }
/// ```
///
/// `201` on success, `409` when already competing or finished.
#[instrument(skip(state))]
pub async fn register(
    State(state): State<AppState>,
    Path(competition_id): Path<String>,
    AppJson(request): AppJson<RegistrationRequest>,
) -> Result<StatusCode> {
    state
        .engine
        .register(&competition_id, &request.user_id, now().date())
        .await?;
    Ok(StatusCode::CREATED)
}

/// GET /competitions/:cid/ranking - Participants by descending score.
#[instrument(skip(state))]
pub async fn ranking(
    State(state): State<AppState>,
    Path(competition_id): Path<String>,
) -> Result<Json<Vec<RankingEntry>>> {
    Ok(Json(state.engine.ranking(&competition_id).await?))
}

/// GET /competitions/:cid/winner - Top scorer, `null` without participants.
#[instrument(skip(state))]
pub async fn winner(
    State(state): State<AppState>,
    Path(competition_id): Path<String>,
) -> Result<Json<Option<RankingEntry>>> {
    Ok(Json(state.engine.winner(&competition_id).await?))
}

#[derive(Debug, Serialize)]
pub struct FinishResponse {
    pub competition_id: String,
    pub closed: u64,
}

/// POST /competitions/:cid/finish - Finish every participation.
#[instrument(skip(state))]
pub async fn finish(
    State(state): State<AppState>,
    Path(competition_id): Path<String>,
) -> Result<Json<FinishResponse>> {
    let closed = state.engine.finish(&competition_id).await?;
    Ok(Json(FinishResponse {
        competition_id,
        closed,
    }))
}

/// PUT /competitions/:cid/schedule
///
/// ```json
/// { "start_date": "2026-03-10", "end_date": "2026-03-20" }
/// ```
#[instrument(skip(state))]
pub async fn schedule_competition(
    State(state): State<AppState>,
    Path(competition_id): Path<String>,
    AppJson(request): AppJson<ScheduleRequest>,
) -> Result<Json<Competition>> {
    let competition = state
        .engine
        .schedule_competition(&competition_id, request.start_date, request.end_date)
        .await?;
    Ok(Json(competition))
}

/// POST /competitions/:cid/begin - Start on the scheduled start date only.
#[instrument(skip(state))]
pub async fn begin_competition(
    State(state): State<AppState>,
    Path(competition_id): Path<String>,
) -> Result<Json<Competition>> {
    Ok(Json(
        state
            .engine
            .begin_competition(&competition_id, now().date())
            .await?,
    ))
}

#[derive(Debug, Serialize)]
pub struct CloseResponse {
    pub competition_id: String,
    pub podium: Vec<RankingEntry>,
}

/// POST /competitions/:cid/close - Close a running competition.
#[instrument(skip(state))]
pub async fn close_competition(
    State(state): State<AppState>,
    Path(competition_id): Path<String>,
) -> Result<Json<CloseResponse>> {
    let podium = state.engine.close_competition(&competition_id).await?;
    Ok(Json(CloseResponse {
        competition_id,
        podium,
    }))
}
