//! Error types shared by every component.
//!
//! Each variant belongs to one of four kinds: store failures, malformed
//! input, business-rule violations and missing resources. None of them is
//! retried internally; a failed action leaves the store unchanged apart from
//! statements that already completed, and the caller may simply retry.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::model::CompetitionState;

/// Coarse classification of a [`GameError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Store,
    Input,
    Rule,
    Missing,
}

#[derive(Debug, thiserror::Error)]
pub enum GameError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Session file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("User already exists: {0}")]
    UserExists(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Already participating in competition {0}")]
    AlreadyRegistered(String),

    #[error("Competition {0} has already finished")]
    CompetitionFinished(String),

    #[error("Challenge {0} is not active for this user or was never joined")]
    ChallengeNotCompletable(String),

    #[error("Competition {competition_id} cannot do that while {state:?}")]
    CompetitionStateConflict {
        competition_id: String,
        state: CompetitionState,
    },

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Competition not found: {0}")]
    CompetitionNotFound(String),

    #[error("Challenge not found: {0}")]
    ChallengeNotFound(String),

    #[error("Achievement not found: {0}")]
    AchievementNotFound(String),

    #[error("No active {sport} competition for user {user_id}")]
    NoActiveCompetition { user_id: String, sport: String },

    #[error("Corrupt record: {0}")]
    CorruptRecord(String),
}

impl GameError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GameError::Database(_) | GameError::Io(_) | GameError::CorruptRecord(_) => {
                ErrorKind::Store
            }
            GameError::InvalidInput(_) => ErrorKind::Input,
            GameError::UserExists(_)
            | GameError::InvalidCredentials
            | GameError::AlreadyRegistered(_)
            | GameError::CompetitionFinished(_)
            | GameError::ChallengeNotCompletable(_)
            | GameError::CompetitionStateConflict { .. } => ErrorKind::Rule,
            GameError::UserNotFound(_)
            | GameError::CompetitionNotFound(_)
            | GameError::ChallengeNotFound(_)
            | GameError::AchievementNotFound(_)
            | GameError::NoActiveCompetition { .. } => ErrorKind::Missing,
        }
    }
}

/// Malformed or mistyped request bodies are input errors like any other.
impl From<JsonRejection> for GameError {
    fn from(rejection: JsonRejection) -> Self {
        GameError::InvalidInput(rejection.body_text())
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorKind,
    message: String,
}

impl IntoResponse for GameError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = match (&self, kind) {
            (GameError::InvalidCredentials, _) => StatusCode::UNAUTHORIZED,
            (_, ErrorKind::Store) => StatusCode::INTERNAL_SERVER_ERROR,
            (_, ErrorKind::Input) => StatusCode::BAD_REQUEST,
            (_, ErrorKind::Rule) => StatusCode::CONFLICT,
            (_, ErrorKind::Missing) => StatusCode::NOT_FOUND,
        };

        // Store details stay in the log; the client gets a generic message.
        let message = if kind == ErrorKind::Store {
            tracing::error!(error = %self, "Store failure");
            "The action could not be completed, please retry".to_string()
        } else {
            tracing::warn!(error = %self, "Action rejected");
            self.to_string()
        };

        (status, Json(ErrorResponse { error: kind, message })).into_response()
    }
}

pub type Result<T> = std::result::Result<T, GameError>;
