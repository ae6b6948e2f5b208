//! Runtime configuration loaded from environment variables.
//!
//! A `.env` file in the working directory is honoured when present.
//! Values that fail to parse fall back to their defaults.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::NaiveTime;

/// Default port if not specified via environment variable.
pub const DEFAULT_PORT: u16 = 3000;

/// Default database path if not specified via environment variable.
pub const DEFAULT_DB_URL: &str = "sqlite:podium.db?mode=rwc";

/// Default location of the persisted session.
pub const DEFAULT_SESSION_FILE: &str = "sesion.txt";

/// Process configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub session_file: PathBuf,
    pub rules: RuleConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            database_url: DEFAULT_DB_URL.to_string(),
            session_file: PathBuf::from(DEFAULT_SESSION_FILE),
            rules: RuleConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let defaults = RuleConfig::default();
        Self {
            port: parse_var("PODIUM_PORT", DEFAULT_PORT),
            database_url: env::var("PODIUM_DATABASE_URL")
                .unwrap_or_else(|_| DEFAULT_DB_URL.to_string()),
            session_file: env::var("PODIUM_SESSION_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_SESSION_FILE)),
            rules: RuleConfig {
                daily_goal_minutes: parse_var(
                    "PODIUM_DAILY_GOAL_MINUTES",
                    defaults.daily_goal_minutes,
                ),
                daily_goal_km: parse_var("PODIUM_DAILY_GOAL_KM", defaults.daily_goal_km),
                streak_days: parse_var("PODIUM_STREAK_DAYS", defaults.streak_days),
                variety_sports: parse_var("PODIUM_VARIETY_SPORTS", defaults.variety_sports),
                ..defaults
            },
        }
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Thresholds for every achievement and challenge rule.
///
/// Each rule gets its own parameter even where the historical values
/// coincide (several of them are 3), since they measure different things:
/// minutes, kilometres, days and sport counts.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleConfig {
    /// The first activity of the day must start before this time.
    pub morning_cutoff: NaiveTime,
    /// Minutes logged today that meet the daily goal.
    pub daily_goal_minutes: i64,
    /// Kilometres logged today that meet the daily goal.
    pub daily_goal_km: f64,
    /// Distinct active dates required by the streak achievement, counted over
    /// today and the `streak_days` preceding days.
    pub streak_days: i64,
    /// Distinct sports required by the variety achievement.
    pub variety_sports: usize,
    /// Look-back in days for the variety achievement.
    pub variety_window_days: i64,
    /// All-time kilometres for challenge D001.
    pub challenge_distance_km: f64,
    /// Consecutive days ending today for challenge D002.
    pub challenge_streak_days: i64,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            morning_cutoff: NaiveTime::from_hms_opt(12, 0, 0).unwrap_or(NaiveTime::MIN),
            daily_goal_minutes: 3,
            daily_goal_km: 3.0,
            streak_days: 3,
            variety_sports: 3,
            variety_window_days: 7,
            challenge_distance_km: 5.0,
            challenge_streak_days: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.session_file, PathBuf::from("sesion.txt"));
        assert_eq!(config.rules.challenge_distance_km, 5.0);
        assert_eq!(
            config.rules.morning_cutoff,
            NaiveTime::from_hms_opt(12, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_parse_var_falls_back() {
        assert_eq!(parse_var("PODIUM_TEST_SURELY_UNSET_VAR", 42u16), 42);
    }
}
