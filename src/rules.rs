//! Completion rules for achievements and challenges.
//!
//! Every rule is a pure predicate over an [`ActivityLog`]: a read-only
//! snapshot of one user's activities plus the date considered "today".
//! Evaluators load the snapshot once, then ask the [`RuleRegistry`] which
//! rule (if any) governs each achievement or challenge id.
//!
//! Ids registered with `None` are known to have no rule and never complete.
//! Unknown ids behave the same way.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::{Days, NaiveDate, NaiveTime};

use crate::config::RuleConfig;
use crate::model::Activity;

/// Read-only view of a user's activity history at a given date.
#[derive(Debug, Clone)]
pub struct ActivityLog {
    pub today: NaiveDate,
    pub entries: Vec<Activity>,
}

impl ActivityLog {
    pub fn new(today: NaiveDate, entries: Vec<Activity>) -> Self {
        Self { today, entries }
    }

    fn on_today(&self) -> impl Iterator<Item = &Activity> {
        self.entries.iter().filter(move |a| a.date == self.today)
    }

    /// Activities dated between `today - days` and `today`, both inclusive.
    fn within(&self, days: i64) -> impl Iterator<Item = &Activity> {
        let from = self
            .today
            .checked_sub_days(Days::new(days.max(0) as u64))
            .unwrap_or(NaiveDate::MIN);
        self.entries
            .iter()
            .filter(move |a| a.date >= from && a.date <= self.today)
    }
}

/// A completion condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    /// Today's earliest activity started strictly before `cutoff`.
    FirstActivityBefore { cutoff: NaiveTime },
    /// Today's minutes reach `minutes`, or today's distance reaches `km`.
    DailyGoal { minutes: i64, km: f64 },
    /// At least one competition-flagged activity, ever.
    CompetitionActivity,
    /// At least `required` distinct active dates between
    /// `today - lookback_days` and today.
    ActiveDays { required: usize, lookback_days: i64 },
    /// At least `sports` distinct sports between `today - lookback_days`
    /// and today.
    SportVariety { sports: usize, lookback_days: i64 },
    /// All-time distance reaches `km`.
    TotalDistance { km: f64 },
}

impl Rule {
    pub fn is_met(&self, log: &ActivityLog) -> bool {
        match self {
            Rule::FirstActivityBefore { cutoff } => log
                .on_today()
                .map(|a| a.time)
                .min()
                .is_some_and(|earliest| earliest < *cutoff),
            Rule::DailyGoal { minutes, km } => {
                let (total_minutes, total_km) = log
                    .on_today()
                    .fold((0i64, 0.0f64), |(m, d), a| {
                        (m + a.duration_minutes, d + a.distance_km)
                    });
                total_minutes >= *minutes || total_km >= *km
            }
            Rule::CompetitionActivity => log.entries.iter().any(|a| a.is_competition),
            Rule::ActiveDays {
                required,
                lookback_days,
            } => {
                let dates: BTreeSet<NaiveDate> = log.within(*lookback_days).map(|a| a.date).collect();
                dates.len() >= *required
            }
            Rule::SportVariety {
                sports,
                lookback_days,
            } => {
                let distinct: HashSet<_> = log.within(*lookback_days).map(|a| a.sport).collect();
                distinct.len() >= *sports
            }
            Rule::TotalDistance { km } => {
                log.entries.iter().map(|a| a.distance_km).sum::<f64>() >= *km
            }
        }
    }
}

/// Maps achievement and challenge ids to their rules.
#[derive(Debug, Clone)]
pub struct RuleRegistry {
    achievements: BTreeMap<String, Option<Rule>>,
    challenges: BTreeMap<String, Option<Rule>>,
}

impl RuleRegistry {
    /// The rule set for the predefined achievements "1" to "9" and the
    /// default challenges "D001" and "D002".
    pub fn from_config(config: &RuleConfig) -> Self {
        let achievements = BTreeMap::from([
            (
                "1".to_string(),
                Some(Rule::FirstActivityBefore {
                    cutoff: config.morning_cutoff,
                }),
            ),
            (
                "2".to_string(),
                Some(Rule::DailyGoal {
                    minutes: config.daily_goal_minutes,
                    km: config.daily_goal_km,
                }),
            ),
            ("3".to_string(), Some(Rule::CompetitionActivity)),
            (
                "4".to_string(),
                Some(Rule::ActiveDays {
                    required: config.streak_days.max(0) as usize,
                    lookback_days: config.streak_days,
                }),
            ),
            (
                "5".to_string(),
                Some(Rule::SportVariety {
                    sports: config.variety_sports,
                    lookback_days: config.variety_window_days,
                }),
            ),
            ("6".to_string(), None),
            ("7".to_string(), None),
            ("8".to_string(), None),
            ("9".to_string(), None),
        ]);

        let challenges = BTreeMap::from([
            (
                "D001".to_string(),
                Some(Rule::TotalDistance {
                    km: config.challenge_distance_km,
                }),
            ),
            (
                "D002".to_string(),
                // Today counts as the first day of the streak.
                Some(Rule::ActiveDays {
                    required: config.challenge_streak_days.max(0) as usize,
                    lookback_days: config.challenge_streak_days - 1,
                }),
            ),
        ]);

        Self {
            achievements,
            challenges,
        }
    }

    pub fn achievement(&self, id: &str) -> Option<&Rule> {
        self.achievements.get(id).and_then(Option::as_ref)
    }

    pub fn challenge(&self, id: &str) -> Option<&Rule> {
        self.challenges.get(id).and_then(Option::as_ref)
    }

    /// Achievement ids that are registered without a rule.
    pub fn unruled_achievements(&self) -> Vec<&str> {
        self.achievements
            .iter()
            .filter(|(_, rule)| rule.is_none())
            .map(|(id, _)| id.as_str())
            .collect()
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::from_config(&RuleConfig::default())
    }
}
