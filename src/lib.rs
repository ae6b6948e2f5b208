//! Podium - gamification core for a school sports program.
//!
//! # Overview
//!
//! Users log workouts, earn points and experience, unlock achievements,
//! complete challenges and compete in sport-specific competitions. All
//! state lives in a relational store; there is no in-process cache.
//!
//! # Modules
//!
//! - [`model`]: Users, activities, achievements, challenges, competitions
//! - [`storage`]: SQLite storage layer
//! - [`rules`]: Completion rules and the rule registry
//! - [`progression`]: Points, experience and levels
//! - [`activity`]: Activity recorder
//! - [`achievements`], [`challenges`]: Evaluators and seed data
//! - [`competition`]: Competition ledger
//! - [`session`]: Accounts, login and the session file
//! - [`engine`]: The [`engine::Gamification`] service value
//! - [`api`]: HTTP API handlers
//! - [`config`], [`error`]: Configuration and error types

pub mod achievements;
pub mod activity;
pub mod api;
pub mod challenges;
pub mod competition;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod progression;
pub mod rules;
pub mod session;
pub mod storage;
