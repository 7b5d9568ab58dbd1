//! matchday-core - Core library for Matchday
//!
//! This crate contains the shared models, durable storage, and the
//! favorites synchronization engine used by the phone app and the
//! companion-device extension. UI layers construct a runtime
//! ([`runtime::PhoneRuntime`] / [`runtime::WatchRuntime`]) once at process
//! start and call into it from event handlers.

pub mod bridge;
pub mod db;
pub mod error;
pub mod favorites;
pub mod models;
pub mod runtime;
pub mod storage;
pub mod sync;

pub use error::{Error, Result};
pub use models::{Editioned, Match, MatchId, Team, TeamId};
