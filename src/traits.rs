//! Stored entities and the persistence traits the scraping core writes through.

use chrono::{DateTime, Utc};
use num_bigint::BigInt;
use serde::Serialize;

use crate::types::{RunStatus, ServerKind, Vocation};

pub mod state_store;

pub use state_store::{
    DeathStore, HealthCheckStore, MonitorStore, PlayerStore, PlaytimeStore, PresenceStore,
    ProgressStore, RunLogStore, WorldStore,
};

/// A game world being monitored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Server {
    pub id: String,
    pub name: String,
    pub kind: ServerKind,
}

/// A configured guild joined with the name of its world.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guild {
    pub id: String,
    pub name: String,
    pub server_id: String,
    pub server_name: String,
    pub is_ally: bool,
}

/// Fields to write when upserting a player by `(name, server_id)`.
///
/// `None` leaves the stored column untouched on update and falls back to the
/// column default on insert.
#[derive(Debug, Clone, Default)]
pub struct PlayerUpsert {
    pub name: String,
    pub server_id: String,
    pub level: Option<u32>,
    pub vocation: Option<Vocation>,
    /// `Some(x)` overwrites guild membership with `x`.
    pub guild_id: Option<Option<String>>,
}

/// Minimal player reference used by per-player tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerRef {
    pub id: String,
    pub name: String,
}

/// One timestamped `(level, experience)` observation. Never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub player_id: String,
    pub level: u32,
    pub experience: BigInt,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HuntingSession {
    pub id: String,
    pub player_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub xp_gained: BigInt,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OnlineStatus {
    pub player_id: String,
    pub is_online: bool,
    pub is_hunting: bool,
    pub last_seen: Option<DateTime<Utc>>,
}

/// A death ready for insertion, already classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDeath {
    pub victim_name: String,
    pub victim_id: Option<String>,
    pub killer_name: Option<String>,
    pub death_time: DateTime<Utc>,
    pub server_id: String,
    pub is_ally_death: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub player_name: String,
    pub vocation: Vocation,
}

/// One histogram cell of a player's playtime pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlaytimeBucket {
    pub hour_of_day: u8,
    pub day_of_week: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaytimePattern {
    pub player_id: String,
    pub bucket: PlaytimeBucket,
    pub frequency: u32,
    pub last_updated: DateTime<Utc>,
}

/// A single run-log row: the externally visible health signal of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunLogEntry {
    pub task_name: String,
    pub status: RunStatus,
    pub message: String,
    pub execution_time_ms: u64,
    pub timestamp: DateTime<Utc>,
}
