use async_trait::async_trait;
use chrono::{DateTime, Utc};
use num_bigint::BigInt;

use crate::types::ServerKind;

use super::{
    Guild, HuntingSession, NewDeath, OnlineStatus, PlayerRef, PlayerUpsert, PlaytimeBucket,
    PlaytimePattern, RosterEntry, RunLogEntry, Server, Snapshot,
};

/// Worlds and configured guilds.
#[async_trait]
pub trait WorldStore: Send + Sync {
    /// Upsert a world by name. Returns its id.
    async fn upsert_server(&self, name: &str, kind: ServerKind) -> anyhow::Result<String>;

    /// Upsert a guild by `(name, server_id)`, updating its ally flag. Returns its id.
    async fn upsert_guild(&self, name: &str, server_id: &str, is_ally: bool)
        -> anyhow::Result<String>;

    async fn list_servers(&self) -> anyhow::Result<Vec<Server>>;

    /// All configured guilds joined with their world name, ordered by world then guild.
    async fn list_guilds(&self) -> anyhow::Result<Vec<Guild>>;

    /// Append one roster snapshot row per member, all stamped `snapshot_time`.
    async fn insert_roster_snapshot(
        &self,
        guild_id: &str,
        members: &[RosterEntry],
        snapshot_time: DateTime<Utc>,
    ) -> anyhow::Result<()>;
}

/// Player identity rows.
#[async_trait]
pub trait PlayerStore: Send + Sync {
    /// Upsert by natural key `(name, server_id)`. Returns the player id.
    async fn upsert_player(&self, player: &PlayerUpsert) -> anyhow::Result<String>;

    async fn find_player(&self, name: &str, server_id: &str) -> anyhow::Result<Option<String>>;

    /// Ally flag of the guild the player currently belongs to, if any.
    async fn current_guild_ally_flag(
        &self,
        name: &str,
        server_id: &str,
    ) -> anyhow::Result<Option<bool>>;

    /// Players that belong to a configured guild, ordered by name.
    async fn list_guild_players(&self, limit: u32) -> anyhow::Result<Vec<PlayerRef>>;

    /// Clear the guild link of every member of `guild_id` whose name is not in
    /// `current`. Returns the number of players unlinked.
    async fn unlink_departed_members(
        &self,
        guild_id: &str,
        current: &[String],
    ) -> anyhow::Result<u64>;
}

/// Experience snapshots and hunting sessions.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn latest_snapshot(&self, player_id: &str) -> anyhow::Result<Option<Snapshot>>;

    async fn insert_snapshot(&self, snapshot: &Snapshot) -> anyhow::Result<()>;

    async fn active_session(&self, player_id: &str) -> anyhow::Result<Option<HuntingSession>>;

    /// Open a session. Fails if the player already has an active one.
    async fn open_session(
        &self,
        player_id: &str,
        start_time: DateTime<Utc>,
        xp_gained: &BigInt,
    ) -> anyhow::Result<String>;

    /// Overwrite the cumulative total of an active session.
    async fn update_session_xp(&self, session_id: &str, xp_gained: &BigInt)
        -> anyhow::Result<()>;

    /// Close every active session of the player. Returns the number closed.
    async fn close_active_sessions(
        &self,
        player_id: &str,
        end_time: DateTime<Utc>,
    ) -> anyhow::Result<u64>;

    async fn sessions_for(&self, player_id: &str) -> anyhow::Result<Vec<HuntingSession>>;

    async fn set_hunting(&self, player_id: &str, is_hunting: bool) -> anyhow::Result<()>;
}

/// Online presence flags.
#[async_trait]
pub trait PresenceStore: Send + Sync {
    /// Flag every player of the world offline. Returns rows changed.
    async fn mark_server_offline(&self, server_id: &str) -> anyhow::Result<u64>;

    async fn mark_online(&self, player_id: &str, seen_at: DateTime<Utc>) -> anyhow::Result<()>;

    async fn online_status(&self, player_id: &str) -> anyhow::Result<Option<OnlineStatus>>;
}

/// Killboard rows.
#[async_trait]
pub trait DeathStore: Send + Sync {
    /// Insert unless `(victim_name, death_time, server_id)` exists.
    /// Returns `true` when a row was written.
    async fn insert_death(&self, death: &NewDeath) -> anyhow::Result<bool>;

    async fn count_deaths(&self, server_id: &str) -> anyhow::Result<u64>;
}

/// Hour-of-week playtime histogram.
#[async_trait]
pub trait PlaytimeStore: Send + Sync {
    /// Add `frequency` to the bucket, creating it at `frequency` if missing.
    async fn add_playtime(
        &self,
        player_id: &str,
        bucket: PlaytimeBucket,
        frequency: u32,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()>;

    async fn playtime_for(&self, player_id: &str) -> anyhow::Result<Vec<PlaytimePattern>>;
}

#[async_trait]
pub trait RunLogStore: Send + Sync {
    async fn append_run_log(&self, entry: &RunLogEntry) -> anyhow::Result<()>;

    async fn recent_run_logs(
        &self,
        task_name: &str,
        limit: u32,
    ) -> anyhow::Result<Vec<RunLogEntry>>;
}

#[async_trait]
pub trait HealthCheckStore: Send + Sync {
    async fn health_check(&self) -> anyhow::Result<()>;
}

/// Facade over every focused store so call sites can hold `Arc<dyn MonitorStore>`.
pub trait MonitorStore:
    Send
    + Sync
    + WorldStore
    + PlayerStore
    + ProgressStore
    + PresenceStore
    + DeathStore
    + PlaytimeStore
    + RunLogStore
    + HealthCheckStore
{
}

impl<T> MonitorStore for T where
    T: Send
        + Sync
        + WorldStore
        + PlayerStore
        + ProgressStore
        + PresenceStore
        + DeathStore
        + PlaytimeStore
        + RunLogStore
        + HealthCheckStore
{
}
