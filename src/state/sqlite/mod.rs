use std::str::FromStr;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use num_bigint::BigInt;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use crate::traits::{
    Guild, HuntingSession, NewDeath, OnlineStatus, PlayerRef, PlayerUpsert, PlaytimeBucket,
    PlaytimePattern, RosterEntry, RunLogEntry, Server, Snapshot,
};
use crate::types::{RunStatus, ServerKind};

mod deaths;
mod health_checks;
mod players;
mod playtime;
mod presence;
mod progress;
mod run_log;
mod worlds;


/// SQLite-backed persistence gateway.
///
/// Executes the writes the state engine and tasks ask for; it holds no
/// derivation logic of its own.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn new(db_path: &str, max_connections: u32) -> anyhow::Result<Self> {
        let opts = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(std::time::Duration::from_secs(5))
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(opts)
            .await
            .with_context(|| format!("Failed to open database at {}", db_path))?;

        crate::db::migrations::migrate_monitor(&pool).await?;

        Ok(Self { pool })
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Fixed-width UTC timestamp so stored values sort lexically in time order.
pub(crate) fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("Invalid stored timestamp '{}'", raw))?
        .with_timezone(&Utc))
}

fn parse_opt_ts(raw: Option<String>) -> anyhow::Result<Option<DateTime<Utc>>> {
    raw.as_deref().map(parse_ts).transpose()
}

fn parse_big(raw: &str) -> anyhow::Result<BigInt> {
    BigInt::from_str(raw).with_context(|| format!("Invalid stored experience value '{}'", raw))
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
