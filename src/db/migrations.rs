use sqlx::SqlitePool;
use tracing::info;

/// Schema for everything the scraping core reads and writes.
///
/// Every statement is idempotent (`IF NOT EXISTS`), so this runs on every
/// startup. Natural-key uniqueness constraints are the only synchronization
/// between concurrently running tasks.
pub(crate) async fn migrate_monitor(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS servers (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            server_type TEXT NOT NULL DEFAULT 'OpenPVP',
            created_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS guilds (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            server_id TEXT NOT NULL REFERENCES servers(id) ON DELETE CASCADE,
            is_ally INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(name, server_id)
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS players (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            server_id TEXT NOT NULL REFERENCES servers(id) ON DELETE CASCADE,
            vocation TEXT NOT NULL DEFAULT 'None',
            level INTEGER NOT NULL DEFAULT 1,
            guild_id TEXT REFERENCES guilds(id) ON DELETE SET NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(name, server_id)
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_players_guild ON players(guild_id)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS player_status (
            player_id TEXT PRIMARY KEY REFERENCES players(id) ON DELETE CASCADE,
            is_online INTEGER NOT NULL DEFAULT 0,
            is_hunting INTEGER NOT NULL DEFAULT 0,
            last_seen TEXT,
            updated_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    // Experience values exceed i64 range, so they are stored as decimal text.
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS xp_snapshots (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            player_id TEXT NOT NULL REFERENCES players(id) ON DELETE CASCADE,
            level INTEGER NOT NULL,
            experience TEXT NOT NULL,
            snapshot_time TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_xp_snapshots_player_time
         ON xp_snapshots(player_id, snapshot_time DESC)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS hunting_sessions (
            id TEXT PRIMARY KEY,
            player_id TEXT NOT NULL REFERENCES players(id) ON DELETE CASCADE,
            start_time TEXT NOT NULL,
            end_time TEXT,
            xp_gained TEXT NOT NULL DEFAULT '0',
            is_active INTEGER NOT NULL DEFAULT 1
        )",
    )
    .execute(pool)
    .await?;

    // At most one active session per player.
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_hunting_sessions_one_active
         ON hunting_sessions(player_id) WHERE is_active = 1",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS deaths (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            victim_name TEXT NOT NULL,
            victim_id TEXT REFERENCES players(id) ON DELETE SET NULL,
            killer_name TEXT,
            death_time TEXT NOT NULL,
            server_id TEXT NOT NULL REFERENCES servers(id) ON DELETE CASCADE,
            is_ally_death INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            UNIQUE(victim_name, death_time, server_id)
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS guild_member_snapshots (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            guild_id TEXT NOT NULL REFERENCES guilds(id) ON DELETE CASCADE,
            player_name TEXT NOT NULL,
            vocation TEXT NOT NULL,
            snapshot_time TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_guild_member_snapshots_guild_time
         ON guild_member_snapshots(guild_id, snapshot_time DESC)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS playtime_patterns (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            player_id TEXT NOT NULL REFERENCES players(id) ON DELETE CASCADE,
            hour_of_day INTEGER NOT NULL CHECK (hour_of_day BETWEEN 0 AND 23),
            day_of_week INTEGER NOT NULL CHECK (day_of_week BETWEEN 0 AND 6),
            frequency INTEGER NOT NULL DEFAULT 0,
            last_updated TEXT NOT NULL,
            UNIQUE(player_id, hour_of_day, day_of_week)
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS scraper_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            scraper_type TEXT NOT NULL,
            status TEXT NOT NULL,
            message TEXT,
            execution_time INTEGER,
            created_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_scraper_logs_type_time
         ON scraper_logs(scraper_type, created_at DESC)",
    )
    .execute(pool)
    .await?;

    info!("Monitor schema migration complete");
    Ok(())
}
