use super::*;

#[async_trait]
impl crate::traits::PresenceStore for SqliteStore {
    async fn mark_server_offline(&self, server_id: &str) -> anyhow::Result<u64> {
        let result = sqlx::query(
            "UPDATE player_status
             SET is_online = 0, updated_at = ?
             WHERE is_online = 1
               AND player_id IN (SELECT id FROM players WHERE server_id = ?)",
        )
        .bind(fmt_ts(Utc::now()))
        .bind(server_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn mark_online(&self, player_id: &str, seen_at: DateTime<Utc>) -> anyhow::Result<()> {
        let ts = fmt_ts(seen_at);
        sqlx::query(
            "INSERT INTO player_status (player_id, is_online, last_seen, updated_at)
             VALUES (?, 1, ?, ?)
             ON CONFLICT(player_id) DO UPDATE SET
               is_online = 1,
               last_seen = excluded.last_seen,
               updated_at = excluded.updated_at",
        )
        .bind(player_id)
        .bind(&ts)
        .bind(&ts)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn online_status(&self, player_id: &str) -> anyhow::Result<Option<OnlineStatus>> {
        let row = sqlx::query(
            "SELECT player_id, is_online, is_hunting, last_seen
             FROM player_status WHERE player_id = ?",
        )
        .bind(player_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(OnlineStatus {
            player_id: row.get("player_id"),
            is_online: row.get::<i32, _>("is_online") != 0,
            is_hunting: row.get::<i32, _>("is_hunting") != 0,
            last_seen: parse_opt_ts(row.get("last_seen"))?,
        }))
    }
}
