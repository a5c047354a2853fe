use super::*;

#[async_trait]
impl crate::traits::PlayerStore for SqliteStore {
    async fn upsert_player(&self, player: &PlayerUpsert) -> anyhow::Result<String> {
        let now = fmt_ts(Utc::now());
        let (replace_guild, guild_id) = match &player.guild_id {
            Some(g) => (true, g.clone()),
            None => (false, None),
        };

        let row = sqlx::query(
            "INSERT INTO players (id, name, server_id, vocation, level, guild_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, COALESCE(?4, 'None'), COALESCE(?5, 1), ?6, ?7, ?7)
             ON CONFLICT(name, server_id) DO UPDATE SET
               vocation = COALESCE(?4, players.vocation),
               level = COALESCE(?5, players.level),
               guild_id = CASE WHEN ?8 THEN ?6 ELSE players.guild_id END,
               updated_at = ?7
             RETURNING id",
        )
        .bind(new_id())
        .bind(&player.name)
        .bind(&player.server_id)
        .bind(player.vocation.map(|v| v.as_str()))
        .bind(player.level.map(|l| l as i64))
        .bind(guild_id)
        .bind(&now)
        .bind(replace_guild as i32)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("id"))
    }

    async fn find_player(&self, name: &str, server_id: &str) -> anyhow::Result<Option<String>> {
        let row = sqlx::query("SELECT id FROM players WHERE name = ? AND server_id = ?")
            .bind(name)
            .bind(server_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get("id")))
    }

    async fn current_guild_ally_flag(
        &self,
        name: &str,
        server_id: &str,
    ) -> anyhow::Result<Option<bool>> {
        let row = sqlx::query(
            "SELECT g.is_ally
             FROM players p
             INNER JOIN guilds g ON p.guild_id = g.id
             WHERE p.name = ? AND p.server_id = ?",
        )
        .bind(name)
        .bind(server_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.get::<i32, _>("is_ally") != 0))
    }

    async fn list_guild_players(&self, limit: u32) -> anyhow::Result<Vec<PlayerRef>> {
        let rows = sqlx::query(
            "SELECT DISTINCT p.id, p.name
             FROM players p
             INNER JOIN guilds g ON p.guild_id = g.id
             ORDER BY p.name
             LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| PlayerRef {
                id: row.get("id"),
                name: row.get("name"),
            })
            .collect())
    }

    async fn unlink_departed_members(
        &self,
        guild_id: &str,
        current: &[String],
    ) -> anyhow::Result<u64> {
        let names = serde_json::to_string(current)?;
        let result = sqlx::query(
            "UPDATE players SET guild_id = NULL, updated_at = ?
             WHERE guild_id = ?
               AND name NOT IN (SELECT value FROM json_each(?))",
        )
        .bind(fmt_ts(Utc::now()))
        .bind(guild_id)
        .bind(names)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
