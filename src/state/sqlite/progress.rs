use super::*;

fn row_to_session(row: &sqlx::sqlite::SqliteRow) -> anyhow::Result<HuntingSession> {
    let start: String = row.get("start_time");
    let xp: String = row.get("xp_gained");
    Ok(HuntingSession {
        id: row.get("id"),
        player_id: row.get("player_id"),
        start_time: parse_ts(&start)?,
        end_time: parse_opt_ts(row.get("end_time"))?,
        xp_gained: parse_big(&xp)?,
        is_active: row.get::<i32, _>("is_active") != 0,
    })
}

#[async_trait]
impl crate::traits::ProgressStore for SqliteStore {
    async fn latest_snapshot(&self, player_id: &str) -> anyhow::Result<Option<Snapshot>> {
        let row = sqlx::query(
            "SELECT player_id, level, experience, snapshot_time
             FROM xp_snapshots
             WHERE player_id = ?
             ORDER BY snapshot_time DESC, id DESC
             LIMIT 1",
        )
        .bind(player_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let experience: String = row.get("experience");
        let captured: String = row.get("snapshot_time");
        Ok(Some(Snapshot {
            player_id: row.get("player_id"),
            level: row.get::<i64, _>("level").clamp(0, u32::MAX as i64) as u32,
            experience: parse_big(&experience)?,
            captured_at: parse_ts(&captured)?,
        }))
    }

    async fn insert_snapshot(&self, snapshot: &Snapshot) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO xp_snapshots (player_id, level, experience, snapshot_time)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&snapshot.player_id)
        .bind(snapshot.level as i64)
        .bind(snapshot.experience.to_string())
        .bind(fmt_ts(snapshot.captured_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn active_session(&self, player_id: &str) -> anyhow::Result<Option<HuntingSession>> {
        let row = sqlx::query(
            "SELECT id, player_id, start_time, end_time, xp_gained, is_active
             FROM hunting_sessions
             WHERE player_id = ? AND is_active = 1
             LIMIT 1",
        )
        .bind(player_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_session).transpose()
    }

    async fn open_session(
        &self,
        player_id: &str,
        start_time: DateTime<Utc>,
        xp_gained: &BigInt,
    ) -> anyhow::Result<String> {
        let id = new_id();
        sqlx::query(
            "INSERT INTO hunting_sessions (id, player_id, start_time, xp_gained, is_active)
             VALUES (?, ?, ?, ?, 1)",
        )
        .bind(&id)
        .bind(player_id)
        .bind(fmt_ts(start_time))
        .bind(xp_gained.to_string())
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to open hunting session for player {}", player_id))?;
        Ok(id)
    }

    async fn update_session_xp(&self, session_id: &str, xp_gained: &BigInt) -> anyhow::Result<()> {
        let result = sqlx::query(
            "UPDATE hunting_sessions SET xp_gained = ? WHERE id = ? AND is_active = 1",
        )
        .bind(xp_gained.to_string())
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            anyhow::bail!("Hunting session {} is not active", session_id);
        }
        Ok(())
    }

    async fn close_active_sessions(
        &self,
        player_id: &str,
        end_time: DateTime<Utc>,
    ) -> anyhow::Result<u64> {
        let result = sqlx::query(
            "UPDATE hunting_sessions
             SET is_active = 0, end_time = ?
             WHERE player_id = ? AND is_active = 1",
        )
        .bind(fmt_ts(end_time))
        .bind(player_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn sessions_for(&self, player_id: &str) -> anyhow::Result<Vec<HuntingSession>> {
        let rows = sqlx::query(
            "SELECT id, player_id, start_time, end_time, xp_gained, is_active
             FROM hunting_sessions
             WHERE player_id = ?
             ORDER BY start_time ASC",
        )
        .bind(player_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_session).collect()
    }

    async fn set_hunting(&self, player_id: &str, is_hunting: bool) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO player_status (player_id, is_hunting, updated_at)
             VALUES (?, ?, ?)
             ON CONFLICT(player_id) DO UPDATE SET
               is_hunting = excluded.is_hunting,
               updated_at = excluded.updated_at",
        )
        .bind(player_id)
        .bind(is_hunting as i32)
        .bind(fmt_ts(Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
