use super::*;

#[async_trait]
impl crate::traits::PlaytimeStore for SqliteStore {
    async fn add_playtime(
        &self,
        player_id: &str,
        bucket: PlaytimeBucket,
        frequency: u32,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO playtime_patterns (player_id, hour_of_day, day_of_week, frequency, last_updated)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(player_id, hour_of_day, day_of_week) DO UPDATE SET
               frequency = playtime_patterns.frequency + excluded.frequency,
               last_updated = excluded.last_updated",
        )
        .bind(player_id)
        .bind(bucket.hour_of_day as i64)
        .bind(bucket.day_of_week as i64)
        .bind(frequency as i64)
        .bind(fmt_ts(now))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn playtime_for(&self, player_id: &str) -> anyhow::Result<Vec<PlaytimePattern>> {
        let rows = sqlx::query(
            "SELECT player_id, hour_of_day, day_of_week, frequency, last_updated
             FROM playtime_patterns
             WHERE player_id = ?
             ORDER BY day_of_week, hour_of_day",
        )
        .bind(player_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let updated: String = row.get("last_updated");
                Ok(PlaytimePattern {
                    player_id: row.get("player_id"),
                    bucket: PlaytimeBucket {
                        hour_of_day: row.get::<i64, _>("hour_of_day") as u8,
                        day_of_week: row.get::<i64, _>("day_of_week") as u8,
                    },
                    frequency: row.get::<i64, _>("frequency").max(0) as u32,
                    last_updated: parse_ts(&updated)?,
                })
            })
            .collect()
    }
}
