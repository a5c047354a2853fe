use super::*;

#[async_trait]
impl crate::traits::DeathStore for SqliteStore {
    async fn insert_death(&self, death: &NewDeath) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "INSERT INTO deaths (victim_name, victim_id, killer_name, death_time, server_id, is_ally_death, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(victim_name, death_time, server_id) DO NOTHING",
        )
        .bind(&death.victim_name)
        .bind(&death.victim_id)
        .bind(&death.killer_name)
        .bind(fmt_ts(death.death_time))
        .bind(&death.server_id)
        .bind(death.is_ally_death as i32)
        .bind(fmt_ts(Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_deaths(&self, server_id: &str) -> anyhow::Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM deaths WHERE server_id = ?")
            .bind(server_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("n").max(0) as u64)
    }
}
