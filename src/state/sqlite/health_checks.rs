use super::*;

const CORE_TABLES: [&str; 4] = ["servers", "players", "hunting_sessions", "scraper_logs"];

#[async_trait]
impl crate::traits::HealthCheckStore for SqliteStore {
    /// Reachability plus a check that migrations created the core tables.
    async fn health_check(&self) -> anyhow::Result<()> {
        let present: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .context("Database is not reachable")?;

        let missing: Vec<&str> = CORE_TABLES
            .into_iter()
            .filter(|t| !present.iter().any(|p| p == t))
            .collect();
        if !missing.is_empty() {
            anyhow::bail!("Database schema incomplete; missing {}", missing.join(", "));
        }
        Ok(())
    }
}
