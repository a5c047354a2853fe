use super::*;

#[async_trait]
impl crate::traits::RunLogStore for SqliteStore {
    async fn append_run_log(&self, entry: &RunLogEntry) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO scraper_logs (scraper_type, status, message, execution_time, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&entry.task_name)
        .bind(entry.status.as_str())
        .bind(&entry.message)
        .bind(entry.execution_time_ms as i64)
        .bind(fmt_ts(entry.timestamp))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent_run_logs(
        &self,
        task_name: &str,
        limit: u32,
    ) -> anyhow::Result<Vec<RunLogEntry>> {
        let rows = sqlx::query(
            "SELECT scraper_type, status, message, execution_time, created_at
             FROM scraper_logs
             WHERE scraper_type = ?
             ORDER BY created_at DESC, id DESC
             LIMIT ?",
        )
        .bind(task_name)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let status: String = row.get("status");
                let created: String = row.get("created_at");
                Ok(RunLogEntry {
                    task_name: row.get("scraper_type"),
                    status: RunStatus::from_str(&status),
                    message: row.get::<Option<String>, _>("message").unwrap_or_default(),
                    execution_time_ms: row
                        .get::<Option<i64>, _>("execution_time")
                        .unwrap_or(0)
                        .max(0) as u64,
                    timestamp: parse_ts(&created)?,
                })
            })
            .collect()
    }
}
