use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::Serialize;
use tracing::{error, info};

use crate::config::{AppConfig, TaskConfig};
use crate::engine::StateEngine;
use crate::fetch::Fetcher;
use crate::retry::RetryPolicy;
use crate::scheduler::Scheduler;
use crate::state::SqliteStore;
use crate::tasks::{TaskContext, TaskKind};
use crate::traits::{HealthCheckStore, MonitorStore, RunLogEntry, WorldStore};

/// Configured schedule for one task, as printed by `status`.
#[derive(Debug, Clone, Serialize)]
pub struct TaskPlan {
    pub name: &'static str,
    pub enabled: bool,
    pub interval_secs: u64,
    pub retry_attempts: u32,
    pub retry_base_ms: u64,
    pub retry_max_ms: u64,
}

pub fn task_table(config: &AppConfig) -> Vec<TaskPlan> {
    config
        .tasks
        .entries()
        .into_iter()
        .map(|(name, task)| TaskPlan {
            name,
            enabled: task.enabled,
            interval_secs: task.interval_secs,
            retry_attempts: task.retry_attempts,
            retry_base_ms: task.retry_base_ms,
            retry_max_ms: task.retry_max_ms,
        })
        .collect()
}

/// Open the store, seed worlds and guilds, and wire every task into a
/// scheduler that has not been started yet.
pub async fn build(config: &AppConfig) -> anyhow::Result<Scheduler> {
    // 1. Store. Any failure here is fatal.
    let store = Arc::new(
        SqliteStore::new(&config.state.db_path, config.state.max_connections)
            .await
            .with_context(|| format!("Failed to open database {}", config.state.db_path))?,
    );
    store
        .health_check()
        .await
        .context("Database health check failed")?;
    info!(path = %config.state.db_path, "State store initialized");

    // 2. Seed
    seed(store.as_ref(), config).await?;

    // 3. Fetchers
    let site = Arc::new(Fetcher::new(&config.fetch).context("Failed to build site fetcher")?);
    let history =
        Arc::new(Fetcher::new(&config.history).context("Failed to build history fetcher")?);
    info!(
        site = %site.base(),
        history = %history.base(),
        "Fetchers configured"
    );

    // 4. Tasks
    let monitor: Arc<dyn MonitorStore> = store.clone();
    let ctx = Arc::new(TaskContext {
        store: monitor.clone(),
        engine: Arc::new(StateEngine::new(monitor)),
        site,
        history,
        paths: config.site.clone(),
        highscore_pages: config.highscores.pages,
        playtime_limit: config.playtime.player_limit,
    });

    let mut scheduler = Scheduler::new(store);
    for kind in TaskKind::ALL {
        let task_config = task_config(config, kind)?;
        scheduler.register(
            kind.build(ctx.clone()),
            Duration::from_secs(task_config.interval_secs),
            RetryPolicy::from_task(task_config),
            task_config.enabled,
        );
    }
    Ok(scheduler)
}

/// Run the daemon until ctrl-c or SIGTERM, then drain in-flight tasks.
pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    let scheduler = build(&config).await?;
    scheduler.start();

    shutdown_signal().await;
    info!("Shutdown requested");
    scheduler.stop().await;
    Ok(())
}

/// Execute one task immediately through its retry policy.
pub async fn run_once(config: AppConfig, name: &str) -> anyhow::Result<RunLogEntry> {
    if TaskKind::from_str(name).is_none() {
        anyhow::bail!("Unknown task '{}'", name);
    }
    let scheduler = build(&config).await?;
    scheduler.run_once(name).await
}

fn task_config(config: &AppConfig, kind: TaskKind) -> anyhow::Result<&TaskConfig> {
    config
        .tasks
        .entries()
        .into_iter()
        .find(|(name, _)| *name == kind.as_str())
        .map(|(_, task)| task)
        .ok_or_else(|| anyhow::anyhow!("No [tasks.{}] settings", kind.as_str()))
}

async fn seed(store: &dyn WorldStore, config: &AppConfig) -> anyhow::Result<()> {
    let mut server_ids = HashMap::new();
    for server in &config.servers {
        let id = store
            .upsert_server(&server.name, server.kind)
            .await
            .with_context(|| format!("Failed to seed server {}", server.name))?;
        server_ids.insert(server.name.as_str(), id);
    }
    for guild in &config.guilds {
        let server_id = server_ids
            .get(guild.server.as_str())
            .ok_or_else(|| anyhow::anyhow!("Guild '{}' references unknown server '{}'", guild.name, guild.server))?;
        store
            .upsert_guild(&guild.name, server_id, guild.ally)
            .await
            .with_context(|| format!("Failed to seed guild {}", guild.name))?;
    }
    info!(
        servers = config.servers.len(),
        guilds = config.guilds.len(),
        "Seeded worlds and guilds"
    );
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
