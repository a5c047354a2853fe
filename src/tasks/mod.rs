//! The closed set of scraping tasks.
//!
//! Every task walks a list of independent units (servers, guilds or players)
//! one at a time. A failing unit is logged and counted, never allowed to stop
//! its siblings. Only when every unit of a non-empty set fails does the
//! execution return an error, which is what engages the retry policy.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::warn;

use crate::config::SiteConfig;
use crate::engine::StateEngine;
use crate::fetch::Fetcher;
use crate::traits::MonitorStore;
use crate::types::RunStatus;

mod guild_members;
mod highscores;
mod killboard;
mod online_players;
mod playtime;

#[cfg(test)]
mod tests;

pub use guild_members::GuildMembersTask;
pub use highscores::HighscoresTask;
pub use killboard::KillboardTask;
pub use online_players::OnlinePlayersTask;
pub use playtime::PlaytimeTask;

/// Shared services handed to every task at construction.
pub struct TaskContext {
    pub store: Arc<dyn MonitorStore>,
    pub engine: Arc<StateEngine>,
    /// Game site.
    pub site: Arc<Fetcher>,
    /// Character history site used for playtime.
    pub history: Arc<Fetcher>,
    pub paths: SiteConfig,
    pub highscore_pages: u32,
    pub playtime_limit: u32,
}

/// Summary of one successful (possibly partial) execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskOutcome {
    pub units_ok: usize,
    pub units_failed: usize,
    pub warnings: usize,
    pub message: String,
}

impl TaskOutcome {
    pub fn status(&self) -> RunStatus {
        if self.units_failed == 0 && self.warnings == 0 {
            RunStatus::Success
        } else {
            RunStatus::Warning
        }
    }
}

#[async_trait]
pub trait ScrapeTask: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute(&self) -> anyhow::Result<TaskOutcome>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    GuildMembers,
    OnlinePlayers,
    Killboard,
    Highscores,
    Playtime,
}

impl TaskKind {
    pub const ALL: [TaskKind; 5] = [
        TaskKind::GuildMembers,
        TaskKind::OnlinePlayers,
        TaskKind::Killboard,
        TaskKind::Highscores,
        TaskKind::Playtime,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::GuildMembers => "guild_members",
            TaskKind::OnlinePlayers => "online_players",
            TaskKind::Killboard => "killboard",
            TaskKind::Highscores => "highscores",
            TaskKind::Playtime => "playtime",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }

    pub fn build(self, ctx: Arc<TaskContext>) -> Arc<dyn ScrapeTask> {
        match self {
            TaskKind::GuildMembers => Arc::new(GuildMembersTask::new(ctx)),
            TaskKind::OnlinePlayers => Arc::new(OnlinePlayersTask::new(ctx)),
            TaskKind::Killboard => Arc::new(KillboardTask::new(ctx)),
            TaskKind::Highscores => Arc::new(HighscoresTask::new(ctx)),
            TaskKind::Playtime => Arc::new(PlaytimeTask::new(ctx)),
        }
    }
}

/// One instance of every task, sharing `ctx`.
pub fn registry(ctx: Arc<TaskContext>) -> Vec<Arc<dyn ScrapeTask>> {
    TaskKind::ALL
        .into_iter()
        .map(|kind| kind.build(ctx.clone()))
        .collect()
}

/// Per-unit bookkeeping for one execution.
#[derive(Debug, Default)]
pub(crate) struct Tally {
    ok: usize,
    failed: usize,
    warnings: usize,
    notes: Vec<String>,
    first_error: Option<String>,
}

impl Tally {
    pub(crate) fn ok(&mut self, note: impl Into<String>) {
        self.ok += 1;
        let note = note.into();
        if !note.is_empty() {
            self.notes.push(note);
        }
    }

    pub(crate) fn failed(&mut self, task: &str, unit: &str, err: &anyhow::Error) {
        warn!(task, unit, error = %format!("{:#}", err), "Unit failed; continuing with the rest");
        self.failed += 1;
        if self.first_error.is_none() {
            self.first_error = Some(format!("{}: {:#}", unit, err));
        }
    }

    pub(crate) fn warning(&mut self, note: impl Into<String>) {
        self.warnings += 1;
        self.notes.push(note.into());
    }

    pub(crate) fn finish(self, units: &str) -> anyhow::Result<TaskOutcome> {
        if self.ok == 0 && self.failed > 0 {
            anyhow::bail!(
                "all {} {} failed; first error: {}",
                self.failed,
                units,
                self.first_error.unwrap_or_default()
            );
        }
        let mut message = format!("{} {} ok, {} failed", self.ok, units, self.failed);
        if !self.notes.is_empty() {
            message.push_str(": ");
            message.push_str(&self.notes.join("; "));
        }
        Ok(TaskOutcome {
            units_ok: self.ok,
            units_failed: self.failed,
            warnings: self.warnings,
            message,
        })
    }
}
