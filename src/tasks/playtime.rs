use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Url;
use tracing::{debug, info, warn};

use super::{ScrapeTask, Tally, TaskContext, TaskOutcome};
use crate::extract;
use crate::traits::PlayerRef;

/// Folds each guild member's online-time history into the hour-of-week
/// histogram.
pub struct PlaytimeTask {
    ctx: Arc<TaskContext>,
}

enum HistoryResult {
    Recorded { samples: usize, buckets: usize },
    NoSection,
    UnknownPlayer,
}

impl PlaytimeTask {
    pub fn new(ctx: Arc<TaskContext>) -> Self {
        Self { ctx }
    }

    fn character_url(&self, name: &str) -> anyhow::Result<Url> {
        let mut url = self.ctx.history.endpoint(&self.ctx.paths.character_path)?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("History base URL cannot carry a path"))?
            .pop_if_empty()
            .push(name);
        Ok(url)
    }

    async fn sync_player(&self, player: &PlayerRef) -> anyhow::Result<HistoryResult> {
        let url = self.character_url(&player.name)?;
        let page = match self.ctx.history.get(url).await {
            Ok(page) => page,
            Err(e) if e.is_not_found() => return Ok(HistoryResult::UnknownPlayer),
            Err(e) => return Err(e.into()),
        };

        let Some(history) = extract::playtime_history(&page.body) else {
            return Ok(HistoryResult::NoSection);
        };
        if history.skipped > 0 {
            debug!(player = %player.name, skipped = history.skipped, "Skipped unreadable history rows");
        }

        let buckets = extract::bucket_playtime(&history.rows);
        let now = Utc::now();
        for (bucket, count) in &buckets {
            self.ctx
                .store
                .add_playtime(&player.id, *bucket, *count, now)
                .await
                .with_context(|| {
                    format!(
                        "Failed to add playtime bucket {}h/day {} for {}",
                        bucket.hour_of_day, bucket.day_of_week, player.name
                    )
                })?;
        }
        Ok(HistoryResult::Recorded {
            samples: history.rows.len(),
            buckets: buckets.len(),
        })
    }
}

#[async_trait]
impl ScrapeTask for PlaytimeTask {
    fn name(&self) -> &'static str {
        "playtime"
    }

    async fn execute(&self) -> anyhow::Result<TaskOutcome> {
        let players = self
            .ctx
            .store
            .list_guild_players(self.ctx.playtime_limit)
            .await?;
        info!(players = players.len(), "Collecting playtime history");

        let mut tally = Tally::default();
        for player in &players {
            match self.sync_player(player).await {
                Ok(HistoryResult::Recorded { samples, buckets }) => {
                    debug!(player = %player.name, samples, buckets, "Playtime history recorded");
                    tally.ok("");
                }
                Ok(HistoryResult::UnknownPlayer) => {
                    debug!(player = %player.name, "Player not known to the history site");
                    tally.ok("");
                }
                Ok(HistoryResult::NoSection) => {
                    warn!(player = %player.name, "No playtime history section on character page");
                    tally.warning(format!("{}: no history section", player.name));
                }
                Err(e) => tally.failed(self.name(), &player.name, &e),
            }
        }
        tally.finish("players")
    }
}
