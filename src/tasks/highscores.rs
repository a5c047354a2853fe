use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use super::{ScrapeTask, Tally, TaskContext, TaskOutcome};
use crate::engine::Transition;
use crate::extract::{self, HighscoreEntry};
use crate::traits::{PlayerUpsert, Server};

/// Reads the top highscore pages of every world and feeds each entry's
/// experience to the state engine.
pub struct HighscoresTask {
    ctx: Arc<TaskContext>,
}

#[derive(Default)]
struct RankingPass {
    entries: usize,
    hunting: usize,
    failed: usize,
    truncated: bool,
}

impl HighscoresTask {
    pub fn new(ctx: Arc<TaskContext>) -> Self {
        Self { ctx }
    }

    /// Pages `1..=highscore_pages`, stopping at the first empty page. A failure
    /// on the first page fails the server; a later one ends the walk early.
    ///
    /// The ranking can shift between page requests, so a player may show up on
    /// two pages. Only the first (higher-ranked) occurrence is kept.
    async fn fetch_ranking(&self, server: &Server) -> anyhow::Result<(Vec<HighscoreEntry>, bool)> {
        let ctx = &self.ctx;
        let mut entries = Vec::new();
        let mut seen = HashSet::new();
        for page_no in 1..=ctx.highscore_pages {
            let url = ctx.site.endpoint(&ctx.paths.highscores_path)?;
            let form = vec![
                (ctx.paths.server_field.clone(), server.name.clone()),
                (ctx.paths.page_field.clone(), page_no.to_string()),
            ];
            let page = match ctx.site.post_form(url, &form).await {
                Ok(page) => page,
                Err(e) if page_no == 1 => return Err(e.into()),
                Err(e) => {
                    warn!(server = %server.name, page = page_no, error = %e, "Highscores page failed; keeping earlier pages");
                    return Ok((entries, true));
                }
            };

            let parsed = extract::highscores(&page.body);
            if parsed.skipped > 0 {
                warn!(server = %server.name, page = page_no, skipped = parsed.skipped, "Skipped malformed highscore rows");
            }
            if parsed.is_empty() {
                debug!(server = %server.name, page = page_no, "Empty highscores page; end of ranking");
                break;
            }
            for entry in parsed.rows {
                if seen.insert(entry.name.clone()) {
                    entries.push(entry);
                } else {
                    debug!(
                        server = %server.name,
                        player = %entry.name,
                        rank = ?entry.rank,
                        page = page_no,
                        "Player listed twice while the ranking moved; keeping the first entry"
                    );
                }
            }
        }
        Ok((entries, false))
    }

    async fn sample_server(&self, server: &Server) -> anyhow::Result<RankingPass> {
        let (entries, truncated) = self.fetch_ranking(server).await?;
        let mut pass = RankingPass {
            entries: entries.len(),
            truncated,
            ..RankingPass::default()
        };

        let sampled_at = Utc::now();
        for entry in entries {
            let HighscoreEntry {
                name,
                level,
                experience,
                ..
            } = entry;
            let result = async {
                let player_id = self
                    .ctx
                    .store
                    .upsert_player(&PlayerUpsert {
                        name: name.clone(),
                        server_id: server.id.clone(),
                        level: Some(level),
                        ..PlayerUpsert::default()
                    })
                    .await?;
                self.ctx
                    .engine
                    .record_sample(&player_id, level, experience, sampled_at)
                    .await
            }
            .await;

            match result {
                Ok(Transition::Opened { .. } | Transition::Extended { .. }) => pass.hunting += 1,
                Ok(_) => {}
                Err(e) => {
                    warn!(server = %server.name, player = %name, error = %e, "Failed to record experience sample");
                    pass.failed += 1;
                }
            }
        }
        Ok(pass)
    }
}

#[async_trait]
impl ScrapeTask for HighscoresTask {
    fn name(&self) -> &'static str {
        "highscores"
    }

    async fn execute(&self) -> anyhow::Result<TaskOutcome> {
        let servers = self.ctx.store.list_servers().await?;
        let mut tally = Tally::default();
        for server in &servers {
            match self.sample_server(server).await {
                Ok(pass) => {
                    info!(
                        server = %server.name,
                        entries = pass.entries,
                        hunting = pass.hunting,
                        "Highscores sampled"
                    );
                    if pass.truncated {
                        tally.warning(format!("{}: ranking truncated by a failed page", server.name));
                    }
                    if pass.failed > 0 {
                        tally.warning(format!("{}: {} samples not recorded", server.name, pass.failed));
                    }
                    tally.ok(format!(
                        "{}: {} entries, {} hunting",
                        server.name, pass.entries, pass.hunting
                    ));
                }
                Err(e) => tally.failed(self.name(), &server.name, &e),
            }
        }
        tally.finish("servers")
    }
}
