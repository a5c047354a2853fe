use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use super::{ScrapeTask, Tally, TaskContext, TaskOutcome};
use crate::engine::SweepSummary;
use crate::extract;
use crate::traits::Server;

/// Samples each world's online list and refreshes online flags.
pub struct OnlinePlayersTask {
    ctx: Arc<TaskContext>,
}

impl OnlinePlayersTask {
    pub fn new(ctx: Arc<TaskContext>) -> Self {
        Self { ctx }
    }

    async fn sample_server(&self, server: &Server) -> anyhow::Result<SweepSummary> {
        let ctx = &self.ctx;
        let url = ctx.site.endpoint_with_query(
            &ctx.paths.worlds_path,
            &[(ctx.paths.world_query.as_str(), server.name.as_str())],
        )?;
        let page = ctx.site.get(url).await?;

        let listing = extract::online_players(&page.body);
        if listing.skipped > 0 {
            warn!(server = %server.name, skipped = listing.skipped, "Skipped malformed online rows");
        }
        ctx.engine
            .sweep_online(&server.id, &listing.rows, Utc::now())
            .await
    }
}

#[async_trait]
impl ScrapeTask for OnlinePlayersTask {
    fn name(&self) -> &'static str {
        "online_players"
    }

    async fn execute(&self) -> anyhow::Result<TaskOutcome> {
        let servers = self.ctx.store.list_servers().await?;
        let mut tally = Tally::default();
        for server in &servers {
            match self.sample_server(server).await {
                Ok(summary) => {
                    info!(
                        server = %server.name,
                        online = summary.online,
                        marked_offline = summary.marked_offline,
                        "Online list sampled"
                    );
                    if summary.failed > 0 {
                        tally.warning(format!(
                            "{}: {} players could not be flagged online",
                            server.name, summary.failed
                        ));
                    }
                    tally.ok(format!("{}: {} online", server.name, summary.online));
                }
                Err(e) => tally.failed(self.name(), &server.name, &e),
            }
        }
        tally.finish("servers")
    }
}
