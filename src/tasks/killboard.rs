use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use super::{ScrapeTask, Tally, TaskContext, TaskOutcome};
use crate::extract;
use crate::traits::Server;

/// Ingests each world's latest deaths.
pub struct KillboardTask {
    ctx: Arc<TaskContext>,
}

struct KillboardPass {
    seen: usize,
    new: usize,
    failed: usize,
}

impl KillboardTask {
    pub fn new(ctx: Arc<TaskContext>) -> Self {
        Self { ctx }
    }

    async fn scan_server(&self, server: &Server) -> anyhow::Result<KillboardPass> {
        let ctx = &self.ctx;
        let url = ctx.site.endpoint(&ctx.paths.deaths_path)?;
        let form = vec![(ctx.paths.server_field.clone(), server.name.clone())];
        let page = ctx.site.post_form(url, &form).await?;

        let deaths = extract::deaths(&page.body);
        if deaths.skipped > 0 {
            warn!(server = %server.name, skipped = deaths.skipped, "Skipped malformed death rows");
        }

        let mut pass = KillboardPass {
            seen: deaths.rows.len(),
            new: 0,
            failed: 0,
        };
        for death in &deaths.rows {
            match ctx.engine.ingest_death(&server.id, death).await {
                Ok(true) => pass.new += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(server = %server.name, victim = %death.victim_name, error = %e, "Failed to store death");
                    pass.failed += 1;
                }
            }
        }
        Ok(pass)
    }
}

#[async_trait]
impl ScrapeTask for KillboardTask {
    fn name(&self) -> &'static str {
        "killboard"
    }

    async fn execute(&self) -> anyhow::Result<TaskOutcome> {
        let servers = self.ctx.store.list_servers().await?;
        let mut tally = Tally::default();
        for server in &servers {
            match self.scan_server(server).await {
                Ok(pass) => {
                    info!(server = %server.name, listed = pass.seen, new = pass.new, "Killboard scanned");
                    if pass.failed > 0 {
                        tally.warning(format!("{}: {} deaths not stored", server.name, pass.failed));
                    }
                    tally.ok(format!("{}: {} new deaths", server.name, pass.new));
                }
                Err(e) => tally.failed(self.name(), &server.name, &e),
            }
        }
        tally.finish("servers")
    }
}
