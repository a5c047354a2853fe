use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use super::{ScrapeTask, Tally, TaskContext, TaskOutcome};
use crate::extract;
use crate::traits::{Guild, PlayerUpsert};

/// Captures the roster of every configured guild and links members to it.
pub struct GuildMembersTask {
    ctx: Arc<TaskContext>,
}

impl GuildMembersTask {
    pub fn new(ctx: Arc<TaskContext>) -> Self {
        Self { ctx }
    }

    /// Returns the number of members stored, or `None` when the guild is not
    /// listed on its world.
    async fn sync_guild(&self, guild: &Guild) -> anyhow::Result<Option<usize>> {
        let ctx = &self.ctx;
        let list_url = ctx.site.endpoint(&ctx.paths.guilds_path)?;
        let form = vec![
            (ctx.paths.server_field.clone(), guild.server_name.clone()),
            (ctx.paths.guild_field.clone(), guild.name.clone()),
        ];
        let list = ctx.site.post_form(list_url, &form).await?;

        let Some(href) = extract::find_guild_link(&list.body, &guild.name) else {
            return Ok(None);
        };
        let guild_url = ctx.site.endpoint(&href)?;
        let page = ctx.site.get(guild_url).await?;
        debug!(guild = %guild.name, url = %page.url, "Guild page fetched");

        let roster = extract::guild_roster(&page.body);
        if roster.skipped > 0 {
            warn!(guild = %guild.name, skipped = roster.skipped, "Skipped malformed roster rows");
        }

        let snapshot_time = Utc::now();
        ctx.store
            .insert_roster_snapshot(&guild.id, &roster.rows, snapshot_time)
            .await?;
        for member in &roster.rows {
            ctx.store
                .upsert_player(&PlayerUpsert {
                    name: member.player_name.clone(),
                    server_id: guild.server_id.clone(),
                    level: None,
                    vocation: Some(member.vocation),
                    guild_id: Some(Some(guild.id.clone())),
                })
                .await
                .with_context(|| format!("Failed to store member {}", member.player_name))?;
        }

        // An empty parse is more likely a layout change than a disbanded guild.
        if !roster.rows.is_empty() {
            let current: Vec<String> = roster.rows.iter().map(|m| m.player_name.clone()).collect();
            let departed = ctx
                .store
                .unlink_departed_members(&guild.id, &current)
                .await
                .context("Failed to unlink departed members")?;
            if departed > 0 {
                info!(guild = %guild.name, departed, "Unlinked players no longer on the roster");
            }
        }
        Ok(Some(roster.rows.len()))
    }
}

#[async_trait]
impl ScrapeTask for GuildMembersTask {
    fn name(&self) -> &'static str {
        "guild_members"
    }

    async fn execute(&self) -> anyhow::Result<TaskOutcome> {
        let guilds = self.ctx.store.list_guilds().await?;
        if guilds.is_empty() {
            warn!("No guilds configured for scraping");
        }

        let mut tally = Tally::default();
        for guild in &guilds {
            match self.sync_guild(guild).await {
                Ok(Some(count)) => {
                    info!(guild = %guild.name, server = %guild.server_name, members = count, "Guild roster captured");
                    tally.ok(format!("{}: {} members", guild.name, count));
                }
                Ok(None) => {
                    warn!(guild = %guild.name, server = %guild.server_name, "Guild not found on server");
                    tally.warning(format!("{} not found on {}", guild.name, guild.server_name));
                }
                Err(e) => tally.failed(self.name(), &guild.name, &e),
            }
        }
        tally.finish("guilds")
    }
}
