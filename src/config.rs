use serde::Deserialize;
use std::path::Path;

use crate::types::ServerKind;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default = "default_history_fetch")]
    pub history: FetchConfig,
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub tasks: TasksConfig,
    #[serde(default)]
    pub highscores: HighscoresConfig,
    #[serde(default)]
    pub playtime: PlaytimeConfig,
    #[serde(default)]
    pub servers: Vec<ServerSeed>,
    #[serde(default)]
    pub guilds: Vec<GuildSeed>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            state: StateConfig::default(),
            fetch: FetchConfig::default(),
            history: default_history_fetch(),
            site: SiteConfig::default(),
            tasks: TasksConfig::default(),
            highscores: HighscoresConfig::default(),
            playtime: PlaytimeConfig::default(),
            servers: Vec::new(),
            guilds: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StateConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_db_path() -> String {
    "guild_monitor.db".to_string()
}
fn default_max_connections() -> u32 {
    5
}

/// HTTP settings for one scraped origin. Each origin gets its own client and
/// cookie store.
#[derive(Debug, Deserialize, Clone)]
pub struct FetchConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Lower bound of the randomized pause between two requests to this origin.
    #[serde(default = "default_delay_min_ms")]
    pub delay_min_ms: u64,
    #[serde(default = "default_delay_max_ms")]
    pub delay_max_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            max_redirects: default_max_redirects(),
            user_agent: default_user_agent(),
            delay_min_ms: default_delay_min_ms(),
            delay_max_ms: default_delay_max_ms(),
        }
    }
}

fn default_history_fetch() -> FetchConfig {
    FetchConfig {
        base_url: "https://rubinothings.com".to_string(),
        ..FetchConfig::default()
    }
}

fn default_base_url() -> String {
    "https://rubinot.com".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_redirects() -> usize {
    5
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string()
}
fn default_delay_min_ms() -> u64 {
    500
}
fn default_delay_max_ms() -> u64 {
    3000
}

/// Page paths and form field names of the target site.
#[derive(Debug, Deserialize, Clone)]
pub struct SiteConfig {
    #[serde(default = "default_worlds_path")]
    pub worlds_path: String,
    #[serde(default = "default_guilds_path")]
    pub guilds_path: String,
    #[serde(default = "default_highscores_path")]
    pub highscores_path: String,
    #[serde(default = "default_deaths_path")]
    pub deaths_path: String,
    #[serde(default = "default_character_path")]
    pub character_path: String,
    #[serde(default = "default_world_query")]
    pub world_query: String,
    #[serde(default = "default_server_field")]
    pub server_field: String,
    #[serde(default = "default_guild_field")]
    pub guild_field: String,
    #[serde(default = "default_page_field")]
    pub page_field: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            worlds_path: default_worlds_path(),
            guilds_path: default_guilds_path(),
            highscores_path: default_highscores_path(),
            deaths_path: default_deaths_path(),
            character_path: default_character_path(),
            world_query: default_world_query(),
            server_field: default_server_field(),
            guild_field: default_guild_field(),
            page_field: default_page_field(),
        }
    }
}

fn default_worlds_path() -> String {
    "/?subtopic=worlds".to_string()
}
fn default_guilds_path() -> String {
    "/?subtopic=guilds".to_string()
}
fn default_highscores_path() -> String {
    "/?subtopic=highscores".to_string()
}
fn default_deaths_path() -> String {
    "/?subtopic=latestdeaths".to_string()
}
fn default_character_path() -> String {
    "/character".to_string()
}
fn default_world_query() -> String {
    "world".to_string()
}
fn default_server_field() -> String {
    "server".to_string()
}
fn default_guild_field() -> String {
    "guild".to_string()
}
fn default_page_field() -> String {
    "page".to_string()
}

/// Cadence and retry settings for one scheduled task.
#[derive(Debug, Deserialize, Clone)]
pub struct TaskConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub interval_secs: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
    #[serde(default = "default_retry_max_ms")]
    pub retry_max_ms: u64,
}

impl TaskConfig {
    pub fn every(interval_secs: u64) -> Self {
        Self {
            enabled: true,
            interval_secs,
            retry_attempts: default_retry_attempts(),
            retry_base_ms: default_retry_base_ms(),
            retry_max_ms: default_retry_max_ms(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_retry_base_ms() -> u64 {
    1000
}
fn default_retry_max_ms() -> u64 {
    30_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct TasksConfig {
    #[serde(default = "default_guild_members_task")]
    pub guild_members: TaskConfig,
    #[serde(default = "default_online_players_task")]
    pub online_players: TaskConfig,
    #[serde(default = "default_killboard_task")]
    pub killboard: TaskConfig,
    #[serde(default = "default_highscores_task")]
    pub highscores: TaskConfig,
    #[serde(default = "default_playtime_task")]
    pub playtime: TaskConfig,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            guild_members: default_guild_members_task(),
            online_players: default_online_players_task(),
            killboard: default_killboard_task(),
            highscores: default_highscores_task(),
            playtime: default_playtime_task(),
        }
    }
}

fn default_guild_members_task() -> TaskConfig {
    TaskConfig::every(12 * 60 * 60)
}
fn default_online_players_task() -> TaskConfig {
    TaskConfig::every(30)
}
fn default_killboard_task() -> TaskConfig {
    TaskConfig::every(30)
}
fn default_highscores_task() -> TaskConfig {
    TaskConfig::every(60)
}
fn default_playtime_task() -> TaskConfig {
    TaskConfig::every(12 * 60 * 60)
}

#[derive(Debug, Deserialize, Clone)]
pub struct HighscoresConfig {
    /// Number of ranked pages sampled per server. Players below the last
    /// sampled rank never get experience snapshots.
    #[serde(default = "default_highscore_pages")]
    pub pages: u32,
}

impl Default for HighscoresConfig {
    fn default() -> Self {
        Self {
            pages: default_highscore_pages(),
        }
    }
}

fn default_highscore_pages() -> u32 {
    15
}

#[derive(Debug, Deserialize, Clone)]
pub struct PlaytimeConfig {
    #[serde(default = "default_player_limit")]
    pub player_limit: u32,
}

impl Default for PlaytimeConfig {
    fn default() -> Self {
        Self {
            player_limit: default_player_limit(),
        }
    }
}

fn default_player_limit() -> u32 {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSeed {
    pub name: String,
    #[serde(default)]
    pub kind: ServerKind,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GuildSeed {
    pub name: String,
    pub server: String,
    #[serde(default)]
    pub ally: bool,
}

impl AppConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, or fall back to defaults when the file does not exist.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        for (label, fetch) in [("fetch", &self.fetch), ("history", &self.history)] {
            if fetch.delay_min_ms > fetch.delay_max_ms {
                anyhow::bail!(
                    "[{}] delay_min_ms ({}) exceeds delay_max_ms ({})",
                    label,
                    fetch.delay_min_ms,
                    fetch.delay_max_ms
                );
            }
            if fetch.timeout_secs == 0 {
                anyhow::bail!("[{}] timeout_secs must be positive", label);
            }
        }

        for (name, task) in self.tasks.entries() {
            if task.interval_secs == 0 {
                anyhow::bail!("[tasks.{}] interval_secs must be positive", name);
            }
            if task.retry_attempts == 0 {
                anyhow::bail!("[tasks.{}] retry_attempts must be at least 1", name);
            }
        }

        if self.highscores.pages == 0 {
            anyhow::bail!("[highscores] pages must be at least 1");
        }

        for guild in &self.guilds {
            if !self.servers.iter().any(|s| s.name == guild.server) {
                anyhow::bail!(
                    "Guild '{}' references unknown server '{}'",
                    guild.name,
                    guild.server
                );
            }
        }

        Ok(())
    }
}

impl TasksConfig {
    /// Task settings keyed by their config table name.
    pub fn entries(&self) -> [(&'static str, &TaskConfig); 5] {
        [
            ("guild_members", &self.guild_members),
            ("online_players", &self.online_players),
            ("killboard", &self.killboard),
            ("highscores", &self.highscores),
            ("playtime", &self.playtime),
        ]
    }
}
