//! HTML to typed rows.
//!
//! Page parsers work on whole documents but fail per row: a malformed row is
//! counted in [`Extracted::skipped`] and the rest of the page still parses.
//! Documents are parsed synchronously and only owned values leave this module.

use chrono::{DateTime, Utc};
use num_bigint::BigInt;

use crate::types::Vocation;

mod parse;
mod tables;

pub use parse::{parse_experience, parse_level, parse_player_name, parse_site_time, parse_vocation};
pub use tables::{
    bucket_playtime, deaths, find_guild_link, guild_roster, highscores, online_players,
    playtime_history,
};

/// Rows parsed from one page plus the number of rows that were dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted<T> {
    pub rows: Vec<T>,
    pub skipped: usize,
}

impl<T> Default for Extracted<T> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            skipped: 0,
        }
    }
}

impl<T> Extracted<T> {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Why a single table row was dropped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RowError {
    #[error("expected at least {expected} cells, found {found}")]
    TooFewCells { expected: usize, found: usize },
    #[error("empty player name")]
    MissingName,
    #[error("level is zero")]
    InvalidLevel,
    #[error("unparsable time '{0}'")]
    InvalidTime(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnlinePlayer {
    pub name: String,
    pub level: u32,
    pub vocation: Vocation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighscoreEntry {
    pub rank: Option<u32>,
    pub name: String,
    pub level: u32,
    pub experience: BigInt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapedDeath {
    pub victim_name: String,
    /// `None` when the killer cell is empty (environment deaths).
    pub killer_name: Option<String>,
    pub death_time: DateTime<Utc>,
}
