use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Timelike, Utc};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use super::parse::{
    parse_experience, parse_level, parse_player_name, parse_site_time, parse_vocation,
};
use super::{Extracted, HighscoreEntry, OnlinePlayer, RowError, ScrapedDeath};
use crate::traits::{PlaytimeBucket, RosterEntry};

static TABLE: Lazy<Selector> = Lazy::new(|| Selector::parse("table").expect("table selector"));
static ROW: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").expect("row selector"));
static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("anchor selector"));
static HEADING: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h1, h2, h3, h4").expect("heading selector"));

const PLAYTIME_HEADINGS: [&str; 2] = ["Online Time History", "Histórico"];

/// Whitespace-collapsed text content of an element.
fn text_of(el: ElementRef<'_>) -> String {
    let raw: String = el.text().collect();
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn nearest_table(el: ElementRef<'_>) -> Option<ElementRef<'_>> {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|a| a.value().name() == "table")
}

/// Cell texts of every data row under `scope`.
///
/// The first row of each table is its header. Rows made of `th` cells and
/// layout rows whose cells hold another table are ignored too. Rows of a
/// nested table belong to that table only.
fn data_rows(scope: ElementRef<'_>) -> Vec<Vec<String>> {
    let mut out = Vec::new();
    for table in scope.select(&TABLE) {
        let mut header_pending = true;
        for row in table.select(&ROW) {
            if nearest_table(row) != Some(table) {
                continue;
            }
            let is_header = std::mem::replace(&mut header_pending, false);

            let cells: Vec<ElementRef<'_>> = row
                .children()
                .filter_map(ElementRef::wrap)
                .filter(|c| matches!(c.value().name(), "td" | "th"))
                .collect();
            if is_header
                || cells.is_empty()
                || cells.iter().any(|c| c.value().name() == "th")
                || cells.iter().any(|c| c.select(&TABLE).next().is_some())
            {
                continue;
            }
            out.push(cells.into_iter().map(text_of).collect());
        }
    }
    out
}

fn extract_rows<T>(
    page: &'static str,
    rows: Vec<Vec<String>>,
    min_cells: usize,
    parse: impl Fn(&[String]) -> Result<T, RowError>,
) -> Extracted<T> {
    let mut out = Extracted::default();
    for cells in rows {
        let parsed = if cells.len() < min_cells {
            Err(RowError::TooFewCells {
                expected: min_cells,
                found: cells.len(),
            })
        } else {
            parse(cells.as_slice())
        };
        match parsed {
            Ok(row) => out.rows.push(row),
            Err(e) => {
                debug!(page, error = %e, "Skipping row");
                out.skipped += 1;
            }
        }
    }
    out
}

fn required_name(cell: &str) -> Result<String, RowError> {
    let name = parse_player_name(cell);
    if name.is_empty() {
        Err(RowError::MissingName)
    } else {
        Ok(name)
    }
}

/// `name | level | vocation` rows of a world's online list.
pub fn online_players(html: &str) -> Extracted<OnlinePlayer> {
    let doc = Html::parse_document(html);
    extract_rows("online", data_rows(doc.root_element()), 3, |cells| {
        let name = required_name(&cells[0])?;
        let level = parse_level(&cells[1]);
        if level == 0 {
            return Err(RowError::InvalidLevel);
        }
        Ok(OnlinePlayer {
            name,
            level,
            vocation: parse_vocation(&cells[2]),
        })
    })
}

/// `rank | name | level | experience` rows of one highscores page.
pub fn highscores(html: &str) -> Extracted<HighscoreEntry> {
    let doc = Html::parse_document(html);
    extract_rows("highscores", data_rows(doc.root_element()), 4, |cells| {
        let name = required_name(&cells[1])?;
        let level = parse_level(&cells[2]);
        if level == 0 {
            return Err(RowError::InvalidLevel);
        }
        Ok(HighscoreEntry {
            rank: cells[0].trim().trim_end_matches('.').parse().ok(),
            name,
            level,
            experience: parse_experience(&cells[3]),
        })
    })
}

/// `victim | killer | time` rows of the latest-deaths page.
pub fn deaths(html: &str) -> Extracted<ScrapedDeath> {
    let doc = Html::parse_document(html);
    extract_rows("deaths", data_rows(doc.root_element()), 3, |cells| {
        let victim_name = required_name(&cells[0])?;
        let killer = cells[1].trim();
        let death_time =
            parse_site_time(&cells[2]).ok_or_else(|| RowError::InvalidTime(cells[2].clone()))?;
        Ok(ScrapedDeath {
            victim_name,
            killer_name: (!killer.is_empty()).then(|| killer.to_string()),
            death_time,
        })
    })
}

/// `name | vocation` rows of a guild page.
pub fn guild_roster(html: &str) -> Extracted<RosterEntry> {
    let doc = Html::parse_document(html);
    extract_rows("guild", data_rows(doc.root_element()), 2, |cells| {
        Ok(RosterEntry {
            player_name: required_name(&cells[0])?,
            vocation: parse_vocation(&cells[1]),
        })
    })
}

/// `href` of the first link whose text is exactly `guild_name`.
pub fn find_guild_link(html: &str, guild_name: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let wanted = guild_name.trim();
    doc.select(&ANCHOR)
        .find(|a| text_of(*a) == wanted)
        .and_then(|a| a.value().attr("href"))
        .map(str::to_string)
}

/// Timestamps listed in a character's online-time history section, or `None`
/// when the page has no such section.
pub fn playtime_history(html: &str) -> Option<Extracted<DateTime<Utc>>> {
    let doc = Html::parse_document(html);
    let heading = doc.select(&HEADING).find(|h| {
        let text = text_of(*h);
        PLAYTIME_HEADINGS.iter().any(|marker| text.contains(marker))
    })?;
    let section = heading.parent().and_then(ElementRef::wrap)?;

    Some(extract_rows("playtime", data_rows(section), 2, |cells| {
        parse_site_time(&cells[0]).ok_or_else(|| RowError::InvalidTime(cells[0].clone()))
    }))
}

/// Count timestamps per (UTC hour, weekday with Sunday = 0).
pub fn bucket_playtime(times: &[DateTime<Utc>]) -> BTreeMap<PlaytimeBucket, u32> {
    let mut buckets = BTreeMap::new();
    for t in times {
        let bucket = PlaytimeBucket {
            hour_of_day: t.hour() as u8,
            day_of_week: t.weekday().num_days_from_sunday() as u8,
        };
        *buckets.entry(bucket).or_insert(0) += 1;
    }
    buckets
}
