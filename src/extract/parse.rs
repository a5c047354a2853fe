//! Cell-level normalization shared by every page parser.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use num_bigint::BigInt;
use num_traits::Zero;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::Vocation;

static TITLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\([^)]*\)").expect("title regex"));

static SITE_TIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^([A-Za-z]{3})[A-Za-z]*\.?\s+(\d{1,2}),?\s+(\d{4}),?\s+(\d{1,2}):(\d{2}):(\d{2})(?:\s+([A-Za-z]{3,4}))?$",
    )
    .expect("site time regex")
});

/// `"Aeon (Guild Leader)"` becomes `"Aeon"`. Every parenthesized group is
/// removed, not only a trailing one.
pub fn parse_player_name(raw: &str) -> String {
    TITLE_RE.replace_all(raw, "").trim().to_string()
}

/// Digits-only level parse. Anything without a usable number reads as level 1.
pub fn parse_level(raw: &str) -> u32 {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(1)
}

pub fn parse_vocation(raw: &str) -> Vocation {
    Vocation::from_label(raw)
}

/// Digits-only experience parse into an exact integer. Unparsable reads as zero.
pub fn parse_experience(raw: &str) -> BigInt {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return BigInt::zero();
    }
    digits.parse().unwrap_or_else(|_| BigInt::zero())
}

/// Timestamps as the game sites print them, normalized to UTC.
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS` (UTC) and
/// `Mon DD YYYY, HH:MM:SS [TZ]` where TZ is CET, CEST, UTC or GMT (absent
/// means UTC).
pub fn parse_site_time(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&naive));
    }

    let caps = SITE_TIME_RE.captures(raw)?;
    let month = month_number(&caps[1])?;
    let day: u32 = caps[2].parse().ok()?;
    let year: i32 = caps[3].parse().ok()?;
    let hour: u32 = caps[4].parse().ok()?;
    let minute: u32 = caps[5].parse().ok()?;
    let second: u32 = caps[6].parse().ok()?;
    let offset_hours = match caps.get(7).map(|m| m.as_str().to_ascii_uppercase()) {
        None => 0,
        Some(tz) => match tz.as_str() {
            "UTC" | "GMT" => 0,
            "CET" => 1,
            "CEST" => 2,
            _ => return None,
        },
    };

    let naive = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)?;
    let offset = FixedOffset::east_opt(offset_hours * 3600)?;
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

fn month_number(abbr: &str) -> Option<u32> {
    let m = match abbr.to_ascii_lowercase().as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(m)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn titles_are_stripped_from_names() {
        assert_eq!(parse_player_name("Aeon (Guild Leader)"), "Aeon");
        assert_eq!(parse_player_name("  Sir Bob (Vice Leader) "), "Sir Bob");
        assert_eq!(parse_player_name("Twin (a) Names (b)"), "Twin Names");
        assert_eq!(parse_player_name("Plain"), "Plain");
        assert_eq!(parse_player_name("(Only Title)"), "");
    }

    #[test]
    fn level_keeps_digits_and_defaults_to_one() {
        assert_eq!(parse_level("1,024"), 1024);
        assert_eq!(parse_level(" 87 "), 87);
        assert_eq!(parse_level("Level"), 1);
        assert_eq!(parse_level(""), 1);
    }

    #[test]
    fn experience_is_exact_beyond_float_precision() {
        assert_eq!(
            parse_experience("12,345,678,901"),
            BigInt::from(12_345_678_901u64)
        );
        // 2^53 + 1 is not representable as an f64.
        assert_eq!(
            parse_experience("9.007.199.254.740.993"),
            BigInt::from_str("9007199254740993").unwrap()
        );
        assert_eq!(
            parse_experience("123456789012345678901234567890"),
            BigInt::from_str("123456789012345678901234567890").unwrap()
        );
        assert_eq!(parse_experience("n/a"), BigInt::zero());
    }

    #[test]
    fn site_times_in_every_format() {
        let expected = Utc.with_ymd_and_hms(2026, 1, 27, 13, 30, 0).unwrap();
        assert_eq!(parse_site_time("Jan 27 2026, 14:30:00 CET"), Some(expected));
        assert_eq!(parse_site_time("2026-01-27T13:30:00Z"), Some(expected));
        assert_eq!(parse_site_time("2026-01-27 13:30:00"), Some(expected));
        assert_eq!(parse_site_time("Jan 27 2026, 13:30:00"), Some(expected));
        assert_eq!(
            parse_site_time("Jul 01 2026, 22:00:00 CEST"),
            Some(Utc.with_ymd_and_hms(2026, 7, 1, 20, 0, 0).unwrap())
        );
    }

    #[test]
    fn unusable_times_are_rejected() {
        assert_eq!(parse_site_time(""), None);
        assert_eq!(parse_site_time("yesterday"), None);
        assert_eq!(parse_site_time("Foo 27 2026, 14:30:00 CET"), None);
        assert_eq!(parse_site_time("Feb 30 2026, 14:30:00"), None);
        assert_eq!(parse_site_time("Jan 27 2026, 14:30:00 PST"), None);
    }
}
