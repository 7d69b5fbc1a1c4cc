//! Date normalization.
//!
//! Run dates arrive from the store in whatever shape they were written.
//! Some are canonical `YYYY-MM-DD`; some carry a time part; some are
//! weekday-correct but fall in a different week than the one on screen.
//! [`normalize`] maps a raw value onto a date of the active [`Week`] by
//! trying each matcher in order, first hit wins:
//!
//! 1. [`ExactMatcher`]: the raw value already equals one of the week's
//!    canonical keys.
//! 2. [`StructuralMatcher`]: split into year/month/day, build the date, and
//!    take the week's date on the same weekday.
//! 3. [`GenericParseMatcher`]: parse with a list of common formats; use the
//!    result directly if it is in the week, otherwise fall back to its
//!    weekday.
//!
//! Anything else is [`DateError::Unparseable`]. The caller counts those; it
//! never drops them.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use tracing::trace;

use crate::{DateError, Week};

/// How a raw date was matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchTier {
    /// Already canonical and inside the week.
    Direct,
    /// Placed on the week's date with the same weekday.
    WeekdayFallback,
    /// Parsed from a non-canonical format into a date inside the week.
    Reparsed,
}

impl std::fmt::Display for MatchTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MatchTier::Direct => "direct",
            MatchTier::WeekdayFallback => "weekday_fallback",
            MatchTier::Reparsed => "reparsed",
        };
        write!(f, "{}", s)
    }
}

/// A successful match: the canonical key and the tier that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateMatch {
    pub key: NaiveDate,
    pub tier: MatchTier,
}

/// One resolution strategy.
pub trait DateMatcher: Send + Sync {
    fn name(&self) -> &'static str;

    fn try_match(&self, raw: &str, week: &Week) -> Option<DateMatch>;
}

/// Matchers in resolution order.
pub const STANDARD_MATCHERS: &[&dyn DateMatcher] =
    &[&ExactMatcher, &StructuralMatcher, &GenericParseMatcher];

/// Resolves `raw` against `week` with the standard matchers.
pub fn normalize(raw: Option<&str>, week: &Week) -> Result<DateMatch, DateError> {
    normalize_with(STANDARD_MATCHERS, raw, week)
}

/// Resolves `raw` against `week`, trying `matchers` in order.
pub fn normalize_with(
    matchers: &[&dyn DateMatcher],
    raw: Option<&str>,
    week: &Week,
) -> Result<DateMatch, DateError> {
    let raw = match raw {
        Some(raw) if !raw.is_empty() => raw,
        other => return Err(DateError::Unparseable(other.unwrap_or_default().to_string())),
    };

    for matcher in matchers {
        if let Some(hit) = matcher.try_match(raw, week) {
            trace!(raw, matcher = matcher.name(), key = %hit.key, tier = %hit.tier, "Date matched");
            return Ok(hit);
        }
    }
    Err(DateError::Unparseable(raw.to_string()))
}

fn weekday_fallback(date: NaiveDate, week: &Week) -> DateMatch {
    DateMatch {
        key: week.on(date.weekday()),
        tier: MatchTier::WeekdayFallback,
    }
}

/// Exact comparison with the week's canonical keys.
pub struct ExactMatcher;

impl DateMatcher for ExactMatcher {
    fn name(&self) -> &'static str {
        "exact"
    }

    fn try_match(&self, raw: &str, week: &Week) -> Option<DateMatch> {
        week.days()
            .find(|day| day.format("%Y-%m-%d").to_string() == raw)
            .map(|key| DateMatch {
                key,
                tier: MatchTier::Direct,
            })
    }
}

/// Year/month/day split with a same-weekday fallback.
pub struct StructuralMatcher;

impl StructuralMatcher {
    fn split(raw: &str) -> Option<NaiveDate> {
        let parts: Vec<&str> = raw.split('-').collect();
        let [year, month, day] = parts.as_slice() else {
            return None;
        };
        NaiveDate::from_ymd_opt(
            leading_number(year)?,
            leading_number(month)?,
            leading_number(day)?,
        )
    }
}

impl DateMatcher for StructuralMatcher {
    fn name(&self) -> &'static str {
        "structural"
    }

    fn try_match(&self, raw: &str, week: &Week) -> Option<DateMatch> {
        Self::split(raw).map(|date| weekday_fallback(date, week))
    }
}

/// Reads the leading run of ASCII digits, so `10T08:00:00` reads as 10.
fn leading_number<T: std::str::FromStr>(part: &str) -> Option<T> {
    let part = part.trim_start();
    let end = part
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(part.len());
    part[..end].parse().ok()
}

/// Parses common date and timestamp formats.
pub struct GenericParseMatcher;

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%b %d %Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%a %b %d %Y",
    "%d %b %Y",
];

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"];

impl GenericParseMatcher {
    fn parse(raw: &str) -> Option<NaiveDate> {
        let raw = raw.trim();

        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Some(ts.with_timezone(&Utc).date_naive());
        }
        if let Ok(ts) = DateTime::parse_from_rfc2822(raw) {
            return Some(ts.with_timezone(&Utc).date_naive());
        }
        DATETIME_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .map(|ts| ts.date())
            .or_else(|| {
                DATE_FORMATS
                    .iter()
                    .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
            })
    }
}

impl DateMatcher for GenericParseMatcher {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn try_match(&self, raw: &str, week: &Week) -> Option<DateMatch> {
        let date = Self::parse(raw)?;
        if week.contains(date) {
            return Some(DateMatch {
                key: date,
                tier: MatchTier::Reparsed,
            });
        }
        Some(weekday_fallback(date, week))
    }
}
