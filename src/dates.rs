use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::debug;

/// How to read a slash date such as `03/04/2024` where either part could be the month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AmbiguousDates {
    /// `D/M/YYYY` is tried before `M/D/YYYY`.
    #[default]
    DayFirst,
    /// `M/D/YYYY` is tried before `D/M/YYYY`.
    MonthFirst,
    /// Refuse to guess; ambiguous spans do not normalize.
    Reject,
}

const MONTH: &str = r"(?:jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)";

// One alternation so the regex engine reports the leftmost span in the text,
// whichever shape it has.
static DATE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    let alternatives = [
        format!(r"\d{{1,2}}(?:st|nd|rd|th)?\s+{MONTH}\.?,?\s+\d{{4}}"),
        format!(r"{MONTH}\.?\s+\d{{1,2}}(?:st|nd|rd|th)?,?\s+\d{{4}}"),
        r"\d{1,2}/\d{1,2}/\d{4}".to_string(),
        r"\d{1,2}-\d{1,2}-\d{4}".to_string(),
        r"\d{1,2}\.\d{1,2}\.\d{4}".to_string(),
    ];
    // ISO dates may run straight into a time of day (`2024-10-24T09:00:00Z`).
    Regex::new(&format!(
        r"(?i)\b(?:({})\b|(\d{{4}}-\d{{1,2}}-\d{{1,2}})(?:\b|T))",
        alternatives.join("|")
    ))
    .expect("date pattern is valid")
});

static SEPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bsept\b").expect("sept pattern is valid"));

static ORDINAL_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d)(?:st|nd|rd|th)\b").expect("ordinal pattern is valid"));

static ABBREVIATION_DOT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Za-z])\.").expect("abbreviation pattern is valid"));

const LEADING_FORMATS: [&str; 3] = ["%d %B %Y", "%B %d %Y", "%Y-%m-%d"];
const TRAILING_FORMATS: [&str; 2] = ["%d-%m-%Y", "%d.%m.%Y"];
const DAY_FIRST_SLASH: [&str; 2] = ["%d/%m/%Y", "%m/%d/%Y"];
const MONTH_FIRST_SLASH: [&str; 2] = ["%m/%d/%Y", "%d/%m/%Y"];

/// Returns the leftmost date-looking span in `text`, as written.
pub fn find_date_span(text: &str) -> Option<&str> {
    let captures = DATE_PATTERN.captures(text)?;
    captures.get(1).or_else(|| captures.get(2)).map(|m| m.as_str())
}

/// Turns a span found by [`find_date_span`] into midnight UTC of that day.
///
/// Formats are tried in a fixed order: day-month-name, month-name-day, ISO,
/// the two slash orders (as `ambiguous` dictates), then dashed and dotted
/// day-first. Returns `None` when nothing parses.
pub fn normalize(span: &str, ambiguous: AmbiguousDates) -> Option<DateTime<Utc>> {
    let cleaned = clean_span(span);

    if ambiguous == AmbiguousDates::Reject && is_ambiguous_slash_date(&cleaned) {
        debug!(span, "refusing to guess day/month order");
        return None;
    }

    let slash_formats = match ambiguous {
        AmbiguousDates::MonthFirst => MONTH_FIRST_SLASH,
        AmbiguousDates::DayFirst | AmbiguousDates::Reject => DAY_FIRST_SLASH,
    };

    LEADING_FORMATS
        .iter()
        .chain(slash_formats.iter())
        .chain(TRAILING_FORMATS.iter())
        .find_map(|format| NaiveDate::parse_from_str(&cleaned, format).ok())
        .map(|date| date.and_time(NaiveTime::MIN).and_utc())
}

fn clean_span(span: &str) -> String {
    let without_ordinals = ORDINAL_SUFFIX.replace_all(span, "$1");
    let without_dots = ABBREVIATION_DOT.replace_all(&without_ordinals, "$1");
    // chrono's %B knows "Sep" but not "Sept".
    SEPT.replace_all(&without_dots, "Sep")
        .replace(',', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Both leading parts are valid months and they differ.
fn is_ambiguous_slash_date(cleaned: &str) -> bool {
    let mut parts = cleaned.split('/');
    let (Some(first), Some(second), Some(_)) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    match (first.parse::<u32>(), second.parse::<u32>()) {
        (Ok(a), Ok(b)) => a != b && (1..=12).contains(&a) && (1..=12).contains(&b),
        _ => false,
    }
}
