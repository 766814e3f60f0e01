//! Invoice dates – parsing of the loosely-typed `date` field and formatting
//! with dayjs-style patterns (including the `advancedFormat` ordinal `Do`
//! and quarter `Q` tokens).
//!
//! Supported tokens:
//!
//! | Token  | Output            | Token | Output           |
//! |--------|-------------------|-------|------------------|
//! | `YYYY` | 2024              | `HH`  | 00–23            |
//! | `YY`   | 24                | `H`   | 0–23             |
//! | `MMMM` | January           | `hh`  | 01–12            |
//! | `MMM`  | Jan               | `h`   | 1–12             |
//! | `MM`   | 01–12             | `mm`  | 00–59            |
//! | `M`    | 1–12              | `m`   | 0–59             |
//! | `DD`   | 01–31             | `ss`  | 00–59            |
//! | `D`    | 1–31              | `s`   | 0–59             |
//! | `Do`   | 1st, 2nd, 31st    | `A`   | AM / PM          |
//! | `dddd` | Sunday            | `a`   | am / pm          |
//! | `ddd`  | Sun               | `Q`   | 1–4              |
//! | `dd`   | Su                |       |                  |
//! | `d`    | 0–6 (Sunday = 0)  |       |                  |
//!
//! Text inside `[...]` is copied literally; any other character passes
//! through unchanged.

use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ValidationError;

/// Pattern used when the caller does not supply one.
pub const DEFAULT_DATE_FORMAT: &str = "YYYY-MM-DD";

const MONTHS: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

const WEEKDAYS: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

/// Tokens ordered longest-first so that `MMMM` wins over `MM` and `Do` over `D`.
/// Offset-less date-time shapes, tried in order.
const NAIVE_PATTERNS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const TOKENS: [&str; 24] = [
    "YYYY", "MMMM", "dddd", "MMM", "ddd", "YY", "MM", "DD", "Do", "dd", "HH", "hh", "mm", "ss",
    "M", "D", "d", "H", "h", "m", "s", "A", "a", "Q",
];

/// The issue date of an invoice.
///
/// Accepts `YYYY-MM-DD`, RFC 3339 timestamps (kept in their own wall-clock
/// time) and `YYYY-MM-DDTHH:MM[:SS[.fff]]` timestamps with or without an
/// offset. The `T` may be a space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct InvoiceDate(NaiveDateTime);

impl InvoiceDate {
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        let s = s.trim();
        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            if let Some(dt) = date.and_hms_opt(0, 0, 0) {
                return Ok(Self(dt));
            }
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(Self(dt.naive_local()));
        }
        for pattern in ["%Y-%m-%dT%H:%M%:z", "%Y-%m-%d %H:%M%:z"] {
            if let Ok(dt) = DateTime::parse_from_str(s, pattern) {
                return Ok(Self(dt.naive_local()));
            }
        }
        // A trailing `Z` is UTC, which is already the wall-clock time we keep.
        let naive = s.strip_suffix(['Z', 'z']).unwrap_or(s);
        for pattern in NAIVE_PATTERNS {
            if let Ok(dt) = NaiveDateTime::parse_from_str(naive, pattern) {
                return Ok(Self(dt));
            }
        }
        Err(ValidationError::InvalidDate(s.to_string()))
    }

    pub fn date(&self) -> NaiveDate {
        self.0.date()
    }

    pub fn datetime(&self) -> NaiveDateTime {
        self.0
    }

    /// Format with a dayjs-style pattern.
    pub fn format(&self, pattern: &str) -> String {
        format_pattern(&self.0, pattern)
    }

    /// `YYYY-MM-DD`, the form used for default file names.
    pub fn iso_date(&self) -> String {
        self.format(DEFAULT_DATE_FORMAT)
    }
}

impl fmt::Display for InvoiceDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.iso_date())
    }
}

impl Serialize for InvoiceDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.0.time() == chrono::NaiveTime::MIN {
            serializer.serialize_str(&self.iso_date())
        } else {
            serializer.serialize_str(&self.0.format("%Y-%m-%dT%H:%M:%S").to_string())
        }
    }
}

impl<'de> Deserialize<'de> for InvoiceDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        InvoiceDate::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Format `dt` with a dayjs-style pattern.
pub fn format_pattern(dt: &NaiveDateTime, pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    let mut rest = pattern;

    'outer: while !rest.is_empty() {
        if let Some(escaped) = rest.strip_prefix('[') {
            match escaped.find(']') {
                Some(end) => {
                    out.push_str(&escaped[..end]);
                    rest = &escaped[end + 1..];
                }
                None => {
                    out.push_str(rest);
                    rest = "";
                }
            }
            continue;
        }

        for token in TOKENS {
            if let Some(tail) = rest.strip_prefix(token) {
                push_token(&mut out, dt, token);
                rest = tail;
                continue 'outer;
            }
        }

        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            out.push(c);
        }
        rest = chars.as_str();
    }
    out
}

fn push_token(out: &mut String, dt: &NaiveDateTime, token: &str) {
    use std::fmt::Write as _;

    let hour12 = match dt.hour() % 12 {
        0 => 12,
        h => h,
    };
    let weekday = dt.weekday().num_days_from_sunday() as usize;
    let month = dt.month0() as usize;

    // Writing to a String cannot fail.
    let _ = match token {
        "YYYY" => write!(out, "{:04}", dt.year()),
        "YY" => write!(out, "{:02}", dt.year().rem_euclid(100)),
        "MMMM" => write!(out, "{}", MONTHS[month]),
        "MMM" => write!(out, "{}", &MONTHS[month][..3]),
        "MM" => write!(out, "{:02}", dt.month()),
        "M" => write!(out, "{}", dt.month()),
        "DD" => write!(out, "{:02}", dt.day()),
        "D" => write!(out, "{}", dt.day()),
        "Do" => write!(out, "{}{}", dt.day(), ordinal_suffix(dt.day())),
        "dddd" => write!(out, "{}", WEEKDAYS[weekday]),
        "ddd" => write!(out, "{}", &WEEKDAYS[weekday][..3]),
        "dd" => write!(out, "{}", &WEEKDAYS[weekday][..2]),
        "d" => write!(out, "{}", weekday),
        "HH" => write!(out, "{:02}", dt.hour()),
        "H" => write!(out, "{}", dt.hour()),
        "hh" => write!(out, "{:02}", hour12),
        "h" => write!(out, "{}", hour12),
        "mm" => write!(out, "{:02}", dt.minute()),
        "m" => write!(out, "{}", dt.minute()),
        "ss" => write!(out, "{:02}", dt.second()),
        "s" => write!(out, "{}", dt.second()),
        "A" => write!(out, "{}", if dt.hour() < 12 { "AM" } else { "PM" }),
        "a" => write!(out, "{}", if dt.hour() < 12 { "am" } else { "pm" }),
        "Q" => write!(out, "{}", dt.month0() / 3 + 1),
        other => write!(out, "{other}"),
    };
}

fn ordinal_suffix(day: u32) -> &'static str {
    match (day % 10, day % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    }
}
