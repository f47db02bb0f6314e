//! Human-readable durations such as "5m", "1h" or "1500ms".

use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{de, Deserialize, Deserializer};

/// Suffixes with their length in milliseconds. `ms` must precede `m` and `s`.
const UNITS: [(&str, u64); 5] = [
    ("ms", 1),
    ("d", 24 * 60 * 60 * 1000),
    ("h", 60 * 60 * 1000),
    ("m", 60 * 1000),
    ("s", 1000),
];

/// Parses a single number followed by one of `ms`, `s`, `m`, `h` or `d`.
///
/// ```
/// use bookfeed::duration::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
/// assert_eq!(parse_duration(" 1500MS ").unwrap(), Duration::from_millis(1500));
/// assert!(parse_duration("soon").is_err());
/// ```
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim().to_ascii_lowercase();
    let Some((number, unit_ms)) = UNITS
        .iter()
        .find_map(|(suffix, ms)| s.strip_suffix(suffix).map(|n| (n.trim(), *ms)))
    else {
        bail!("duration {s:?} must end with ms, s, m, h or d");
    };

    let value: u64 = number
        .parse()
        .with_context(|| format!("invalid number in duration {s:?}"))?;
    let millis = value
        .checked_mul(unit_ms)
        .with_context(|| format!("duration {s:?} is too large"))?;
    Ok(Duration::from_millis(millis))
}

/// Renders `d` with the largest unit that divides it exactly.
///
/// ```
/// use bookfeed::duration::format_duration;
/// use std::time::Duration;
///
/// assert_eq!(format_duration(Duration::from_secs(300)), "5m");
/// assert_eq!(format_duration(Duration::from_secs(90)), "90s");
/// assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
/// ```
pub fn format_duration(d: Duration) -> String {
    let millis = d.as_millis() as u64;
    if millis == 0 {
        return "0s".to_string();
    }
    UNITS
        .iter()
        .skip(1)
        .find(|(_, unit_ms)| millis % unit_ms == 0)
        .map(|(suffix, unit_ms)| format!("{}{suffix}", millis / unit_ms))
        .unwrap_or_else(|| format!("{millis}ms"))
}

/// For `#[serde(deserialize_with = "deserialize_duration")]`.
pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_duration(&s).map_err(de::Error::custom)
}
