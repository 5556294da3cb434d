//! Wall-clock to UTC normalization.
//!
//! Every interval is stored as a pair of UTC instants. Callers hand us a
//! wall-clock timestamp (optionally carrying the offset they think applies)
//! plus an IANA zone name; this module turns that into the instant the
//! member actually meant, walking DST transitions through `chrono-tz`.

use chrono::{
    DateTime, FixedOffset, LocalResult, NaiveDateTime, Offset, SecondsFormat, TimeDelta, TimeZone,
    Utc,
};
use chrono_tz::Tz;

use crate::model::Ms;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown timezone: {0}")]
pub struct UnknownTimezone(pub String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid timestamp: {0}")]
pub struct TimestampError(pub String);

/// A timestamp as the caller wrote it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WallClock {
    pub local: NaiveDateTime,
    /// Offset suffix from the input, if any.
    pub offset: Option<FixedOffset>,
}

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

impl WallClock {
    pub fn new(local: NaiveDateTime, offset: Option<FixedOffset>) -> Self {
        Self { local, offset }
    }

    /// A wall clock that is already a UTC instant.
    pub fn utc(instant: Ms) -> Option<Self> {
        let dt = DateTime::from_timestamp_millis(instant)?;
        Some(Self {
            local: dt.naive_utc(),
            offset: Some(FixedOffset::east_opt(0)?),
        })
    }

    /// Accepts RFC 3339 (`2025-03-30T01:30:00+01:00`, `…Z`), the same without
    /// seconds, or a bare local time without any offset.
    pub fn parse(input: &str) -> Result<Self, TimestampError> {
        let s = input.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(Self::new(dt.naive_local(), Some(*dt.offset())));
        }
        if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M%:z") {
            return Ok(Self::new(dt.naive_local(), Some(*dt.offset())));
        }
        NAIVE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
            .map(|local| Self::new(local, None))
            .ok_or_else(|| TimestampError(s.to_string()))
    }

    pub fn is_utc(&self) -> bool {
        self.offset.is_some_and(|o| o.local_minus_utc() == 0)
    }
}

pub fn parse_tz(name: &str) -> Result<Tz, UnknownTimezone> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| UnknownTimezone(name.to_string()))
}

/// Convert a caller's wall-clock timestamp to a UTC instant.
///
/// UTC input passes through untouched. Anything else is read as wall-clock
/// time in `tz_name`: a time repeated by a fall-back transition resolves to
/// its earlier instant, and a time skipped by a spring-forward gap is pushed
/// forward by the gap's length.
pub fn normalize(wall: &WallClock, tz_name: &str) -> Result<Ms, UnknownTimezone> {
    let tz = parse_tz(tz_name)?;
    if wall.is_utc() {
        return Ok(wall.local.and_utc().timestamp_millis());
    }
    Ok(resolve_local(&tz, &wall.local))
}

fn resolve_local(tz: &Tz, local: &NaiveDateTime) -> Ms {
    match tz.from_local_datetime(local) {
        LocalResult::Single(dt) => dt.timestamp_millis(),
        LocalResult::Ambiguous(earliest, _) => earliest.timestamp_millis(),
        LocalResult::None => {
            // Gap: apply the offset that was in force before the clocks jumped.
            let before = tz
                .offset_from_utc_datetime(&(*local - TimeDelta::days(1)))
                .fix();
            let utc = *local - TimeDelta::seconds(i64::from(before.local_minus_utc()));
            utc.and_utc().timestamp_millis()
        }
    }
}

/// Parse an absolute instant: RFC 3339 with offset, a bare time (taken as
/// UTC), or Unix milliseconds.
pub fn parse_instant(input: &str) -> Result<Ms, TimestampError> {
    let s = input.trim();
    if let Ok(ms) = s.parse::<Ms>() {
        return Ok(ms);
    }
    let wall = WallClock::parse(s)?;
    match wall.offset {
        Some(offset) => offset
            .from_local_datetime(&wall.local)
            .single()
            .map(|dt| dt.timestamp_millis())
            .ok_or_else(|| TimestampError(s.to_string())),
        None => Ok(wall.local.and_utc().timestamp_millis()),
    }
}

/// RFC 3339 rendering of a stored instant, always in `Z`.
pub fn format_utc(ms: Ms) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| ms.to_string())
}
