//! Begin/end time normalization.
//!
//! Readings are stored against UTC instants, but callers send ISO-8601 text that may or
//! may not carry a zone. This module decides what instant the caller meant and which zone
//! the response should be expressed in.
//!
//! Resolution order for the effective zone:
//!
//! 1. the explicit `timezone` parameter,
//! 2. the zone embedded in `begin`,
//! 3. UTC.
//!
//! A zone-less `end` is always read in `begin`'s zone so both ends of the window agree.

use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use std::fmt;

/// Window length used when `begin` is omitted.
pub const DEFAULT_LOOKBACK_HOURS: i64 = 24;

const OFFSET_FORMATS: [&str; 6] = [
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%z",
    "%Y-%m-%dT%H:%M:%S%:z",
    "%Y-%m-%dT%H:%M%z",
    "%Y-%m-%dT%H:%M%:z",
];

const LOCAL_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"];

/// Errors raised while interpreting time parameters. All of them are client input errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimeError {
    #[error("cannot parse '{input}' as an ISO-8601 date-time")]
    Unparseable { input: String },

    #[error("unknown time zone '{0}'")]
    UnknownZone(String),

    #[error("time '{input}' cannot contain only an offset without a named time zone")]
    AmbiguousOffset { input: String },

    #[error("begin time {begin} is after end time {end}")]
    InvertedWindow { begin: String, end: String },
}

/// A zone attached to a parsed timestamp.
///
/// `Offset` is what a bare `-07:00` produces. It pins one instant but says nothing about
/// daylight saving, so it is only accepted when the caller also names a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneSpec {
    Named(Tz),
    Offset(FixedOffset),
}

impl ZoneSpec {
    pub const UTC: ZoneSpec = ZoneSpec::Named(Tz::UTC);

    /// Parse an IANA zone id such as `America/Los_Angeles` or `PST8PDT`.
    pub fn parse(name: &str) -> Result<Self, TimeError> {
        let name = name.trim();
        name.parse::<Tz>()
            .map(ZoneSpec::Named)
            .map_err(|_| TimeError::UnknownZone(name.to_string()))
    }

    pub fn is_offset(&self) -> bool {
        matches!(self, ZoneSpec::Offset(_))
    }

    /// Zone id as reported back to callers.
    pub fn name(&self) -> String {
        match self {
            ZoneSpec::Named(tz) => tz.name().to_string(),
            ZoneSpec::Offset(offset) => offset.to_string(),
        }
    }

    /// UTC offset in effect at `instant`.
    pub fn offset_at(&self, instant: &DateTime<Utc>) -> FixedOffset {
        match self {
            ZoneSpec::Named(tz) => tz.offset_from_utc_datetime(&instant.naive_utc()).fix(),
            ZoneSpec::Offset(offset) => *offset,
        }
    }

    /// Interpret a wall-clock time in this zone.
    ///
    /// Ambiguous wall times (the repeated hour) take the earlier offset. Times inside a
    /// daylight-saving gap are moved forward by one hour.
    pub fn localize(&self, local: &NaiveDateTime) -> DateTime<Utc> {
        match self {
            ZoneSpec::Named(tz) => resolve_local(tz, local),
            ZoneSpec::Offset(offset) => resolve_local(offset, local),
        }
    }
}

impl fmt::Display for ZoneSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

fn resolve_local<Z: TimeZone>(zone: &Z, local: &NaiveDateTime) -> DateTime<Utc> {
    if let Some(resolved) = zone.from_local_datetime(local).earliest() {
        return resolved.with_timezone(&Utc);
    }
    let shifted = *local + Duration::hours(1);
    zone.from_local_datetime(&shifted)
        .earliest()
        .map(|resolved| resolved.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(local))
}

/// An instant together with the zone it should be displayed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZonedInstant {
    pub instant: DateTime<Utc>,
    pub zone: ZoneSpec,
}

impl ZonedInstant {
    pub fn new(instant: DateTime<Utc>, zone: ZoneSpec) -> Self {
        Self { instant, zone }
    }

    /// The instant rendered with the offset its zone has at that moment.
    pub fn to_fixed(&self) -> DateTime<FixedOffset> {
        self.instant.with_timezone(&self.zone.offset_at(&self.instant))
    }
}

impl fmt::Display for ZonedInstant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.zone {
            ZoneSpec::Named(tz) => write!(f, "{}[{}]", self.to_fixed().to_rfc3339(), tz.name()),
            ZoneSpec::Offset(_) => write!(f, "{}", self.to_fixed().to_rfc3339()),
        }
    }
}

/// Result of parsing one timestamp: either it named its zone/offset or it did not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedTime {
    Zoned(ZonedInstant),
    Local(NaiveDateTime),
}

/// Parse a timestamp, trying the zoned forms first and falling back to a local time.
///
/// Accepted zoned forms are `2021-06-10T13:00:00-07:00`, `2021-06-10T13:00:00-0700`,
/// `2021-06-10T20:00:00Z` and any of those (or a local time) followed by a bracketed
/// zone id, e.g. `2021-06-10T13:00:00-07:00[PST8PDT]`. A trailing `Z` counts as the
/// named zone UTC rather than a numeric offset.
pub fn parse_time(input: &str) -> Result<ParsedTime, TimeError> {
    let text = input.trim();
    let (body, region) = split_region(text)?;

    if let Some(fixed) = parse_with_offset(body) {
        let zone = match region {
            Some(tz) => ZoneSpec::Named(tz),
            None if body.ends_with('Z') || body.ends_with('z') => ZoneSpec::UTC,
            None => ZoneSpec::Offset(*fixed.offset()),
        };
        return Ok(ParsedTime::Zoned(ZonedInstant::new(
            fixed.with_timezone(&Utc),
            zone,
        )));
    }

    if let Some(local) = parse_local(body) {
        return Ok(match region {
            Some(tz) => {
                let zone = ZoneSpec::Named(tz);
                ParsedTime::Zoned(ZonedInstant::new(zone.localize(&local), zone))
            }
            None => ParsedTime::Local(local),
        });
    }

    Err(TimeError::Unparseable {
        input: input.to_string(),
    })
}

fn split_region(text: &str) -> Result<(&str, Option<Tz>), TimeError> {
    match (text.strip_suffix(']'), text.find('[')) {
        (Some(stripped), Some(open)) => {
            let zone = &stripped[open + 1..];
            match ZoneSpec::parse(zone)? {
                ZoneSpec::Named(tz) => Ok((&text[..open], Some(tz))),
                ZoneSpec::Offset(_) => Err(TimeError::UnknownZone(zone.to_string())),
            }
        }
        _ => Ok((text, None)),
    }
}

fn parse_with_offset(body: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(body) {
        return Some(parsed);
    }
    OFFSET_FORMATS
        .iter()
        .find_map(|format| DateTime::parse_from_str(body, format).ok())
}

fn parse_local(body: &str) -> Option<NaiveDateTime> {
    LOCAL_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(body, format).ok())
}

/// Inclusive time window of a readings request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub begin: ZonedInstant,
    pub end: ZonedInstant,
    /// Effective zone of the request.
    pub zone: ZoneSpec,
}

impl TimeWindow {
    pub fn begin_utc(&self) -> DateTime<Utc> {
        self.begin.instant
    }

    pub fn end_utc(&self) -> DateTime<Utc> {
        self.end.instant
    }

    pub fn contains(&self, instant: &DateTime<Utc>) -> bool {
        *instant >= self.begin.instant && *instant <= self.end.instant
    }
}

/// Resolve the `begin`/`end`/`timezone` parameters of a request into a [`TimeWindow`].
///
/// `now` is sampled once by the caller so both defaults refer to the same moment.
pub fn normalize(
    begin: Option<&str>,
    end: Option<&str>,
    timezone: Option<&str>,
    now: DateTime<Utc>,
) -> Result<TimeWindow, TimeError> {
    let explicit = non_blank(timezone).map(ZoneSpec::parse).transpose()?;
    let fallback = explicit.unwrap_or(ZoneSpec::UTC);

    let begin_text = non_blank(begin);
    let begin_time = match begin_text {
        Some(text) => match parse_time(text)? {
            ParsedTime::Zoned(zoned) => zoned,
            ParsedTime::Local(local) => ZonedInstant::new(fallback.localize(&local), fallback),
        },
        None => ZonedInstant::new(now - Duration::hours(DEFAULT_LOOKBACK_HOURS), fallback),
    };

    let zone = match explicit {
        Some(zone) => zone,
        None if begin_time.zone.is_offset() => {
            return Err(TimeError::AmbiguousOffset {
                input: begin_text.unwrap_or_default().to_string(),
            });
        }
        None => begin_time.zone,
    };

    let end_time = match non_blank(end) {
        Some(text) => match parse_time(text)? {
            ParsedTime::Zoned(zoned) => zoned,
            ParsedTime::Local(local) => {
                ZonedInstant::new(begin_time.zone.localize(&local), begin_time.zone)
            }
        },
        None => ZonedInstant::new(now, begin_time.zone),
    };

    if begin_time.instant > end_time.instant {
        return Err(TimeError::InvertedWindow {
            begin: begin_time.to_string(),
            end: end_time.to_string(),
        });
    }

    Ok(TimeWindow {
        begin: begin_time,
        end: end_time,
        zone,
    })
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
