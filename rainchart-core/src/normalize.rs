//! Parallel-array payload → ordered, classified [`WeatherSeries`].

use chrono::{
    DateTime, Duration, FixedOffset, LocalResult, NaiveDate, NaiveDateTime, Offset, TimeZone,
    Timelike, Utc,
};
use chrono_tz::Tz;
use tracing::{debug, instrument, warn};

use crate::{
    error::NormalizeError,
    model::{Classification, Granularity, RawPayload, WeatherPoint, WeatherSeries},
};

const LOCAL_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

const THREE_HOURS_SECS: i64 = 3 * 3600;

/// Timestamp, rainfall, temperature.
type Row = (DateTime<FixedOffset>, f64, f64);

/// Normalize a single payload, classifying against `now`.
pub fn normalize(payload: RawPayload, now: DateTime<Utc>) -> Result<WeatherSeries, NormalizeError> {
    normalize_many(vec![payload], now)
}

/// Merge payloads for one location (e.g. overlapping windows) into one series.
///
/// On duplicate timestamps the value from the most recently fetched payload wins;
/// within a payload, the later index wins.
#[instrument(skip_all, fields(payloads = payloads.len()))]
pub fn normalize_many(
    mut payloads: Vec<RawPayload>,
    now: DateTime<Utc>,
) -> Result<WeatherSeries, NormalizeError> {
    let (location, granularity) = match payloads.first() {
        Some(first) => (first.location.clone(), first.granularity),
        None => return Err(NormalizeError::EmptySeries),
    };

    if let Some(other) = payloads
        .iter()
        .find(|p| p.location != location || p.granularity != granularity)
    {
        return Err(NormalizeError::IncompatiblePayloads(format!(
            "expected {} ({:?}), got {} ({:?})",
            location.name(),
            granularity,
            other.location.name(),
            other.granularity,
        )));
    }

    // Stable: equal fetch times keep their given order.
    payloads.sort_by_key(|p| p.fetched_at);

    // Every point is re-expressed in the newest payload's zone.
    let mut zone = None;
    let mut rows = Vec::new();
    for payload in &payloads {
        let payload_zone = SeriesZone::of(payload)?;
        rows.extend(payload_zone.rows(payload)?);
        zone = Some(payload_zone);
    }
    let Some(zone) = zone else {
        return Err(NormalizeError::EmptySeries);
    };

    // Stable sort keeps fetch order among equal timestamps, so the last one is the newest.
    rows.sort_by_key(|row| row.0);
    let mut unique: Vec<Row> = Vec::with_capacity(rows.len());
    for row in rows {
        match unique.last_mut() {
            Some(last) if last.0 == row.0 => *last = row,
            _ => unique.push(row),
        }
    }

    if unique.is_empty() {
        return Err(NormalizeError::EmptySeries);
    }

    let reference = zone.reference(now, granularity);
    let points: Vec<WeatherPoint> = unique
        .into_iter()
        .map(|(timestamp, rainfall, temperature)| {
            let timestamp = zone.present(timestamp);
            WeatherPoint {
                timestamp,
                rainfall,
                temperature,
                classification: Classification::for_timestamp(timestamp, reference),
            }
        })
        .collect();

    debug!(
        location = location.name(),
        points = points.len(),
        reference = %reference,
        "normalized series"
    );

    Ok(WeatherSeries::new(location, granularity, reference, points))
}

/// Truncate `now` onto the series grid, expressed in `zone`.
pub fn reference_time<Z: TimeZone>(
    now: DateTime<Utc>,
    granularity: Granularity,
    zone: &Z,
) -> DateTime<FixedOffset> {
    let local = now.with_timezone(zone);
    match granularity {
        // Subtracting on the instant keeps a repeated DST hour on the right side.
        Granularity::Hourly => {
            let into_hour = Duration::seconds(i64::from(local.minute() * 60 + local.second()))
                + Duration::nanoseconds(i64::from(local.nanosecond()));
            (local - into_hour).fixed_offset()
        }
        Granularity::Daily => local
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .and_then(|midnight| resolve_local(zone, &midnight, None))
            .unwrap_or_else(|| local.fixed_offset()),
        // 3-hourly sources publish on a UTC grid.
        Granularity::ThreeHourly => {
            let secs = now.timestamp();
            match DateTime::from_timestamp(secs - secs.rem_euclid(THREE_HOURS_SECS), 0) {
                Some(utc) => utc.with_timezone(zone).fixed_offset(),
                None => local.fixed_offset(),
            }
        }
    }
}

/// Parse an API time string; zone-less strings are resolved in `zone`.
pub fn parse_timestamp<Z: TimeZone>(raw: &str, zone: &Z) -> Option<DateTime<FixedOffset>> {
    parse_after(raw, zone, None)
}

fn parse_after<Z: TimeZone>(
    raw: &str,
    zone: &Z,
    previous: Option<DateTime<FixedOffset>>,
) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(zone).fixed_offset());
    }

    let naive = LOCAL_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })?;

    resolve_local(zone, &naive, previous)
}

/// Wall-clock time to instant.
///
/// A repeated (fall-back) time maps to its first occurrence unless `previous`
/// already reached it, in which case it is the second. A skipped (spring-forward)
/// time is read with the offset in force before the gap, landing after it.
fn resolve_local<Z: TimeZone>(
    zone: &Z,
    naive: &NaiveDateTime,
    previous: Option<DateTime<FixedOffset>>,
) -> Option<DateTime<FixedOffset>> {
    match zone.from_local_datetime(naive) {
        LocalResult::Single(dt) => Some(dt.fixed_offset()),
        LocalResult::Ambiguous(earliest, latest) => {
            let earliest = earliest.fixed_offset();
            if previous.is_some_and(|prev| prev >= earliest) {
                Some(latest.fixed_offset())
            } else {
                Some(earliest)
            }
        }
        LocalResult::None => {
            let shifted = *naive - Duration::hours(3);
            let before = zone.from_local_datetime(&shifted).earliest()?;
            before.offset().fix().from_local_datetime(naive).single()
        }
    }
}

/// Zone the zone-less time strings of a payload are written in.
#[derive(Debug, Clone, Copy, PartialEq)]
enum SeriesZone {
    /// IANA zone named by the payload, DST-aware.
    Named(Tz),
    Fixed(FixedOffset),
}

impl SeriesZone {
    fn of(payload: &RawPayload) -> Result<Self, NormalizeError> {
        let fixed = FixedOffset::east_opt(payload.utc_offset_seconds)
            .ok_or(NormalizeError::InvalidOffset(payload.utc_offset_seconds))?;

        let Some(name) = payload.timezone.as_deref() else {
            return Ok(Self::Fixed(fixed));
        };

        match name.parse::<Tz>() {
            Ok(tz) => Ok(Self::Named(tz)),
            Err(_) => {
                warn!(
                    timezone = name,
                    offset = payload.utc_offset_seconds,
                    "unknown timezone, using fixed offset"
                );
                Ok(Self::Fixed(fixed))
            }
        }
    }

    fn rows(&self, payload: &RawPayload) -> Result<Vec<Row>, NormalizeError> {
        match self {
            Self::Named(tz) => aligned_rows(payload, tz),
            Self::Fixed(offset) => aligned_rows(payload, offset),
        }
    }

    fn reference(&self, now: DateTime<Utc>, granularity: Granularity) -> DateTime<FixedOffset> {
        match self {
            Self::Named(tz) => reference_time(now, granularity, tz),
            Self::Fixed(offset) => reference_time(now, granularity, offset),
        }
    }

    fn present(&self, timestamp: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
        match self {
            Self::Named(tz) => timestamp.with_timezone(tz).fixed_offset(),
            Self::Fixed(offset) => timestamp.with_timezone(offset),
        }
    }
}

/// Zip the arrays after checking they line up. Rows without a temperature are dropped.
fn aligned_rows<Z: TimeZone>(payload: &RawPayload, zone: &Z) -> Result<Vec<Row>, NormalizeError> {
    let len = payload.time.len();
    if payload.temperature.len() != len || payload.rainfall.len() != len {
        return Err(NormalizeError::MisalignedArrays {
            time: len,
            temperature: payload.temperature.len(),
            rainfall: payload.rainfall.len(),
        });
    }

    let mut rows = Vec::with_capacity(len);
    let mut dropped = 0usize;
    let mut previous = None;

    for (index, raw) in payload.time.iter().enumerate() {
        let timestamp =
            parse_after(raw, zone, previous).ok_or(NormalizeError::InvalidTimestamp(index))?;
        previous = Some(timestamp);

        let Some(temperature) = payload.temperature[index].filter(|t| t.is_finite()) else {
            dropped += 1;
            continue;
        };

        let rainfall = payload.rainfall[index]
            .filter(|r| r.is_finite())
            .map_or(0.0, |r| r.max(0.0));

        rows.push((timestamp, rainfall, temperature));
    }

    if dropped > 0 {
        warn!(
            location = payload.location.name(),
            dropped, "dropped rows without temperature"
        );
    }

    Ok(rows)
}
