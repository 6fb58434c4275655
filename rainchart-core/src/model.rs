use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidLocation {
    #[error("location name must not be empty")]
    EmptyName,

    #[error("latitude {0} is outside -90..=90")]
    Latitude(f64),

    #[error("longitude {0} is outside -180..=180")]
    Longitude(f64),
}

/// A named geographic point. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Location {
    name: String,
    latitude: f64,
    longitude: f64,
}

impl Location {
    pub fn new(
        name: impl Into<String>,
        latitude: f64,
        longitude: f64,
    ) -> Result<Self, InvalidLocation> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(InvalidLocation::EmptyName);
        }
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(InvalidLocation::Latitude(latitude));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(InvalidLocation::Longitude(longitude));
        }

        Ok(Self {
            name,
            latitude,
            longitude,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }
}

/// Spacing of the series grid; decides how "now" is truncated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Hourly,
    ThreeHourly,
    Daily,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Historical,
    Forecast,
}

impl Classification {
    /// A point sitting exactly on the reference time belongs to the forecast side.
    pub fn for_timestamp(
        timestamp: DateTime<FixedOffset>,
        reference: DateTime<FixedOffset>,
    ) -> Self {
        if timestamp < reference {
            Self::Historical
        } else {
            Self::Forecast
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Historical => "historical",
            Classification::Forecast => "forecast",
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of a normalized series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WeatherPoint {
    pub timestamp: DateTime<FixedOffset>,
    /// Millimeters, never negative.
    pub rainfall: f64,
    /// Degrees Celsius.
    pub temperature: f64,
    pub classification: Classification,
}

/// Provider-neutral response: one time array plus value arrays aligned by index.
///
/// Value arrays keep `None` where the API sent `null`; the normalizer decides
/// what to do with the gaps.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPayload {
    pub location: Location,
    pub granularity: Granularity,
    /// Offset the `time` strings are expressed in.
    pub utc_offset_seconds: i32,
    /// IANA zone the `time` strings are written in. When it names a known zone it
    /// wins over `utc_offset_seconds`, so DST changes inside the window resolve.
    pub timezone: Option<String>,
    pub time: Vec<String>,
    pub temperature: Vec<Option<f64>>,
    pub rainfall: Vec<Option<f64>>,
    pub fetched_at: DateTime<Utc>,
}

/// Ordered, timestamp-unique series handed to renderers by value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherSeries {
    location: Location,
    granularity: Granularity,
    reference_time: DateTime<FixedOffset>,
    points: Vec<WeatherPoint>,
}

impl WeatherSeries {
    /// `points` must already be sorted, deduplicated and classified.
    pub(crate) fn new(
        location: Location,
        granularity: Granularity,
        reference_time: DateTime<FixedOffset>,
        points: Vec<WeatherPoint>,
    ) -> Self {
        Self {
            location,
            granularity,
            reference_time,
            points,
        }
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// The truncated "now" the points were classified against.
    pub fn reference_time(&self) -> DateTime<FixedOffset> {
        self.reference_time
    }

    pub fn points(&self) -> &[WeatherPoint] {
        &self.points
    }

    pub fn iter(&self) -> std::slice::Iter<'_, WeatherPoint> {
        self.points.iter()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first(&self) -> Option<&WeatherPoint> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&WeatherPoint> {
        self.points.last()
    }

    pub fn historical(&self) -> &[WeatherPoint] {
        &self.points[..self.boundary()]
    }

    pub fn forecast(&self) -> &[WeatherPoint] {
        &self.points[self.boundary()..]
    }

    // Sorted points make the classification monotone.
    fn boundary(&self) -> usize {
        self.points
            .partition_point(|p| p.classification == Classification::Historical)
    }
}

impl<'a> IntoIterator for &'a WeatherSeries {
    type Item = &'a WeatherPoint;
    type IntoIter = std::slice::Iter<'a, WeatherPoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}
