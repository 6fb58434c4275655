//! Open-Meteo forecast API (<https://open-meteo.com>). No API key required.
//!
//! Responses carry every variable as a separate array under an `hourly` or
//! `daily` block, aligned by index with a `time` array.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::{FetchError, Granularity, Location, RawPayload};

use super::{ProviderId, WeatherProvider, network_error, read_json};

pub const DEFAULT_BASE_URL: &str = "https://api.open-meteo.com/v1";

pub const MAX_PAST_DAYS: u8 = 92;
pub const MAX_FORECAST_DAYS: u8 = 16;

/// Where to find the time and value arrays in a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMap {
    /// `hourly` or `daily`.
    pub block: String,
    pub time: String,
    pub temperature: String,
    pub rainfall: String,
}

impl FieldMap {
    pub fn hourly() -> Self {
        Self {
            block: "hourly".to_string(),
            time: "time".to_string(),
            temperature: "temperature_2m".to_string(),
            rainfall: "precipitation".to_string(),
        }
    }

    pub fn daily() -> Self {
        Self {
            block: "daily".to_string(),
            time: "time".to_string(),
            temperature: "temperature_2m_mean".to_string(),
            rainfall: "precipitation_sum".to_string(),
        }
    }

    pub fn granularity(&self) -> Granularity {
        if self.block == "daily" {
            Granularity::Daily
        } else {
            Granularity::Hourly
        }
    }
}

impl Default for FieldMap {
    fn default() -> Self {
        Self::hourly()
    }
}

#[derive(Debug, Clone)]
pub struct OpenMeteoProvider {
    http: Client,
    base_url: String,
    fields: FieldMap,
}

impl OpenMeteoProvider {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(network_error)?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            fields: FieldMap::default(),
        })
    }

    pub fn with_fields(mut self, fields: FieldMap) -> Self {
        self.fields = fields;
        self
    }

    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    fn query(
        &self,
        location: &Location,
        past_days: u8,
        forecast_days: u8,
    ) -> Vec<(&'static str, String)> {
        vec![
            ("latitude", location.latitude().to_string()),
            ("longitude", location.longitude().to_string()),
            (
                block_param(&self.fields.block),
                format!("{},{}", self.fields.temperature, self.fields.rainfall),
            ),
            ("past_days", past_days.to_string()),
            ("forecast_days", forecast_days.to_string()),
            ("timezone", "auto".to_string()),
        ]
    }

    fn extract(&self, location: &Location, body: &Value) -> Result<RawPayload, FetchError> {
        let block = body.get(&self.fields.block).ok_or_else(|| {
            FetchError::MalformedPayload(format!("response has no `{}` block", self.fields.block))
        })?;

        // Always present with `timezone=auto`.
        let utc_offset_seconds = body
            .get("utc_offset_seconds")
            .and_then(Value::as_i64)
            .and_then(|secs| i32::try_from(secs).ok())
            .ok_or_else(|| {
                FetchError::MalformedPayload("missing or invalid `utc_offset_seconds`".to_string())
            })?;

        Ok(RawPayload {
            location: location.clone(),
            granularity: self.fields.granularity(),
            utc_offset_seconds,
            timezone: body.get("timezone").and_then(Value::as_str).map(str::to_owned),
            time: array_field(block, &self.fields.time)?,
            temperature: array_field(block, &self.fields.temperature)?,
            rainfall: array_field(block, &self.fields.rainfall)?,
            fetched_at: Utc::now(),
        })
    }
}

#[async_trait]
impl WeatherProvider for OpenMeteoProvider {
    fn id(&self) -> ProviderId {
        ProviderId::OpenMeteo
    }

    #[instrument(skip(self), fields(location = location.name()))]
    async fn fetch(
        &self,
        location: &Location,
        past_days: u8,
        forecast_days: u8,
    ) -> Result<RawPayload, FetchError> {
        if past_days > MAX_PAST_DAYS {
            return Err(FetchError::InvalidRequest(format!(
                "Open-Meteo serves at most {MAX_PAST_DAYS} past days, {past_days} requested"
            )));
        }
        if forecast_days > MAX_FORECAST_DAYS {
            return Err(FetchError::InvalidRequest(format!(
                "Open-Meteo serves at most {MAX_FORECAST_DAYS} forecast days, \
                 {forecast_days} requested"
            )));
        }

        let url = format!("{}/forecast", self.base_url);
        debug!(url = %url, past_days, forecast_days, "fetching Open-Meteo series");

        let res = self
            .http
            .get(&url)
            .query(&self.query(location, past_days, forecast_days))
            .send()
            .await
            .map_err(network_error)?;

        let body = read_json(res).await?;
        self.extract(location, &body)
    }
}

fn block_param(block: &str) -> &'static str {
    if block == "daily" { "daily" } else { "hourly" }
}

fn array_field<T: DeserializeOwned>(block: &Value, name: &str) -> Result<Vec<T>, FetchError> {
    let value = block
        .get(name)
        .ok_or_else(|| FetchError::MalformedPayload(format!("missing `{name}` array")))?;

    Vec::<T>::deserialize(value)
        .map_err(|e| FetchError::MalformedPayload(format!("`{name}` is not a valid array: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn provider() -> OpenMeteoProvider {
        OpenMeteoProvider::new(DEFAULT_BASE_URL, Duration::from_secs(5)).expect("client")
    }

    fn male() -> Location {
        Location::new("Male", 4.1755, 73.5093).unwrap()
    }

    #[test]
    fn query_encodes_window_fields_and_timezone() {
        let query = provider().query(&male(), 3, 7);

        assert!(query.contains(&("latitude", "4.1755".to_string())));
        assert!(query.contains(&("longitude", "73.5093".to_string())));
        assert!(query.contains(&("hourly", "temperature_2m,precipitation".to_string())));
        assert!(query.contains(&("past_days", "3".to_string())));
        assert!(query.contains(&("forecast_days", "7".to_string())));
        assert!(query.contains(&("timezone", "auto".to_string())));
    }

    #[test]
    fn daily_fields_request_daily_block() {
        let p = provider().with_fields(FieldMap::daily());
        let query = p.query(&male(), 0, 5);

        let variables = "temperature_2m_mean,precipitation_sum".to_string();
        assert!(query.contains(&("daily", variables)));
        assert_eq!(p.fields().granularity(), Granularity::Daily);
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let p =
            OpenMeteoProvider::new("http://localhost:1234/v1/", Duration::from_secs(1)).unwrap();
        assert_eq!(p.base_url, "http://localhost:1234/v1");
    }

    #[test]
    fn extract_keeps_nulls_and_offset() {
        let body = json!({
            "utc_offset_seconds": 18000,
            "timezone": "Indian/Maldives",
            "hourly": {
                "time": ["2024-01-01T00:00", "2024-01-01T01:00"],
                "temperature_2m": [28.1, null],
                "precipitation": [null, 5.2]
            }
        });

        let payload = provider().extract(&male(), &body).expect("extract");
        assert_eq!(payload.utc_offset_seconds, 18000);
        assert_eq!(payload.timezone.as_deref(), Some("Indian/Maldives"));
        assert_eq!(payload.temperature, vec![Some(28.1), None]);
        assert_eq!(payload.rainfall, vec![None, Some(5.2)]);
        assert_eq!(payload.granularity, Granularity::Hourly);
    }

    #[test]
    fn extract_does_not_check_lengths() {
        // Alignment is the normalizer's job.
        let body = json!({
            "utc_offset_seconds": 0,
            "hourly": {
                "time": ["2024-01-01T00:00", "2024-01-01T01:00"],
                "temperature_2m": [28.1],
                "precipitation": [0.0, 0.0]
            }
        });

        let payload = provider().extract(&male(), &body).expect("extract");
        assert_eq!(payload.time.len(), 2);
        assert_eq!(payload.temperature.len(), 1);
    }

    #[test]
    fn extract_without_offset_is_malformed() {
        let body = json!({
            "timezone": "Europe/Berlin",
            "hourly": {
                "time": ["2024-01-01T00:00"],
                "temperature_2m": [3.5],
                "precipitation": [0.0]
            }
        });

        let err = provider().extract(&male(), &body).unwrap_err();
        assert_eq!(
            err,
            FetchError::MalformedPayload("missing or invalid `utc_offset_seconds`".into())
        );

        let body = json!({
            "utc_offset_seconds": "+02:00",
            "hourly": { "time": [], "temperature_2m": [], "precipitation": [] }
        });
        assert!(matches!(
            provider().extract(&male(), &body),
            Err(FetchError::MalformedPayload(_))
        ));
    }

    #[test]
    fn extract_missing_block_is_malformed() {
        let err = provider()
            .extract(&male(), &json!({ "daily": {} }))
            .unwrap_err();
        assert!(matches!(err, FetchError::MalformedPayload(msg) if msg.contains("hourly")));
    }

    #[test]
    fn extract_missing_array_is_malformed() {
        let body = json!({
            "utc_offset_seconds": 0,
            "hourly": { "time": [], "temperature_2m": [] }
        });
        let err = provider().extract(&male(), &body).unwrap_err();
        assert!(matches!(err, FetchError::MalformedPayload(msg) if msg.contains("precipitation")));
    }

    #[test]
    fn extract_wrong_types_is_malformed() {
        let body = json!({
            "utc_offset_seconds": 0,
            "hourly": { "time": [1, 2], "temperature_2m": [1.0, 2.0], "precipitation": [0.0, 0.0] }
        });
        assert!(matches!(
            provider().extract(&male(), &body),
            Err(FetchError::MalformedPayload(_))
        ));

        let body = json!({
            "utc_offset_seconds": 0,
            "hourly": { "time": ["2024-01-01"], "temperature_2m": ["warm"], "precipitation": [0.0] }
        });
        assert!(matches!(
            provider().extract(&male(), &body),
            Err(FetchError::MalformedPayload(_))
        ));
    }

    #[tokio::test]
    async fn oversized_windows_are_rejected_before_sending() {
        let p = provider();
        assert!(matches!(
            p.fetch(&male(), MAX_PAST_DAYS + 1, 1).await,
            Err(FetchError::InvalidRequest(_))
        ));
        assert!(matches!(
            p.fetch(&male(), 0, MAX_FORECAST_DAYS + 1).await,
            Err(FetchError::InvalidRequest(_))
        ));
    }
}
