use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::{FetchError, Granularity, Location, RawPayload};

use super::{ProviderId, WeatherProvider, network_error, read_json};

pub const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org/data/2.5";

/// The free forecast endpoint covers five days in 3-hour steps.
pub const MAX_FORECAST_DAYS: u8 = 5;
const STEPS_PER_DAY: u32 = 8;

#[derive(Debug, Clone)]
pub struct OpenWeatherProvider {
    api_key: String,
    base_url: String,
    http: Client,
}

impl OpenWeatherProvider {
    pub fn new(
        api_key: String,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(network_error)?;

        Ok(Self {
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    fn query(&self, location: &Location, forecast_days: u8) -> Vec<(&'static str, String)> {
        vec![
            ("lat", location.latitude().to_string()),
            ("lon", location.longitude().to_string()),
            ("appid", self.api_key.clone()),
            ("units", "metric".to_string()),
            ("cnt", (u32::from(forecast_days) * STEPS_PER_DAY).to_string()),
        ]
    }
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwRain {
    #[serde(rename = "3h")]
    three_hours: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwCity {
    /// Shift in seconds from UTC.
    #[serde(default)]
    timezone: i32,
}

#[derive(Debug, Deserialize)]
struct OwForecastEntry {
    dt: i64,
    main: OwMain,
    #[serde(default)]
    rain: Option<OwRain>,
}

#[derive(Debug, Deserialize)]
struct OwForecastResponse {
    city: OwCity,
    list: Vec<OwForecastEntry>,
}

impl OwForecastResponse {
    /// Reshape the record list into the parallel-array form, with times in local wall-clock.
    fn into_payload(self, location: &Location) -> Result<RawPayload, FetchError> {
        let timezone = self.city.timezone;
        let offset = FixedOffset::east_opt(timezone).ok_or_else(|| {
            FetchError::MalformedPayload(format!("city timezone {timezone} is not an offset"))
        })?;

        let mut time = Vec::with_capacity(self.list.len());
        let mut temperature = Vec::with_capacity(self.list.len());
        let mut rainfall = Vec::with_capacity(self.list.len());

        for entry in self.list {
            let at = DateTime::<Utc>::from_timestamp(entry.dt, 0).ok_or_else(|| {
                FetchError::MalformedPayload(format!("`dt` {} is out of range", entry.dt))
            })?;
            let local = at.with_timezone(&offset);
            time.push(local.format("%Y-%m-%dT%H:%M:%S").to_string());
            temperature.push(entry.main.temp);
            rainfall.push(entry.rain.and_then(|r| r.three_hours));
        }

        Ok(RawPayload {
            location: location.clone(),
            granularity: Granularity::ThreeHourly,
            utc_offset_seconds: self.city.timezone,
            timezone: None,
            time,
            temperature,
            rainfall,
            fetched_at: Utc::now(),
        })
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherProvider {
    fn id(&self) -> ProviderId {
        ProviderId::OpenWeather
    }

    #[instrument(skip(self), fields(location = location.name()))]
    async fn fetch(
        &self,
        location: &Location,
        past_days: u8,
        forecast_days: u8,
    ) -> Result<RawPayload, FetchError> {
        if past_days > 0 {
            return Err(FetchError::InvalidRequest(
                "History is not supported by the free OpenWeather API; use past_days = 0."
                    .to_string(),
            ));
        }
        if forecast_days == 0 || forecast_days > MAX_FORECAST_DAYS {
            return Err(FetchError::InvalidRequest(format!(
                "OpenWeather covers 1..={MAX_FORECAST_DAYS} days, {forecast_days} requested"
            )));
        }

        let url = format!("{}/forecast", self.base_url);
        debug!(url = %url, forecast_days, "fetching OpenWeather forecast");

        let res = self
            .http
            .get(&url)
            .query(&self.query(location, forecast_days))
            .send()
            .await
            .map_err(network_error)?;

        let body = read_json(res).await?;
        let parsed = OwForecastResponse::deserialize(&body).map_err(|e| {
            FetchError::MalformedPayload(format!("unexpected OpenWeather forecast shape: {e}"))
        })?;

        parsed.into_payload(location)
    }
}
