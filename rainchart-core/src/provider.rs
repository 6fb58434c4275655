use crate::{
    Config, FetchError, Location, RawPayload,
    provider::{open_meteo::OpenMeteoProvider, openweather::OpenWeatherProvider},
};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use std::fmt::Debug;
use tracing::debug;

pub mod open_meteo;
pub mod openweather;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderId {
    OpenMeteo,
    OpenWeather,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenMeteo => "open-meteo",
            ProviderId::OpenWeather => "openweather",
        }
    }

    pub const fn all() -> &'static [ProviderId] {
        &[ProviderId::OpenMeteo, ProviderId::OpenWeather]
    }

    /// Whether the provider refuses requests without an API key.
    pub fn requires_api_key(&self) -> bool {
        matches!(self, ProviderId::OpenWeather)
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ProviderId {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.to_lowercase();

        match lower.as_str() {
            "open-meteo" | "openmeteo" => Ok(ProviderId::OpenMeteo),
            "openweather" => Ok(ProviderId::OpenWeather),
            _ => Err(anyhow::anyhow!(
                "Unknown provider '{value}'. Supported providers: open-meteo, openweather."
            )),
        }
    }
}

/// One network round trip per call; no retries.
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    fn id(&self) -> ProviderId;

    async fn fetch(
        &self,
        location: &Location,
        past_days: u8,
        forecast_days: u8,
    ) -> Result<RawPayload, FetchError>;
}

/// Fetch every location concurrently. Results come back in input order.
pub async fn fetch_all<P>(
    provider: &P,
    locations: &[Location],
    past_days: u8,
    forecast_days: u8,
) -> Vec<Result<RawPayload, FetchError>>
where
    P: WeatherProvider + ?Sized,
{
    let requests = locations
        .iter()
        .map(|location| provider.fetch(location, past_days, forecast_days));

    futures::future::join_all(requests).await
}

/// Construct a provider from config and explicit ProviderId.
pub fn provider_from_config(
    id: ProviderId,
    config: &Config,
) -> anyhow::Result<Box<dyn WeatherProvider>> {
    let timeout = config.timeout();

    let boxed: Box<dyn WeatherProvider> = match id {
        ProviderId::OpenMeteo => {
            let base_url = config.base_url(id).unwrap_or(open_meteo::DEFAULT_BASE_URL);
            let fields = config.fields.clone().unwrap_or_default();
            let provider = OpenMeteoProvider::new(base_url, timeout)?;
            Box::new(provider.with_fields(fields))
        }
        ProviderId::OpenWeather => {
            let api_key = config.provider_api_key(id).ok_or_else(|| {
                anyhow::anyhow!(
                    "No API key configured for provider '{id}'.\n\
                         Hint: run `rainchart configure {id}` and enter your API key."
                )
            })?;
            let base_url = config.base_url(id).unwrap_or(openweather::DEFAULT_BASE_URL);
            let provider = OpenWeatherProvider::new(api_key.to_owned(), base_url, timeout)?;
            Box::new(provider)
        }
    };

    Ok(boxed)
}

/// Construct the default provider from config, using `default_provider` field.
pub fn default_provider_from_config(config: &Config) -> anyhow::Result<Box<dyn WeatherProvider>> {
    let id = config.default_provider_id()?;
    provider_from_config(id, config)
}

pub(crate) fn network_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Network(format!("request timed out: {err}"))
    } else {
        FetchError::Network(err.to_string())
    }
}

/// Read the whole body and turn error statuses / error bodies into [`FetchError::ApiError`].
pub(crate) async fn read_json(response: reqwest::Response) -> Result<Value, FetchError> {
    let status = response.status();
    let body = response.text().await.map_err(network_error)?;
    debug!(%status, bytes = body.len(), "received response");

    if !status.is_success() {
        return Err(FetchError::ApiError(api_error_message(status, &body)));
    }

    let value: Value = serde_json::from_str(&body).map_err(|e| {
        FetchError::MalformedPayload(format!("response is not valid JSON: {e}"))
    })?;

    if value.get("error").and_then(Value::as_bool) == Some(true) {
        let message = error_message(&value).unwrap_or_else(|| "API reported an error".to_string());
        return Err(FetchError::ApiError(message));
    }

    Ok(value)
}

fn api_error_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .as_ref()
        .and_then(error_message)
        .unwrap_or_else(|| format!("HTTP {status}: {}", truncate_body(body)))
}

// OpenWeather uses `message`, Open-Meteo uses `reason`.
fn error_message(value: &Value) -> Option<String> {
    ["message", "reason"]
        .iter()
        .find_map(|key| value.get(key).and_then(Value::as_str))
        .map(str::to_owned)
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() > MAX {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    } else {
        body.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn provider_id_as_str_roundtrip() {
        for id in ProviderId::all() {
            let s = id.as_str();
            let parsed = ProviderId::try_from(s).expect("roundtrip should succeed");
            assert_eq!(*id, parsed);
        }
    }

    #[test]
    fn unknown_provider_error() {
        let err = ProviderId::try_from("doesnotexist").unwrap_err();
        assert!(err.to_string().contains("Unknown provider"));
    }

    #[test]
    fn provider_from_config_errors_when_missing_api_key() {
        let cfg = Config::default();
        let err = provider_from_config(ProviderId::OpenWeather, &cfg).unwrap_err();
        assert!(err.to_string().contains("No API key configured for provider"));
    }

    #[test]
    fn open_meteo_needs_no_key() {
        let cfg = Config::default();
        let provider = provider_from_config(ProviderId::OpenMeteo, &cfg).expect("no key needed");
        assert_eq!(provider.id(), ProviderId::OpenMeteo);
    }

    #[test]
    fn default_provider_falls_back_to_open_meteo() {
        let cfg = Config::default();
        let provider = default_provider_from_config(&cfg).expect("default provider");
        assert_eq!(provider.id(), ProviderId::OpenMeteo);
    }

    #[test]
    fn default_provider_from_config_works_when_set_and_configured() {
        let mut cfg = Config::default();
        cfg.upsert_provider_api_key(ProviderId::OpenWeather, "KEY".to_string());
        cfg.set_default_provider(ProviderId::OpenWeather);

        let provider = default_provider_from_config(&cfg).expect("configured provider");
        assert_eq!(provider.id(), ProviderId::OpenWeather);
    }

    #[test]
    fn api_error_message_prefers_json_fields() {
        let status = StatusCode::INTERNAL_SERVER_ERROR;
        let message = api_error_message(status, r#"{"message":"rate limited"}"#);
        assert_eq!(message, "rate limited");

        let body = r#"{"error":true,"reason":"bad latitude"}"#;
        let reason = api_error_message(StatusCode::BAD_REQUEST, body);
        assert_eq!(reason, "bad latitude");

        let fallback = api_error_message(status, "oops");
        assert_eq!(fallback, "HTTP 500 Internal Server Error: oops");
    }

    #[test]
    fn truncate_body_respects_char_boundaries() {
        let body = "é".repeat(150);
        let truncated = truncate_body(&body);
        assert!(truncated.ends_with("..."));
        assert!(truncated.len() <= 203);
    }
}
