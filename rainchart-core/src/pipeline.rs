//! Fetch → normalize, invoked explicitly by the caller for each run.

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use crate::{
    Location, PipelineError, WeatherSeries,
    normalize::normalize,
    provider::{WeatherProvider, fetch_all},
};

/// Run the pipeline for one location. `now` is the classification clock.
#[instrument(skip(provider, now), fields(provider = %provider.id(), location = location.name()))]
pub async fn run<P>(
    provider: &P,
    location: &Location,
    past_days: u8,
    forecast_days: u8,
    now: DateTime<Utc>,
) -> Result<WeatherSeries, PipelineError>
where
    P: WeatherProvider + ?Sized,
{
    let payload = provider.fetch(location, past_days, forecast_days).await?;
    let series = normalize(payload, now)?;

    info!(
        points = series.len(),
        historical = series.historical().len(),
        forecast = series.forecast().len(),
        "series ready"
    );

    Ok(series)
}

/// Run the pipeline for several locations, fetching concurrently.
///
/// A failure for one location does not affect the others.
pub async fn run_all<P>(
    provider: &P,
    locations: &[Location],
    past_days: u8,
    forecast_days: u8,
    now: DateTime<Utc>,
) -> Vec<(Location, Result<WeatherSeries, PipelineError>)>
where
    P: WeatherProvider + ?Sized,
{
    let payloads = fetch_all(provider, locations, past_days, forecast_days).await;

    locations
        .iter()
        .cloned()
        .zip(payloads)
        .map(|(location, fetched)| {
            let series = fetched
                .map_err(PipelineError::from)
                .and_then(|payload| normalize(payload, now).map_err(PipelineError::from));
            (location, series)
        })
        .collect()
}
