//! Core library for `rainchart`.
//!
//! This crate defines:
//! - Fetchers for public weather APIs (Open-Meteo, OpenWeather)
//! - The normalizer turning parallel-array responses into an ordered,
//!   history/forecast-classified [`WeatherSeries`]
//! - A pipeline tying the two together for one or many locations
//! - Configuration & credentials handling
//!
//! Rendering the series (charts, dashboards) is left to the caller.

pub mod config;
pub mod error;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod provider;

pub use config::{Config, ProviderConfig, SavedLocation};
pub use error::{FetchError, NormalizeError, PipelineError};
pub use model::{
    Classification, Granularity, InvalidLocation, Location, RawPayload, WeatherPoint,
    WeatherSeries,
};
pub use normalize::{normalize, normalize_many};
pub use provider::{ProviderId, WeatherProvider, open_meteo::FieldMap};
