use thiserror::Error;

/// Errors produced while fetching a raw payload from a weather API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Connection, transport or timeout failure.
    #[error("network error: {0}")]
    Network(String),

    /// The API answered with a non-success status (or an explicit error body).
    #[error("API error: {0}")]
    ApiError(String),

    /// The response could not be read as the expected time-series document.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The request parameters cannot be served by the chosen provider.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Errors produced while turning a raw payload into a [`crate::WeatherSeries`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("misaligned arrays: time {time}, temperature {temperature}, rainfall {rainfall}")]
    MisalignedArrays {
        time: usize,
        temperature: usize,
        rainfall: usize,
    },

    /// Index of the first time entry that could not be parsed.
    #[error("invalid timestamp at index {0}")]
    InvalidTimestamp(usize),

    #[error("invalid UTC offset: {0} seconds")]
    InvalidOffset(i32),

    #[error("series is empty after normalization")]
    EmptySeries,

    #[error("payloads cannot be merged: {0}")]
    IncompatiblePayloads(String),
}

/// Either half of a pipeline run failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Normalize(#[from] NormalizeError),
}
