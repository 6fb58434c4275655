use std::fmt;

use rainchart_core::{Granularity, PipelineError, WeatherSeries};
use serde_json::{Value, json};

fn granularity_label(granularity: Granularity) -> &'static str {
    match granularity {
        Granularity::Hourly => "hourly",
        Granularity::ThreeHourly => "3-hourly",
        Granularity::Daily => "daily",
    }
}

/// Plain-text table, one row per point, tagged history/forecast.
pub struct Table<'a>(pub &'a WeatherSeries);

impl fmt::Display for Table<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let series = self.0;
        let location = series.location();
        let timestamp_format = match series.granularity() {
            Granularity::Daily => "%Y-%m-%d",
            _ => "%Y-%m-%d %H:%M %:z",
        };

        writeln!(
            f,
            "{} ({:.4}, {:.4}), {} points, {}, now = {}",
            location.name(),
            location.latitude(),
            location.longitude(),
            series.len(),
            granularity_label(series.granularity()),
            series.reference_time().format(timestamp_format),
        )?;
        writeln!(
            f,
            "{:<24} {:>10} {:>10}  {}",
            "time",
            "rain (mm)",
            "temp (°C)",
            "kind"
        )?;

        for point in series {
            writeln!(
                f,
                "{:<24} {:>10.1} {:>10.1}  {}",
                point.timestamp.format(timestamp_format).to_string(),
                point.rainfall,
                point.temperature,
                point.classification,
            )?;
        }

        let historical = series.historical();
        let forecast = series.forecast();
        writeln!(
            f,
            "history: {} points, {:.1} mm | forecast: {} points, {:.1} mm",
            historical.len(),
            historical.iter().map(|p| p.rainfall).sum::<f64>(),
            forecast.len(),
            forecast.iter().map(|p| p.rainfall).sum::<f64>(),
        )
    }
}

pub fn render_table(series: &WeatherSeries) -> String {
    Table(series).to_string()
}

/// One JSON object per location, carrying either the series or the error.
pub fn to_json(name: &str, result: &Result<WeatherSeries, PipelineError>) -> Value {
    match result {
        Ok(series) => json!({ "location": name, "series": series }),
        Err(err) => json!({ "location": name, "error": err.to_string() }),
    }
}
