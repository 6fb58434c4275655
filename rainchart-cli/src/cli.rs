use anyhow::{Context, bail};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use rainchart_core::{
    Config, FieldMap, Location, ProviderId, pipeline::run_all, provider::provider_from_config,
};
use tracing::{error, warn};

use crate::output;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(
    name = "rainchart",
    version,
    about = "Rainfall and temperature history/forecast from public weather APIs"
)]
pub struct Cli {
    /// Log debug output to stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Configure a provider (API key where needed) and make it the default.
    Configure {
        /// Provider short name, "open-meteo" or "openweather".
        provider: String,
    },

    /// Remember a named location.
    AddLocation {
        name: String,
        #[arg(allow_negative_numbers = true)]
        latitude: f64,
        #[arg(allow_negative_numbers = true)]
        longitude: f64,
    },

    /// Forget a saved location.
    RemoveLocation { name: String },

    /// List saved locations.
    Locations,

    /// Fetch and print the series for one or more locations.
    Show(ShowArgs),
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    /// Saved location names. All saved locations when omitted.
    pub names: Vec<String>,

    /// Ad-hoc latitude instead of a saved location.
    #[arg(
        long,
        requires = "lon",
        allow_negative_numbers = true,
        conflicts_with = "names"
    )]
    pub lat: Option<f64>,

    /// Ad-hoc longitude instead of a saved location.
    #[arg(long, requires = "lat", allow_negative_numbers = true)]
    pub lon: Option<f64>,

    /// Display name for ad-hoc coordinates.
    #[arg(long, default_value = "here")]
    pub label: String,

    /// Provider to use instead of the configured default.
    #[arg(long)]
    pub provider: Option<String>,

    #[arg(long)]
    pub past_days: Option<u8>,

    #[arg(long)]
    pub forecast_days: Option<u8>,

    /// Daily aggregates instead of hourly values (Open-Meteo only).
    #[arg(long)]
    pub daily: bool,

    /// Print JSON instead of a table.
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Configure { provider } => configure(&provider),
            Command::AddLocation {
                name,
                latitude,
                longitude,
            } => {
                let mut cfg = Config::load()?;
                cfg.add_location(&name, latitude, longitude)?;
                cfg.save()?;
                println!("Saved location '{name}' ({latitude}, {longitude}).");
                Ok(())
            }
            Command::RemoveLocation { name } => {
                let mut cfg = Config::load()?;
                if !cfg.remove_location(&name) {
                    bail!("No saved location named '{name}'");
                }
                cfg.save()?;
                println!("Removed location '{name}'.");
                Ok(())
            }
            Command::Locations => {
                let cfg = Config::load()?;
                if cfg.locations.is_empty() {
                    println!("No saved locations. Add one with `rainchart add-location`.");
                }
                for loc in &cfg.locations {
                    println!(
                        "{:<20} {:>9.4} {:>9.4}",
                        loc.name, loc.latitude, loc.longitude
                    );
                }
                Ok(())
            }
            Command::Show(args) => show(args).await,
        }
    }
}

fn configure(provider: &str) -> anyhow::Result<()> {
    let id = ProviderId::try_from(provider)?;
    let mut cfg = Config::load()?;

    if id.requires_api_key() {
        let api_key = inquire::Password::new(&format!("API key for {id}:"))
            .without_confirmation()
            .with_display_mode(inquire::PasswordDisplayMode::Masked)
            .prompt()
            .context("Failed to read API key")?;

        if api_key.trim().is_empty() {
            bail!("API key must not be empty");
        }
        cfg.upsert_provider_api_key(id, api_key.trim().to_string());
    }

    let make_default = cfg.default_provider_id().ok() == Some(id)
        || inquire::Confirm::new(&format!("Use {id} by default?"))
            .with_default(true)
            .prompt()
            .context("Failed to read answer")?;
    if make_default {
        cfg.set_default_provider(id);
    }

    cfg.save()?;
    let path = Config::config_file_path()?;
    println!("Configured provider {id}. Config: {}", path.display());
    Ok(())
}

fn resolve_locations(args: &ShowArgs, cfg: &Config) -> anyhow::Result<Vec<Location>> {
    if let (Some(lat), Some(lon)) = (args.lat, args.lon) {
        return Ok(vec![Location::new(args.label.clone(), lat, lon)?]);
    }

    if args.names.is_empty() {
        let all = cfg.all_locations()?;
        if all.is_empty() {
            bail!(
                "No locations to show.\n\
                 Hint: pass --lat/--lon, or run `rainchart add-location <name> <lat> <lon>` first."
            );
        }
        return Ok(all);
    }

    args.names.iter().map(|name| cfg.location(name)).collect()
}

async fn show(args: ShowArgs) -> anyhow::Result<()> {
    let mut cfg = Config::load()?;
    let locations = resolve_locations(&args, &cfg)?;

    let id = match &args.provider {
        Some(name) => ProviderId::try_from(name.as_str())?,
        None => cfg.default_provider_id()?,
    };
    if args.daily {
        if id != ProviderId::OpenMeteo {
            warn!(provider = %id, "--daily only applies to open-meteo; ignoring");
        }
        cfg.fields = Some(FieldMap::daily());
    }

    let past_days = args.past_days.unwrap_or(cfg.past_days);
    let forecast_days = args.forecast_days.unwrap_or(cfg.forecast_days);
    let provider = provider_from_config(id, &cfg)?;

    let results = run_all(
        provider.as_ref(),
        &locations,
        past_days,
        forecast_days,
        Utc::now(),
    )
    .await;
    let failed = results.iter().filter(|(_, r)| r.is_err()).count();

    if args.json {
        let docs: Vec<_> = results
            .iter()
            .map(|(location, result)| output::to_json(location.name(), result))
            .collect();
        println!("{}", serde_json::to_string_pretty(&docs)?);
    } else {
        for (location, result) in &results {
            match result {
                Ok(series) => println!("{}", output::render_table(series)),
                Err(err) => error!(location = location.name(), "{err}"),
            }
        }
    }

    if failed > 0 {
        bail!("{failed} of {} locations failed", results.len());
    }
    Ok(())
}
