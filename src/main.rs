use anyhow::{bail, Context, Result};
use cane_et::{parse_iso_date, CachedBackend, EtConfig, EtPipeline, Geometry, HttpBackend, Sensor};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cane-et")]
#[command(about = "Evapotranspiration monitoring for sugarcane farms")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (JSON); defaults to the user config directory
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Raster backend URL, overrides the configuration
    #[arg(long, global = true)]
    backend_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute ET, time series and trend for a farm
    Analyze {
        /// Farm boundary as GeoJSON (Point or Polygon)
        #[arg(short, long, conflicts_with = "point", required_unless_present = "point")]
        geometry: Option<PathBuf>,

        /// Farm location as lon,lat
        #[arg(long, value_parser = parse_point)]
        point: Option<(f64, f64)>,

        /// First day (YYYY-MM-DD)
        #[arg(short, long)]
        start: String,

        /// Last day, inclusive (YYYY-MM-DD)
        #[arg(short, long)]
        end: String,

        /// MODIS or Landsat
        #[arg(long, default_value = "MODIS")]
        sensor: String,

        /// Write the report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Process images one at a time
        #[arg(long)]
        sequential: bool,
    },

    /// Check that the raster backend is reachable
    Check,
}

fn parse_point(value: &str) -> Result<(f64, f64), String> {
    let (lon, lat) = value
        .split_once(',')
        .ok_or_else(|| format!("expected lon,lat, got '{}'", value))?;
    let lon: f64 = lon.trim().parse().map_err(|e| format!("bad longitude: {}", e))?;
    let lat: f64 = lat.trim().parse().map_err(|e| format!("bad latitude: {}", e))?;
    Ok((lon, lat))
}

fn load_config(cli: &Cli) -> Result<EtConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let mut config = EtConfig::from_file(path)
                .with_context(|| format!("reading configuration {}", path.display()))?;
            config.apply_env();
            config
        }
        None => EtConfig::load_default().context("loading default configuration")?,
    };
    if let Some(url) = &cli.backend_url {
        config.backend.url = url.clone();
    }
    Ok(config)
}

fn main() -> Result<()> {
    env_logger::init();
    run(Cli::parse())
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Analyze {
            geometry,
            point,
            start,
            end,
            sensor,
            output,
            sequential,
        } => {
            // Request errors must surface before the backend is contacted
            let sensor: Sensor = sensor.parse()?;
            let start = parse_iso_date(&start)?;
            let end = parse_iso_date(&end)?;

            let farm = match (geometry, point) {
                (Some(path), _) => Geometry::from_geojson_file(&path)
                    .with_context(|| format!("reading farm geometry {}", path.display()))?,
                (None, Some((lon, lat))) => Geometry::point(lon, lat),
                (None, None) => bail!("either --geometry or --point is required"),
            };

            let mut config = config;
            if sequential {
                config.parallel = false;
            }

            let backend = HttpBackend::connect(config.backend.clone())
                .context("connecting to the raster backend")?;
            let pipeline = EtPipeline::new(CachedBackend::new(backend), &config);
            let report = pipeline.analyze(&farm, start, end, sensor)?;

            log::info!(
                "{:?}: {} images, trend {:?}",
                report.status,
                report.image_count,
                report.summary.trend
            );

            let json = serde_json::to_string_pretty(&report)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("writing report {}", path.display()))?;
                    println!("Report written to {}", path.display());
                }
                None => println!("{}", json),
            }
        }

        Commands::Check => {
            let backend = HttpBackend::new(config.backend.clone())?;
            backend
                .health()
                .with_context(|| format!("backend at {} is not reachable", config.backend.url))?;
            println!("Backend at {} is healthy", config.backend.url);
        }
    }

    Ok(())
}
