//! NDVI diagnostic command.
//!
//! Runs the full pipeline for one point and date:
//! - searches the STAC catalog for the latest matching scene
//! - reads only the red and near-infrared pixels around the point
//! - writes the rendered PNG and/or prints it as a data URI

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use cropwatch_common::{parse_date, GeoPoint};
use ndvi_processor::{NdviPipeline, NdviProduct, PipelineConfig};

#[derive(Parser, Debug)]
#[command(name = "cropwatch")]
#[command(about = "Compute NDVI around a point from Sentinel-2 imagery")]
struct Args {
    /// Latitude in degrees
    #[arg(long, allow_hyphen_values = true)]
    lat: f64,

    /// Longitude in degrees (wrapped into [-180, 180])
    #[arg(long, allow_hyphen_values = true)]
    lon: f64,

    /// First day of the search window (YYYY-MM-DD)
    #[arg(long, default_value = "2025-07-01")]
    date: String,

    /// Write the rendered PNG here
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the image as a data URI
    #[arg(long)]
    print_data_uri: bool,

    /// STAC API root
    #[arg(long, env = "CATALOG_URL")]
    catalog_url: Option<String>,

    /// STAC collection to search
    #[arg(long, env = "CATALOG_COLLECTION")]
    collection: Option<String>,

    /// Upper bound on scene cloud cover, in percent
    #[arg(long, env = "MAX_CLOUD_COVER")]
    max_cloud_cover: Option<f64>,

    /// Length of the search window in days
    #[arg(long, env = "SEARCH_WINDOW_DAYS")]
    window_days: Option<u32>,

    /// Half-width of the region around the point, in degrees
    #[arg(long, env = "REGION_MARGIN_DEG")]
    margin: Option<f64>,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

impl Args {
    fn config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::from_env();

        if let Some(url) = &self.catalog_url {
            config.catalog.url = url.clone();
        }
        if let Some(collection) = &self.collection {
            config.catalog.collection = collection.clone();
        }
        if let Some(cloud) = self.max_cloud_cover {
            config.catalog.max_cloud_cover = cloud;
        }
        if let Some(days) = self.window_days {
            config.catalog.window_days = days;
        }
        if let Some(margin) = self.margin {
            config.margin_deg = margin;
        }

        config
    }
}

fn init_tracing(log_level: &str, json: bool) -> Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr);

    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

fn summary(product: &NdviProduct) -> serde_json::Value {
    json!({
        "scene_id": product.scene_id,
        "datetime": product.datetime.to_rfc3339(),
        "cloud_cover": product.cloud_cover,
        "crs": product.crs.to_string(),
        "window": product.window,
        "valid_pixels": product.stats.valid_pixels,
        "nodata_pixels": product.stats.nodata_pixels,
        "mean_ndvi": product.stats.mean,
        "image": {
            "mime": product.image.mime,
            "width": product.image.width,
            "height": product.image.height,
            "bytes": product.image.bytes.len(),
        },
        "caption": product.caption(),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_tracing(&args.log_level, args.json_logs)?;

    let config = args.config();
    let date = parse_date(&args.date)?;
    let point = GeoPoint::new(args.lat, args.lon)?;

    info!(
        lat = point.lat(),
        lon = point.lon(),
        %date,
        catalog = %config.catalog.url,
        "Starting NDVI run"
    );

    let pipeline = NdviPipeline::from_config(config)?;

    let product = match pipeline.run(point, date).await {
        Ok(product) => product,
        Err(e) => {
            error!(error = %e, kind = e.kind(), "NDVI run failed");
            eprintln!("{}", e.user_message());
            std::process::exit(1);
        }
    };

    if let Some(path) = &args.output {
        tokio::fs::write(path, &product.image.bytes)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "Wrote PNG");
    }

    println!("{}", serde_json::to_string_pretty(&summary(&product))?);

    if args.print_data_uri {
        println!("{}", product.image.to_data_uri());
    }

    Ok(())
}
