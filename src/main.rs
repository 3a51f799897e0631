use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use cams_download::{
    BoundingBox, CancelToken, Client, ClientConfig, Credential, DateRange, OutputFormat, Padding,
    ProductKind, ProductRequest, SensingTime,
};
use chrono::NaiveDate;
use clap::{Parser, ValueEnum};
use tracing::info;

/// Download ECMWF CAMS data from the Atmosphere Data Store.
#[derive(Debug, Parser)]
#[command(name = "cams-download", version, about)]
struct Args {
    /// Credential file; defaults to the file named by ADSAPI_RC.
    #[arg(short, long)]
    authentication: Option<PathBuf>,

    /// Text file of `longitude latitude` records to derive the area from.
    #[arg(short, long)]
    coordinates: Option<PathBuf>,

    /// Directory the downloaded file is written to.
    #[arg(short, long, default_value = ".")]
    output_directory: PathBuf,

    #[arg(long, value_enum, default_value_t = Product::Reanalysis)]
    product: Product,

    /// Variable name, e.g. total_column_water_vapour.
    #[arg(long)]
    variable: String,

    /// First day (YYYY-MM-DD).
    #[arg(long)]
    start: NaiveDate,

    /// Last day (YYYY-MM-DD).
    #[arg(long)]
    end: NaiveDate,

    /// Sensing hour(s) of day.
    #[arg(long = "time", default_values_t = [0u32, 12])]
    times: Vec<u32>,

    /// Forecast lead time(s) in hours.
    #[arg(long = "leadtime", default_values_t = [0u32])]
    leadtimes: Vec<u32>,

    #[arg(long, value_enum, default_value_t = Format::Grib)]
    format: Format,

    /// Maximum number of status polls.
    #[arg(long, default_value_t = 120)]
    max_retries: usize,

    /// Seconds between status polls.
    #[arg(long, default_value_t = 60)]
    poll_interval: u64,

    /// Keep the job on the server after downloading.
    #[arg(long)]
    keep_job: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Product {
    Reanalysis,
    Forecast,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Grib,
    Netcdf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("cams_download=info".parse()?),
        )
        .with_target(false)
        .init();

    let args = Args::parse();

    if !args.output_directory.is_dir() {
        bail!(
            "output directory {} does not exist",
            args.output_directory.display()
        );
    }

    let credential = Credential::load(args.authentication.as_deref())?;
    let config = ClientConfig::default()
        .with_max_retries(args.max_retries)
        .with_poll_interval(Duration::from_secs(args.poll_interval))
        .with_delete_after_download(!args.keep_job);
    let client = Client::new(credential, config)?;

    let kind = match args.product {
        Product::Reanalysis => ProductKind::Reanalysis,
        Product::Forecast => ProductKind::Forecast {
            leadtime_hours: args.leadtimes.clone(),
        },
    };
    let format = match args.format {
        Format::Grib => OutputFormat::Grib,
        Format::Netcdf => OutputFormat::NetCdf,
    };
    let times = args
        .times
        .iter()
        .map(|&h| SensingTime::from_hour(h))
        .collect::<Result<Vec<_>, _>>()?;

    let dates = DateRange::new(args.start, args.end)?;
    let mut request = ProductRequest::new(kind, args.variable.as_str(), dates, times, format)?;
    if let Some(coords) = &args.coordinates {
        let area = BoundingBox::from_coordinate_file(coords, Padding::default())?;
        info!(?area, "derived bounding box");
        request = request.with_area(area);
    }

    let cancel = CancelToken::new();
    cancel
        .cancel_on_interrupt()
        .context("failed to install interrupt handler")?;

    let path = client.retrieve(&request, &args.output_directory, &cancel)?;
    println!("{}", path.display());
    Ok(())
}
