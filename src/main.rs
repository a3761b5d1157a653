use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tracing::{error, info, warn};

use notamboard::config::NotamboardConfig;
use notamboard::dashboard::Dashboard;
use notamboard::filters::{AltitudeBand, DateRange, FilterState, Region};
use notamboard::gateway::{HttpNotamGateway, InMemoryGateway, NotamGateway, StaticCredentials};
use notamboard::log_format;
use notamboard::map::{GeoJsonBackend, MapSurfaceController};
use notamboard::minima::{MinimaThreshold, WeatherReport, WeatherValue, evaluate};
use notamboard::notams::NotamCategory;
use notamboard::weather::{HttpWeatherSource, WeatherMonitor, WeatherSource, run_refresh_loop};

#[derive(Parser, Debug)]
#[command(
    name = "notamboard",
    version = notamboard::version(),
    about = "NOTAM dashboard pipeline and weather minima checks"
)]
struct Cli {
    /// Path to notamboard.toml (default: $NOTAMBOARD_CONFIG or ./notamboard.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load NOTAMs through the dashboard pipeline and print the resulting state as JSON
    Notams(NotamsArgs),
    /// Check one ceiling/visibility pair against minima
    Minima(MinimaArgs),
    /// Fetch weather for airports and check them against minima
    Weather(WeatherArgs),
}

#[derive(Args, Debug)]
struct NotamsArgs {
    /// JSON array of NOTAM records; without it the configured gateway URL is used
    #[arg(long)]
    records: Option<PathBuf>,
    /// all, north-america, europe, asia, africa, oceania, south-america
    #[arg(long)]
    region: Option<Region>,
    /// all, airspace, airport, navaid, obstacle, procedure
    #[arg(long)]
    category: Option<String>,
    /// current, today, week, month
    #[arg(long)]
    date_range: Option<DateRange>,
    #[arg(long)]
    min_alt: Option<i32>,
    #[arg(long)]
    max_alt: Option<i32>,
    /// Free-text search (3+ characters) replacing the structured filters
    #[arg(long)]
    search: Option<String>,
    /// Open the detail view for this NOTAM id
    #[arg(long)]
    select: Option<String>,
    /// Write the map surface as GeoJSON
    #[arg(long)]
    geojson: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct MinimaArgs {
    /// Reported ceiling, e.g. 1200, "1,500 ft", OVC012
    #[arg(long)]
    ceiling: Option<String>,
    /// Reported visibility, e.g. 10, "1 1/2", P6SM
    #[arg(long)]
    visibility: Option<String>,
    #[arg(long)]
    min_ceiling: Option<i32>,
    #[arg(long)]
    min_visibility: Option<f64>,
}

#[derive(Args, Debug)]
struct WeatherArgs {
    /// ICAO codes; defaults to [weather] monitored
    #[arg(long = "icao")]
    icaos: Vec<String>,
    /// Keep polling every weather.refresh_secs until Ctrl+C
    #[arg(long)]
    watch: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    log_format::init_tracing(log_format::DEFAULT_FILTER)?;
    notamboard::metrics::initialize_dashboard_metrics();

    let cli = Cli::parse();
    let config = NotamboardConfig::resolve(cli.config.as_deref())?;
    info!("notamboard {}", notamboard::version());

    match cli.command {
        Commands::Notams(args) => handle_notams(&config, args).await,
        Commands::Minima(args) => handle_minima(&config, args),
        Commands::Weather(args) => handle_weather(&config, args).await,
    }
}

fn parse_category(raw: &str) -> Result<Option<NotamCategory>> {
    if raw.eq_ignore_ascii_case("all") {
        return Ok(None);
    }
    raw.parse()
        .map(Some)
        .map_err(|e: String| anyhow::anyhow!(e))
}

fn build_filters(config: &NotamboardConfig, args: &NotamsArgs) -> Result<FilterState> {
    let mut filters = config.filters.clone();
    if let Some(region) = args.region {
        filters.region = region;
    }
    if let Some(category) = &args.category {
        filters.category = parse_category(category)?;
    }
    if let Some(date_range) = args.date_range {
        filters.date_range = date_range;
    }
    if args.min_alt.is_some() || args.max_alt.is_some() {
        filters.altitude = AltitudeBand::new(args.min_alt, args.max_alt);
    }
    Ok(filters)
}

fn build_gateway(config: &NotamboardConfig, records: Option<&Path>) -> Result<Arc<dyn NotamGateway>> {
    if let Some(path) = records {
        return Ok(Arc::new(InMemoryGateway::from_json_file(path)?));
    }
    let Some(base_url) = &config.gateway.base_url else {
        bail!("No NOTAM source: pass --records or set gateway.base_url / NOTAM_API_URL");
    };
    Ok(Arc::new(HttpNotamGateway::new(base_url.clone(), config.gateway.timeout())?))
}

async fn handle_notams(config: &NotamboardConfig, args: NotamsArgs) -> Result<()> {
    let gateway = build_gateway(config, args.records.as_deref())?;
    let credentials = Arc::new(StaticCredentials::from_env(config.gateway.token_env.clone()));
    let backend = GeoJsonBackend::default();
    let controller = MapSurfaceController::new(Box::new(backend.clone()), config.map.settings());
    let filters = build_filters(config, &args)?;

    let dashboard = Dashboard::new(gateway, credentials, controller, &config.map.container, filters)
        .context("Failed to open map surface")?;

    dashboard.refresh().await;
    if let Some(term) = &args.search {
        dashboard.set_search_term(term).await;
    }
    if let Some(id) = &args.select {
        dashboard.select(id).await;
    }

    let snapshot = dashboard.snapshot().await;
    for status in [&snapshot.list, &snapshot.search, &snapshot.detail_status] {
        if let Some(error) = &status.error {
            warn!("{}", error);
        }
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&snapshot).context("Failed to serialize dashboard state")?
    );

    if let Some(path) = &args.geojson {
        let surface = dashboard.map_surface().await.context("Map surface is not open")?;
        let doc = backend
            .feature_collection(surface)
            .context("Map surface has no GeoJSON")?;
        let contents = serde_json::to_string_pretty(&doc).context("Failed to serialize GeoJSON")?;
        std::fs::write(path, contents).with_context(|| format!("Failed to write {:?}", path))?;
        info!("Wrote map surface to {:?}", path);
    }

    dashboard.shutdown().await;
    Ok(())
}

fn handle_minima(config: &NotamboardConfig, args: MinimaArgs) -> Result<()> {
    let threshold = MinimaThreshold::new(
        args.min_ceiling.unwrap_or(config.minima.ceiling),
        args.min_visibility.unwrap_or(config.minima.visibility),
    );
    let report = WeatherReport::new(
        args.ceiling.map(WeatherValue::Text),
        args.visibility.map(WeatherValue::Text),
    );
    let check = evaluate(&report, &threshold);
    println!(
        "{}",
        serde_json::to_string_pretty(&check).context("Failed to serialize minima check")?
    );
    Ok(())
}

async fn handle_weather(config: &NotamboardConfig, args: WeatherArgs) -> Result<()> {
    let Some(base_url) = &config.weather.base_url else {
        bail!("No weather source: set weather.base_url");
    };
    let source = HttpWeatherSource::new(base_url.clone(), config.gateway.timeout())?;

    let mut monitor = WeatherMonitor::new(config.minima);
    let icaos = if args.icaos.is_empty() {
        &config.weather.monitored
    } else {
        &args.icaos
    };
    for icao in icaos {
        monitor.add(icao);
    }
    if monitor.icaos().is_empty() {
        bail!("No airports to check: pass --icao or set weather.monitored");
    }

    if args.watch {
        monitor = watch_weather(monitor, Arc::new(source), config.weather.refresh_interval()).await?;
    } else {
        monitor.refresh_all(&source).await;
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&monitor.tiles()).context("Failed to serialize weather tiles")?
    );
    Ok(())
}

/// Poll until Ctrl+C, then hand back the monitor with the latest reports
async fn watch_weather(
    monitor: WeatherMonitor,
    source: Arc<dyn WeatherSource>,
    period: Duration,
) -> Result<WeatherMonitor> {
    info!(
        "Watching weather for {} airports every {}s",
        monitor.icaos().len(),
        period.as_secs()
    );
    let monitor = Arc::new(Mutex::new(monitor));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(run_refresh_loop(monitor.clone(), source, period, shutdown_rx));

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received SIGINT (Ctrl+C), stopping weather watch"),
        Err(err) => error!("Failed to listen for SIGINT signal: {}", err),
    }
    let _ = shutdown_tx.send(true);
    task.await.context("Weather refresh task panicked")?;

    let monitor = monitor.lock().await.clone();
    Ok(monitor)
}
