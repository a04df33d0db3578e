use clap::Parser;
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use aerodex::{AirportCatalog, CatalogConfig};
use aerodex::loader;
use aerodex::manager::{self, SystemProfile};
use aerodex::server::CatalogServer;
use aerodex::store::AirportStore;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Clone, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(long, env = "AERODEX_ADDR", default_value = "0.0.0.0:5000")]
    addr: SocketAddr,

    /// Directory holding the airport segment file
    #[clap(long, env = "AERODEX_DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,

    /// Airports JSON file loaded at start-up when the catalog is empty
    #[clap(long, env = "AERODEX_IMPORT")]
    import: Option<PathBuf>,

    #[clap(long, env = "AERODEX_POPULARITY_TTL", default_value = "86400")]
    popularity_ttl_secs: u64,

    #[clap(long, env = "AERODEX_DEFAULT_RADIUS_KM", default_value = "100")]
    default_radius_km: f64,

    #[clap(long, env = "AERODEX_MAINTENANCE_INTERVAL", default_value = "600")]
    maintenance_interval_secs: u64,
}

fn main() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info,aerodex=info");
    }
    tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .with_target(false)
    .with_level(true)
    .init();

    let args = Args::parse();
    let profile = SystemProfile::detect();
    info!(
        cores = profile.logical_cores,
        workers = profile.worker_threads,
        strict_durability = profile.strict_durability,
        "Resource profile"
    );

    let runtime = match tokio::runtime::Builder::new_multi_thread()
    .worker_threads(profile.worker_threads)
    .enable_all()
    .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "Failed to start tokio runtime");
            process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(async_main(args, profile)) {
        error!(error = %e, "aerodex stopped");
        process::exit(1);
    }
}

async fn async_main(args: Args, profile: SystemProfile) -> Result<(), Box<dyn std::error::Error>> {
    fs::create_dir_all(&args.data_dir)?;
    let segment_path = args.data_dir.join("airports.seg");

    info!(path = %segment_path.display(), "Opening document store");
    let store = AirportStore::open(&segment_path, profile.strict_durability)?;

    let config = CatalogConfig {
        popularity_ttl: Duration::from_secs(args.popularity_ttl_secs),
        default_radius_km: args.default_radius_km,
        ..CatalogConfig::default()
    };
    let catalog = Arc::new(AirportCatalog::new(store, config));
    catalog.rebuild_index()?;

    if let Some(path) = &args.import {
        match loader::import_if_empty(catalog.as_ref(), path) {
            Ok(Some(report)) => info!(imported = report.imported, skipped = report.skipped(), "Initial data loaded"),
            Ok(None) => {}
            Err(e) => error!(path = %path.display(), error = %e, "Initial import failed"),
        }
    }

    manager::start_maintenance_thread(catalog.clone(), Duration::from_secs(args.maintenance_interval_secs.max(1)));

    let shutdown = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutting down."),
            Err(e) => {
                error!(error = %e, "Cannot listen for ctrl-c, serving until killed");
                std::future::pending::<()>().await;
            }
        }
    };
    CatalogServer::new(catalog).run(args.addr, shutdown).await?;
    Ok(())
}
