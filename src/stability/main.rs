//! Pagination-stability test against ArcGIS feature services.
//!
//! For each server under test, generates a random polygon that yields a
//! workable feature count, records the OID ordering of one big query, then
//! walks the same query in random-size pages and checks the joined pages
//! for duplicated, omitted, and reordered OIDs.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use rand::seq::IndexedRandom;
use rand::Rng;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use surveyor::arcgis::{ArcGisClient, PageRequest};
use surveyor::config::Config;
use surveyor::geometry::{self, Extent};
use surveyor::report::StabilityReport;

/// Public servers with known-mixed pagination behavior.
const SAMPLE_SERVERS: &[&str] = &[
    // Older server (10.91), does not give stable paginated results
    "https://sampleserver6.arcgisonline.com/arcgis/rest/services/USA/MapServer/0/query",
    // Recent version (11.2), gives stable paginated results
    "https://services.arcgis.com/P3ePLMYs2RVChkJx/arcgis/rest/services/USA_Major_Cities_/FeatureServer/0/query",
    // New version (11.3), still unstable pages
    "https://gis.blm.gov/arcgis/rest/services/recreation/BLM_Natl_Recreation_Sites_Facilities/MapServer/1/query",
    // New version (11.1), no unstable pages seen
    "https://energy.virginia.gov/gis/rest/services/DGMR/VA_Water_Wells/MapServer/0",
];

/// A trial geometry must return more than this many features...
const MIN_WORKABLE_FEATURES: usize = 9;
/// ...and fewer than this many, so one big query can hold them all.
const MAX_WORKABLE_FEATURES: usize = 300;

#[derive(Parser, Debug)]
#[command(name = "stability")]
#[command(about = "Test ArcGIS result pagination for duplicate, omitted, and reordered OIDs")]
struct Args {
    /// Server query URLs to test (default: one random sample server)
    urls: Vec<String>,

    /// TOML file listing servers to test
    #[arg(long)]
    config: Option<PathBuf>,

    /// Record cap for the single big reference query
    #[arg(long, default_value = "500")]
    max_features: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();
    let urls = resolve_servers(&args)?;
    info!("Testing {} server(s)", urls.len());

    let mut rng = rand::rng();

    for url in &urls {
        if let Err(e) = run_server_test(url, args.max_features, &mut rng).await {
            warn!("Test against {} failed: {:#}", url, e);
        }
    }

    Ok(())
}

/// Servers from the command line, the config file, or one random sample server.
fn resolve_servers(args: &Args) -> Result<Vec<String>> {
    if !args.urls.is_empty() {
        return Ok(args.urls.clone());
    }
    if let Some(path) = &args.config {
        let config = Config::load_from_file(path)?;
        return Ok(config.servers.into_iter().map(|s| s.url).collect());
    }

    let mut rng = rand::rng();
    let url = SAMPLE_SERVERS
        .choose(&mut rng)
        .expect("sample server list is not empty");
    Ok(vec![url.to_string()])
}

async fn run_server_test<R: Rng>(url: &str, max_features: usize, rng: &mut R) -> Result<()> {
    let mut client = ArcGisClient::new(url)?.with_order_by_oid();
    let host = client.host().to_string();

    println!("{} TEST BEGIN FOR {} {}", "=".repeat(12), host, "=".repeat(12));
    println!("Server under test = {}", url);

    let server_version = client.server_version().await;
    match server_version {
        Some(version) => println!("Server version = {}", version),
        None => println!("Server version = unknown"),
    }

    let layer_info = client.layer_info().await;
    let extent: Extent = layer_info
        .as_ref()
        .and_then(|info| info.extent)
        .map(Extent::from)
        .unwrap_or_else(Extent::conus);
    println!(
        "xmin={} xmax={} ymin={} ymax={}",
        extent.xmin, extent.xmax, extent.ymin, extent.ymax
    );

    if let Some(oid_field) = layer_info.as_ref().and_then(|info| info.oid_field()) {
        client.set_oid_field(&oid_field);
    }

    // Find a triangle which, when queried for up to `max_features`, returns a
    // workable number of features.
    let polygon = loop {
        let candidate = geometry::random_polygon(rng, &extent, 3);
        let count = client
            .query_page(&candidate, PageRequest { offset: 0, count: max_features })
            .await?
            .len();
        if count > MIN_WORKABLE_FEATURES && count < MAX_WORKABLE_FEATURES {
            break candidate;
        }
    };
    println!(
        "Running test with random geometry {}",
        geometry::to_esri_json(&polygon)
    );
    println!(
        "Test geometry is {:.0} km^2 in area",
        geometry::geodesic_area_km2(&polygon)
    );
    println!();

    // The "expected" ordering comes from one big query.
    let expected = client
        .query_page(&polygon, PageRequest { offset: 0, count: max_features })
        .await?
        .oids;
    println!("expected oids ({}) = {:?}", expected.len(), expected);

    // Join pages together and analyze for repeats, omissions, and reordering.
    let walk = client.query_all_pages(rng, &polygon).await?;

    let report = StabilityReport {
        host: host.clone(),
        server_version,
        expected,
        walk,
    };
    println!("{}", report);
    println!();
    println!("{} TEST END FOR {} {}", "=".repeat(12), host, "=".repeat(12));
    println!();

    Ok(())
}
