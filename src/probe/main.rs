//! Repeated count-stability probe.
//!
//! The exploratory procedure that preceded the full stability test: sum
//! paginated feature counts under random polygons, cross-check each sum
//! against one big query, and repeat until a polygon is found whose counts
//! drift between runs.

use anyhow::Result;
use clap::Parser;
use geo_types::Polygon;
use hashbrown::HashSet;
use indicatif::{ProgressBar, ProgressStyle};
use rand::Rng;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use surveyor::arcgis::{ArcGisClient, Oid, PageRequest};
use surveyor::geometry::{self, Extent};

const DEFAULT_SERVER: &str =
    "https://sampleserver6.arcgisonline.com/arcgis/rest/services/USA/MapServer/0/query";

/// Record cap that comfortably exceeds any layer under test.
const BIG_QUERY_COUNT: usize = 99_999;

/// Consecutive empty pages tolerated before a paginated walk gives up.
const ZERO_REPLY_BUDGET: u32 = 26;

/// How many times a sum must repeat before a polygon counts as stable.
const STABILITY_RUNS: u64 = 6;

#[derive(Parser, Debug)]
#[command(name = "probe")]
#[command(about = "Probe an ArcGIS layer for pagination count drift under random polygons")]
struct Args {
    /// Layer query URL to probe
    #[arg(long, default_value = DEFAULT_SERVER)]
    url: String,

    /// Number of search rounds before giving up
    #[arg(long, default_value = "20")]
    rounds: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();
    info!("Probing {}", args.url);

    let client = ArcGisClient::new(&args.url)?;
    let extent = Extent::conus();
    let mut rng = rand::rng();

    let mut polygon = find_populated_polygon(&client, &mut rng, &extent, 3).await?;

    for _ in 0..args.rounds {
        let mut vertices = 3;
        while polygon_is_stable(&client, &mut rng, &polygon).await? {
            println!();
            polygon = find_populated_polygon(&client, &mut rng, &extent, vertices).await?;
            vertices += 1;
        }
    }

    println!("Done!");
    Ok(())
}

/// Query one page and count the features not seen before in this trial.
///
/// All returned OIDs are recorded so later pages cannot count them again.
async fn count_new_features(
    client: &ArcGisClient,
    polygon: &Polygon<f64>,
    request: PageRequest,
    seen: &mut HashSet<Oid>,
) -> Result<usize> {
    let page = client.query_page(polygon, request).await?;
    let new = page.oids.iter().filter(|oid| !seen.contains(*oid)).count();
    for oid in &page.oids {
        seen.insert(*oid);
    }
    Ok(new)
}

/// Generate random polygons until one returns at least one feature.
async fn find_populated_polygon<R: Rng>(
    client: &ArcGisClient,
    rng: &mut R,
    extent: &Extent,
    vertices: usize,
) -> Result<Polygon<f64>> {
    loop {
        let candidate = geometry::random_polygon(rng, extent, vertices);
        let mut seen = HashSet::new();
        let count =
            count_new_features(client, &candidate, PageRequest { offset: 0, count: 4 }, &mut seen)
                .await?;
        if count >= 1 {
            return Ok(candidate);
        }
    }
}

/// Page through everything under the polygon at one fixed page size, then
/// cross-check the total against a single large query.
async fn sum_paginated<R: Rng>(
    client: &ArcGisClient,
    rng: &mut R,
    polygon: &Polygon<f64>,
) -> Result<usize> {
    let page_size = rng.random_range(2..=8);
    let mut seen: HashSet<Oid> = HashSet::new();
    let mut total = 0usize;
    let mut offset = 0usize;
    let mut zero_budget = ZERO_REPLY_BUDGET;

    while zero_budget > 0 {
        let new = count_new_features(
            client,
            polygon,
            PageRequest { offset, count: page_size },
            &mut seen,
        )
        .await?;
        offset += new;
        total += new;
        if new < 1 {
            zero_budget -= 1;
        }
    }

    if total != seen.len() {
        warn!(
            "Paginated total {} disagrees with seen-set size {} ({:?})",
            total,
            seen.len(),
            seen
        );
    }

    let paginated: Vec<Oid> = seen.iter().copied().collect();
    let mut single_seen: HashSet<Oid> = HashSet::new();
    let single_total = count_new_features(
        client,
        polygon,
        PageRequest { offset: 0, count: BIG_QUERY_COUNT },
        &mut single_seen,
    )
    .await?;

    if single_total != total {
        warn!(
            "Paginated walk saw {} features but the single query saw {}",
            total, single_total
        );
        warn!(
            "single query oids ({}) = {:?}",
            single_seen.len(),
            single_seen
        );
        warn!("paginated oids ({}) = {:?}", paginated.len(), paginated);
    }

    Ok(total)
}

/// Run the paginated sum repeatedly; stable iff the count never changes.
async fn polygon_is_stable<R: Rng>(
    client: &ArcGisClient,
    rng: &mut R,
    polygon: &Polygon<f64>,
) -> Result<bool> {
    let mut previous = sum_paginated(client, rng, polygon).await?;

    let pb = ProgressBar::new(STABILITY_RUNS);
    pb.set_style(ProgressStyle::default_bar().template("  {bar:24} {pos}/{len} runs")?);

    for run in 0..STABILITY_RUNS {
        let count = sum_paginated(client, rng, polygon).await?;
        pb.inc(1);
        if count != previous {
            pb.finish_and_clear();
            println!(
                "On run {} to the server we first saw {} features and then saw {} features.",
                run, previous, count
            );
            println!(
                "This polygon broke the stability: {}",
                geometry::to_esri_json(polygon)
            );
            return Ok(false);
        }
        previous = count;
    }

    pb.finish_and_clear();
    println!(
        "The following polygon is stable, returns {} features {}x times: {}",
        previous,
        STABILITY_RUNS,
        geometry::to_esri_json(polygon)
    );
    Ok(true)
}
