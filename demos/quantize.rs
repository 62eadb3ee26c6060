#![deny(unsafe_code, unsafe_op_in_unsafe_fn)]
#![warn(
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::todo,
    clippy::unimplemented,
    clippy::unneeded_field_pattern,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::unnecessary_self_imports,
    clippy::str_to_string,
    clippy::string_to_string,
    clippy::string_slice
)]

use std::{error::Error, path::PathBuf, time::Instant};

use clap::Parser;
use log::{info, warn};
use palettize::{kmeans, KmeansError, KmeansOptions, PixelBuffer};

/// Maps the colors in an image to a lower number of colors using the k-means algorithm.
#[derive(Parser)]
pub struct Options {
    /// Source image path
    #[arg(short, long)]
    from: PathBuf,

    /// Result image path
    #[arg(short, long)]
    to: PathBuf,

    /// Number of clusters to use in k-means
    #[arg(short = 'k', long, default_value_t = 8)]
    clusters: u32,

    /// Maximum number of k-means iterations
    #[arg(short = 'i', long, default_value_t = 1000)]
    max_iter: u32,

    /// Number of threads
    #[arg(short = 'p', long, default_value_t = 4)]
    threads: usize,

    /// Seed for picking the initial centroids (random if not set)
    #[arg(long)]
    seed: Option<u64>,

    /// Save the last clustering even if k-means did not converge
    #[arg(long)]
    keep_unconverged: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Options {
        from,
        to,
        clusters,
        max_iter,
        threads,
        seed,
        keep_unconverged,
    } = Options::parse();

    info!("cluster count: {clusters}");
    info!("thread count: {threads}");

    info!("reading {}...", from.display());
    let mut image = image::open(&from)?.into_rgba8();
    let num_pixels = u64::from(image.width()) * u64::from(image.height());

    let mut options = KmeansOptions::new()
        .cluster_count(clusters)
        .iteration_limit(max_iter)
        .thread_count(threads);

    if let Some(seed) = seed {
        options = options.seed(seed);
    }

    let mut pixels = PixelBuffer::try_from(&mut image)?;

    info!("clustering is starting...");
    let start = Instant::now();
    let clustering = match kmeans::cluster(&pixels, &options) {
        Ok(clustering) => clustering,
        Err(KmeansError::NotConverged(clustering)) if keep_unconverged => {
            warn!("did not converge, keeping the result of the last iteration");
            *clustering
        }
        Err(e) => return Err(e.into()),
    };
    clustering.apply_par(&mut pixels)?;

    info!(
        "finished clustering {num_pixels} pixels ({} iterations) in {} milliseconds",
        clustering.iterations,
        start.elapsed().as_millis()
    );

    info!("storing image...");
    image.save(&to)?;
    info!("finished, saved result to {}", to.display());

    Ok(())
}
