//! Lloyd's k-means over the RGB channels of a [`PixelBuffer`].
//!
//! A run goes through the following states:
//! 1. Initializing: the options are validated, the centroids are drawn
//!    (from random pixels or the provided initial centroids),
//!    and one worker thread is started per range of pixels.
//! 2. Iterating: each pass assigns every pixel to its nearest centroid in parallel,
//!    then moves each centroid to the mean of its pixels on the calling thread.
//!    The run converges on the first pass where no centroid channel changed by more
//!    than the threshold relative to its previous value.
//! 3. Converged or not converged: the workers are joined, and either a [`Clustering`]
//!    or [`KmeansError::NotConverged`] is returned.
//!
//! Starting centroids are not required to be distinct. Two centroids seeded from the same color
//! either separate over the following passes or one of them stays empty for the whole run,
//! leaving fewer than `K` distinct colors in the result.

mod assign;
mod centroids;
mod pool;

use crate::{ConfigError, KmeansError, KmeansOptions, PixelBuffer};
use centroids::{CentroidSet, ConvergenceChecker};
use log::{debug, trace};
use palette::{
    cast::{self, IntoArrays},
    Srgb,
};
use pool::Shared;
use rand::SeedableRng;
use rand_xoshiro::Xoroshiro128PlusPlus;
#[cfg(feature = "threads")]
use rayon::prelude::*;

/// The result of a k-means run.
///
/// Note that the `palette` colors are not guaranteed to be unique,
/// and each count is not guaranteed to be non-zero.
#[derive(Debug, Clone, PartialEq)]
pub struct Clustering {
    /// The number of assignment and update passes that were run.
    pub iterations: u32,
    /// The final centroid colors, with unrounded channels in `0.0..=255.0`.
    pub centroids: Vec<Srgb<f32>>,
    /// The number of pixels assigned to each centroid.
    pub counts: Vec<u32>,
    /// The index of the centroid each pixel was assigned to.
    pub indices: Vec<u32>,
}

impl Clustering {
    /// Returns the centroid colors rounded to the nearest 8-bit values.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn palette(&self) -> Vec<Srgb<u8>> {
        self.centroids
            .iter()
            .map(|&color| {
                cast::from_array(cast::into_array(color).map(|c| c.round().clamp(0.0, 255.0) as u8))
            })
            .collect()
    }

    fn check_len(&self, pixels: &PixelBuffer) -> Result<(), ConfigError> {
        if self.indices.len() == pixels.num_pixels() {
            Ok(())
        } else {
            Err(ConfigError::PixelCountMismatch {
                expected: self.indices.len(),
                actual: pixels.num_pixels(),
            })
        }
    }

    /// Overwrites the color channels of each pixel with the color of its centroid.
    ///
    /// The alpha channel, if any, is left untouched.
    ///
    /// # Errors
    /// Returns an error if `pixels` does not have the same number of pixels as this [`Clustering`].
    pub fn apply(&self, pixels: &mut PixelBuffer) -> Result<(), ConfigError> {
        self.check_len(pixels)?;

        let palette: Vec<[u8; 3]> = self.palette().into_arrays();
        let channels = pixels.channels();
        for (pixel, &i) in pixels.samples_mut().chunks_exact_mut(channels).zip(&self.indices) {
            pixel[..3].copy_from_slice(&palette[i as usize]);
        }

        Ok(())
    }

    /// Overwrites the color channels of each pixel with the color of its centroid in parallel.
    ///
    /// The alpha channel, if any, is left untouched.
    ///
    /// # Errors
    /// Returns an error if `pixels` does not have the same number of pixels as this [`Clustering`].
    #[cfg(feature = "threads")]
    pub fn apply_par(&self, pixels: &mut PixelBuffer) -> Result<(), ConfigError> {
        self.check_len(pixels)?;

        let palette: Vec<[u8; 3]> = self.palette().into_arrays();
        let channels = pixels.channels();
        pixels
            .samples_mut()
            .par_chunks_exact_mut(channels)
            .zip(self.indices.par_iter())
            .for_each(|(pixel, &i)| pixel[..3].copy_from_slice(&palette[i as usize]));

        Ok(())
    }
}

fn rng(seed: Option<u64>) -> Xoroshiro128PlusPlus {
    seed.map_or_else(
        Xoroshiro128PlusPlus::from_entropy,
        Xoroshiro128PlusPlus::seed_from_u64,
    )
}

/// Clusters the pixels of `pixels` without modifying them.
///
/// On success, the returned [`Clustering`] can be written to the buffer with [`Clustering::apply`].
///
/// # Errors
/// - [`KmeansError::Config`] if the options are invalid.
/// - [`KmeansError::NotConverged`] if the iteration limit was reached,
///   holding the clustering from the last pass.
/// - [`KmeansError::Spawn`] or [`KmeansError::WorkerPanicked`] if a worker thread failed.
pub fn cluster(pixels: &PixelBuffer, options: &KmeansOptions) -> Result<Clustering, KmeansError> {
    options.validate()?;

    let k = options.cluster_count as usize;
    let threads = options.thread_count;
    let limit = options.iteration_limit;
    let num_pixels = pixels.num_pixels();

    let mut centroids = if let Some(initial) = &options.initial_centroids {
        CentroidSet::from_colors(initial.iter().map(|&color| cast::into_array(color)))
    } else {
        CentroidSet::random(pixels, k, &mut rng(options.seed))
    };

    let checker = ConvergenceChecker::new(options.threshold);

    debug!(
        "clustering {num_pixels} pixels into {k} clusters on {threads} threads (seed: {:?})",
        options.seed
    );

    let shared = Shared::new(k, num_pixels, threads);
    let converged = pool::run(&shared, pixels.samples(), pixels.channels(), |shared| {
        for iteration in 1..=limit {
            shared.publish(&centroids);
            shared.dispatch()?;
            centroids.update(pixels.colors().zip(shared.assignment()));

            if !checker.any_changed(&centroids) {
                return Ok(Some(iteration));
            }
            trace!("iteration {iteration} moved at least one centroid");
        }
        Ok(None)
    })?;

    let clustering = Clustering {
        iterations: converged.unwrap_or(limit),
        centroids: centroids.colors().map(cast::from_array).collect(),
        counts: centroids.counts().collect(),
        indices: shared.into_assignment(),
    };

    if let Some(iterations) = converged {
        debug!("converged after {iterations} iterations");
        Ok(clustering)
    } else {
        debug!("did not converge within {limit} iterations");
        Err(KmeansError::NotConverged(Box::new(clustering)))
    }
}

/// Reduces the colors of `pixels` to at most `K` colors, in place.
///
/// Each pixel's color channels are replaced by the rounded color of its cluster,
/// leaving any alpha channel untouched. The pixels are only modified if the run converged.
///
/// # Errors
/// See [`cluster`]. On [`KmeansError::NotConverged`], the buffer is left unmodified
/// and the best-effort [`Clustering`] may still be applied by the caller.
///
/// # Examples
/// ```
/// # use palettize::{kmeans, KmeansError, KmeansOptions, PixelBuffer};
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut samples = vec![0u8, 0, 0, 255, 255, 255];
/// let mut pixels = PixelBuffer::rgb(&mut samples)?;
/// let options = KmeansOptions::new().cluster_count(1).iteration_limit(1).seed(0);
///
/// match kmeans::quantize(&mut pixels, &options) {
///     Ok(clustering) => println!("converged after {} iterations", clustering.iterations),
///     Err(KmeansError::NotConverged(clustering)) => clustering.apply(&mut pixels)?,
///     Err(e) => return Err(e.into()),
/// }
///
/// assert_eq!(samples, vec![128u8; 6]);
/// # Ok(())
/// # }
/// ```
pub fn quantize(
    pixels: &mut PixelBuffer,
    options: &KmeansOptions,
) -> Result<Clustering, KmeansError> {
    let clustering = cluster(pixels, options)?;
    clustering.apply(pixels)?;
    Ok(clustering)
}
