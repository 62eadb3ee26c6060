//! Contains the builder struct for the k-means parameters.

use crate::{ConfigError, DEFAULT_THRESHOLD};
use palette::Srgb;

/// A builder struct to specify the parameters for k-means.
///
/// # Examples
/// ```
/// # use palettize::KmeansOptions;
/// let options = KmeansOptions::new()
///     .cluster_count(16)
///     .iteration_limit(200)
///     .thread_count(8)
///     .seed(42);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct KmeansOptions {
    /// The number of clusters, K.
    pub(crate) cluster_count: u32,
    /// The maximum number of assignment and update passes.
    pub(crate) iteration_limit: u32,
    /// The number of worker threads computing assignments.
    pub(crate) thread_count: usize,
    /// The relative change cutoff used by the convergence check.
    pub(crate) threshold: f32,
    /// The seed value for the random number generator.
    pub(crate) seed: Option<u64>,
    /// Explicit starting colors, used instead of random pixels.
    pub(crate) initial_centroids: Option<Vec<Srgb<u8>>>,
}

impl Default for KmeansOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl KmeansOptions {
    /// Creates a new [`KmeansOptions`] with default values.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            cluster_count: 8,
            iteration_limit: 1000,
            thread_count: 4,
            threshold: DEFAULT_THRESHOLD,
            seed: None,
            initial_centroids: None,
        }
    }

    /// Sets the number of clusters (and therefore colors) to reduce the image to.
    ///
    /// The default cluster count is `8`.
    #[must_use]
    pub fn cluster_count(mut self, cluster_count: u32) -> Self {
        self.cluster_count = cluster_count;
        self
    }

    /// Sets the maximum number of iterations before giving up on convergence.
    ///
    /// The default limit is `1000`.
    #[must_use]
    pub fn iteration_limit(mut self, iteration_limit: u32) -> Self {
        self.iteration_limit = iteration_limit;
        self
    }

    /// Sets the number of worker threads used for the assignment phase.
    ///
    /// The pixels are split into this many contiguous ranges, one per thread.
    /// The default thread count is `4`.
    #[must_use]
    pub fn thread_count(mut self, thread_count: usize) -> Self {
        self.thread_count = thread_count;
        self
    }

    /// Sets the convergence threshold.
    ///
    /// A run converges once no channel of any centroid moved by more than this
    /// fraction of its previous value. For channels whose previous value was `0`,
    /// the absolute change is compared against the threshold instead.
    ///
    /// The default threshold is [`DEFAULT_THRESHOLD`] (`0.01`).
    #[must_use]
    pub fn threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Sets the seed value for the random number generator.
    ///
    /// By default, no seed is set and the generator is seeded from the operating system,
    /// so each run may pick different initial centroids.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Sets the initial colors/centroids for the k-means algorithm.
    ///
    /// This also sets the cluster count to the number of colors given.
    /// By default, each initial centroid is the color of a randomly chosen pixel.
    #[must_use]
    pub fn initial_centroids(mut self, centroids: Vec<Srgb<u8>>) -> Self {
        self.cluster_count = u32::try_from(centroids.len()).unwrap_or(u32::MAX);
        self.initial_centroids = Some(centroids);
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.cluster_count == 0 {
            return Err(ConfigError::ZeroClusters);
        }
        if self.thread_count == 0 {
            return Err(ConfigError::ZeroThreads);
        }
        if self.iteration_limit == 0 {
            return Err(ConfigError::ZeroIterations);
        }
        if !(self.threshold.is_finite() && self.threshold >= 0.0) {
            return Err(ConfigError::InvalidThreshold);
        }
        match &self.initial_centroids {
            Some(centroids) if centroids.len() != self.cluster_count as usize => {
                Err(ConfigError::CentroidCountMismatch {
                    expected: self.cluster_count,
                    actual: centroids.len(),
                })
            }
            _ => Ok(()),
        }
    }
}
