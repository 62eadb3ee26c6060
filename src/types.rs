//! Contains various types needed across the crate.

use crate::kmeans::Clustering;
use std::{io, slice::ChunksExact};
use thiserror::Error;
#[cfg(feature = "image")]
use image::{RgbImage, RgbaImage};

/// An error type for invalid inputs, reported before any clustering work starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The requested number of clusters was zero.
    #[error("the cluster count must be at least 1")]
    ZeroClusters,
    /// The requested number of worker threads was zero.
    #[error("the thread count must be at least 1")]
    ZeroThreads,
    /// The iteration limit was zero.
    #[error("the iteration limit must be at least 1")]
    ZeroIterations,
    /// The convergence threshold was negative or not a number.
    #[error("the convergence threshold must be a finite, non-negative number")]
    InvalidThreshold,
    /// The pixel buffer contained no pixels.
    #[error("the pixel buffer is empty")]
    EmptyImage,
    /// Only 3 (RGB) or 4 (RGBA) channels per pixel are supported.
    #[error("unsupported number of channels per pixel: {0}")]
    UnsupportedChannels(usize),
    /// The number of samples is not a multiple of the channel count.
    #[error("{len} samples do not divide into pixels of {channels} channels")]
    TruncatedPixel {
        /// The number of samples in the buffer.
        len: usize,
        /// The number of channels per pixel.
        channels: usize,
    },
    /// The number of explicit initial centroids differs from the cluster count.
    #[error("expected {expected} initial centroids but got {actual}")]
    CentroidCountMismatch {
        /// The configured cluster count.
        expected: u32,
        /// The number of initial centroids provided.
        actual: usize,
    },
    /// A [`Clustering`] was applied to a buffer with a different number of pixels.
    #[error("the clustering covers {expected} pixels but the buffer has {actual}")]
    PixelCountMismatch {
        /// The number of pixels in the clustering.
        expected: usize,
        /// The number of pixels in the buffer.
        actual: usize,
    },
}

/// The error type returned by the k-means engine.
#[derive(Debug, Error)]
pub enum KmeansError {
    /// The options or pixel buffer were invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The iteration limit was reached before the centroids settled.
    ///
    /// The best-effort result is included so that the caller may still
    /// [`apply`](Clustering::apply) it if it is good enough.
    #[error("k-means did not converge within {} iterations", .0.iterations)]
    NotConverged(Box<Clustering>),
    /// A worker thread could not be started.
    #[error("failed to spawn a worker thread")]
    Spawn(#[source] io::Error),
    /// A worker thread panicked during the run.
    #[error("a worker thread panicked")]
    WorkerPanicked,
}

/// A mutable view over interleaved 8-bit pixel samples.
///
/// Each pixel has either 3 (RGB) or 4 (RGBA) channels.
/// The fourth channel is never read nor written by this crate.
/// A [`PixelBuffer`] always holds at least one pixel.
///
/// # Examples
/// ```
/// # use palettize::{ConfigError, PixelBuffer};
/// # fn main() -> Result<(), ConfigError> {
/// let mut samples = vec![255u8, 0, 0, 0, 255, 0];
/// let pixels = PixelBuffer::rgb(&mut samples)?;
/// assert_eq!(pixels.num_pixels(), 2);
///
/// let mut empty = Vec::<u8>::new();
/// assert_eq!(PixelBuffer::rgb(&mut empty), Err(ConfigError::EmptyImage));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, PartialEq, Eq)]
pub struct PixelBuffer<'a> {
    samples: &'a mut [u8],
    channels: usize,
}

impl<'a> PixelBuffer<'a> {
    /// Creates a new [`PixelBuffer`] with the given number of channels per pixel.
    ///
    /// # Errors
    /// Returns an error if `channels` is not 3 or 4, if `samples` is empty,
    /// or if the length of `samples` is not a multiple of `channels`.
    pub fn new(samples: &'a mut [u8], channels: usize) -> Result<Self, ConfigError> {
        if !(3..=4).contains(&channels) {
            Err(ConfigError::UnsupportedChannels(channels))
        } else if samples.is_empty() {
            Err(ConfigError::EmptyImage)
        } else if samples.len() % channels != 0 {
            Err(ConfigError::TruncatedPixel { len: samples.len(), channels })
        } else {
            Ok(Self { samples, channels })
        }
    }

    /// Creates a new [`PixelBuffer`] over RGB samples.
    ///
    /// # Errors
    /// See [`PixelBuffer::new`].
    pub fn rgb(samples: &'a mut [u8]) -> Result<Self, ConfigError> {
        Self::new(samples, 3)
    }

    /// Creates a new [`PixelBuffer`] over RGBA samples.
    ///
    /// # Errors
    /// See [`PixelBuffer::new`].
    pub fn rgba(samples: &'a mut [u8]) -> Result<Self, ConfigError> {
        Self::new(samples, 4)
    }

    /// Returns the number of pixels in the buffer (always at least 1).
    #[must_use]
    pub fn num_pixels(&self) -> usize {
        self.samples.len() / self.channels
    }

    /// Returns the number of channels per pixel.
    #[must_use]
    pub const fn channels(&self) -> usize {
        self.channels
    }

    /// Returns the raw interleaved samples.
    #[must_use]
    pub fn samples(&self) -> &[u8] {
        &*self.samples
    }

    pub(crate) fn samples_mut(&mut self) -> &mut [u8] {
        &mut *self.samples
    }

    pub(crate) fn pixels(&self) -> ChunksExact<'_, u8> {
        self.samples.chunks_exact(self.channels)
    }

    /// The RGB channels of each pixel.
    pub(crate) fn colors(&self) -> impl Iterator<Item = [u8; 3]> + '_ {
        self.pixels().map(|pixel| [pixel[0], pixel[1], pixel[2]])
    }
}

#[cfg(feature = "image")]
impl<'a> TryFrom<&'a mut RgbImage> for PixelBuffer<'a> {
    type Error = ConfigError;

    fn try_from(image: &'a mut RgbImage) -> Result<Self, Self::Error> {
        Self::rgb(image)
    }
}

#[cfg(feature = "image")]
impl<'a> TryFrom<&'a mut RgbaImage> for PixelBuffer<'a> {
    type Error = ConfigError;

    fn try_from(image: &'a mut RgbaImage) -> Result<Self, Self::Error> {
        Self::rgba(image)
    }
}
