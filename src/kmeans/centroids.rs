//! The centroid set and the update/convergence step run by the orchestrating thread.

use crate::PixelBuffer;
use log::trace;
use rand::{prelude::Distribution, Rng};
use rand_distr::Uniform;

/// A single cluster prototype.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Centroid {
    /// The number of pixels assigned during the last update.
    pub(crate) count: u32,
    /// The current color.
    pub(crate) color: [f32; 3],
    /// The color before the last update.
    pub(crate) previous: [f32; 3],
}

impl Centroid {
    fn new(color: [f32; 3]) -> Self {
        Self { count: 0, color, previous: color }
    }
}

/// The `K` centroids of a run.
#[derive(Debug, Clone)]
pub(crate) struct CentroidSet {
    centroids: Vec<Centroid>,
    sums: Vec<[u64; 3]>,
}

impl CentroidSet {
    pub(crate) fn from_colors(colors: impl IntoIterator<Item = [u8; 3]>) -> Self {
        let centroids = colors
            .into_iter()
            .map(|color| Centroid::new(color.map(f32::from)))
            .collect::<Vec<_>>();

        Self { sums: vec![[0; 3]; centroids.len()], centroids }
    }

    /// Picks the color of a uniformly random pixel for each of the `k` centroids.
    ///
    /// The same pixel may be picked more than once, so centroids can start out identical.
    pub(crate) fn random(pixels: &PixelBuffer, k: usize, rng: &mut impl Rng) -> Self {
        let distribution = Uniform::new(0, pixels.num_pixels());
        let channels = pixels.channels();
        let samples = pixels.samples();
        Self::from_colors((0..k).map(|_| {
            let i = distribution.sample(&mut *rng) * channels;
            [samples[i], samples[i + 1], samples[i + 2]]
        }))
    }

    pub(crate) fn len(&self) -> usize {
        self.centroids.len()
    }

    pub(crate) fn as_slice(&self) -> &[Centroid] {
        &self.centroids
    }

    pub(crate) fn colors(&self) -> impl Iterator<Item = [f32; 3]> + '_ {
        self.centroids.iter().map(|centroid| centroid.color)
    }

    pub(crate) fn counts(&self) -> impl Iterator<Item = u32> + '_ {
        self.centroids.iter().map(|centroid| centroid.count)
    }

    /// Moves each centroid to the mean of the colors assigned to it.
    ///
    /// `assigned` yields each pixel's color alongside the index of its centroid.
    /// Centroids with no assigned pixels keep their color.
    pub(crate) fn update(&mut self, assigned: impl IntoIterator<Item = ([u8; 3], u32)>) {
        let Self { centroids, sums } = self;

        sums.fill([0; 3]);
        for centroid in centroids.iter_mut() {
            centroid.previous = centroid.color;
            centroid.count = 0;
        }

        for (color, i) in assigned {
            let i = i as usize;
            let sum = &mut sums[i];
            for c in 0..3 {
                sum[c] += u64::from(color[c]);
            }
            centroids[i].count += 1;
        }

        for (i, (centroid, sum)) in centroids.iter_mut().zip(&*sums).enumerate() {
            if centroid.count == 0 {
                trace!("centroid {i} has no pixels, keeping its color");
                continue;
            }

            #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
            {
                let n = f64::from(centroid.count);
                centroid.color = sum.map(|s| (s as f64 / n) as f32);
            }
        }
    }
}

/// Decides whether the last update moved any centroid by more than the threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ConvergenceChecker {
    threshold: f32,
}

impl ConvergenceChecker {
    pub(crate) const fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    /// The change of a single channel relative to its previous value.
    ///
    /// A previous value of exactly `0` has no relative change,
    /// so the absolute change is used instead.
    #[allow(clippy::float_cmp)]
    pub(crate) fn change(previous: f32, current: f32) -> f32 {
        let diff = (current - previous).abs();
        if previous == 0.0 {
            diff
        } else {
            diff / previous.abs()
        }
    }

    pub(crate) fn centroid_changed(&self, centroid: &Centroid) -> bool {
        centroid
            .previous
            .iter()
            .zip(centroid.color)
            .any(|(&previous, current)| Self::change(previous, current) > self.threshold)
    }

    pub(crate) fn any_changed(&self, centroids: &CentroidSet) -> bool {
        centroids.as_slice().iter().any(|centroid| self.centroid_changed(centroid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{tests::*, DEFAULT_THRESHOLD};
    use rand::SeedableRng;
    use rand_xoshiro::Xoroshiro128PlusPlus;

    #[test]
    fn update_computes_means() {
        let mut set = CentroidSet::from_colors([[0, 0, 0], [200, 200, 200]]);
        set.update([
            ([10, 20, 30], 0),
            ([20, 40, 60], 0),
            ([250, 250, 250], 1),
            ([255, 240, 0], 0),
        ]);

        let centroids = set.as_slice();
        assert_eq!(centroids[0].count, 3);
        assert_eq!(centroids[0].color, [95.0, 100.0, 30.0]);
        assert_eq!(centroids[0].previous, [0.0; 3]);
        assert_eq!(centroids[1].count, 1);
        assert_eq!(centroids[1].color, [250.0; 3]);
        assert_eq!(centroids[1].previous, [200.0; 3]);
    }

    #[test]
    fn empty_centroid_keeps_color() {
        let mut set = CentroidSet::from_colors([[1, 2, 3], [40, 50, 60], [7, 8, 9]]);
        set.update([([10, 10, 10], 0), ([30, 30, 30], 2)]);

        let centroids = set.as_slice();
        assert_eq!(centroids[1].count, 0);
        assert_eq!(centroids[1].color, [40.0, 50.0, 60.0]);
        assert_eq!(centroids[0].color, [10.0; 3]);
        assert_eq!(centroids[2].color, [30.0; 3]);

        let checker = ConvergenceChecker::new(DEFAULT_THRESHOLD);
        assert!(!checker.centroid_changed(&centroids[1]));
    }

    #[test]
    fn counts_sum_to_pixel_count() {
        let samples = test_samples(1000, 3, 3);
        let assigned = samples
            .chunks_exact(3)
            .enumerate()
            .map(|(i, c)| ([c[0], c[1], c[2]], (i % 5) as u32));

        let mut set = CentroidSet::from_colors([[0; 3]; 5]);
        set.update(assigned);
        assert_eq!(set.counts().sum::<u32>(), 1000);
    }

    #[test]
    fn random_picks_pixel_colors() {
        let mut samples = test_samples(64, 4, 4);
        let pixels = PixelBuffer::rgba(&mut samples).unwrap();
        let colors = pixels.colors().map(|c| c.map(f32::from)).collect::<Vec<_>>();

        let mut rng = Xoroshiro128PlusPlus::seed_from_u64(0);
        let set = CentroidSet::random(&pixels, 32, &mut rng);
        assert_eq!(set.len(), 32);
        for color in set.colors() {
            assert!(colors.contains(&color));
        }
    }

    #[test]
    fn random_allows_duplicates() {
        let mut samples = vec![9u8, 9, 9];
        let pixels = PixelBuffer::rgb(&mut samples).unwrap();
        let mut rng = Xoroshiro128PlusPlus::seed_from_u64(0);
        let set = CentroidSet::random(&pixels, 4, &mut rng);
        assert!(set.colors().all(|c| c == [9.0; 3]));
    }

    #[test]
    fn relative_change() {
        let checker = ConvergenceChecker::new(0.01);
        let centroid = |previous, color| Centroid { count: 1, color, previous };

        assert!(!checker.centroid_changed(&centroid([100.0; 3], [100.5, 99.5, 100.9])));
        assert!(checker.centroid_changed(&centroid([100.0; 3], [100.0, 100.0, 101.5])));
        assert!(checker.centroid_changed(&centroid([10.0; 3], [10.0, 9.8, 10.0])));
    }

    #[test]
    fn zero_previous_uses_absolute_change() {
        let checker = ConvergenceChecker::new(0.01);
        let centroid = |previous, color| Centroid { count: 1, color, previous };

        assert!((ConvergenceChecker::change(0.0, 5.0) - 5.0).abs() < f32::EPSILON);
        assert!(!ConvergenceChecker::change(0.0, 0.0).is_nan());

        assert!(checker.centroid_changed(&centroid([0.0, 50.0, 50.0], [5.0, 50.0, 50.0])));
        assert!(!checker.centroid_changed(&centroid([0.0, 50.0, 50.0], [0.0, 50.0, 50.0])));
        assert!(!checker.centroid_changed(&centroid([0.0; 3], [0.005, 0.0, 0.0])));
    }
}
