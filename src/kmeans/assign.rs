//! Nearest-centroid search used by the assignment phase.

use std::{
    ops::Range,
    sync::atomic::{AtomicU32, Ordering},
};

#[inline]
pub(crate) fn squared_euclidean_distance(a: [f32; 3], b: [f32; 3]) -> f32 {
    let mut dist = 0.0;
    for c in 0..3 {
        let diff = a[c] - b[c];
        dist += diff * diff;
    }
    dist
}

/// Returns the index of the centroid closest to `color`.
///
/// Ties go to the lowest index. `centroids` must not be empty.
#[inline]
pub(crate) fn nearest_centroid(centroids: &[[f32; 3]], color: [f32; 3]) -> u32 {
    let mut min_index = 0;
    let mut min_distance = f32::INFINITY;
    for (i, &centroid) in centroids.iter().enumerate() {
        let distance = squared_euclidean_distance(centroid, color);
        if distance < min_distance {
            min_distance = distance;
            min_index = i;
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    {
        min_index as u32
    }
}

/// Assigns each pixel in `range` to its nearest centroid.
///
/// `samples` are the interleaved samples of the whole image and `assignment` has one entry per pixel.
/// Only the entries inside `range` are written.
pub(crate) fn assign_range(
    samples: &[u8],
    channels: usize,
    range: Range<usize>,
    centroids: &[[f32; 3]],
    assignment: &[AtomicU32],
) {
    let pixels = samples[(range.start * channels)..(range.end * channels)].chunks_exact(channels);
    for (pixel, slot) in pixels.zip(&assignment[range]) {
        let color = [pixel[0], pixel[1], pixel[2]].map(f32::from);
        slot.store(nearest_centroid(centroids, color), Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::*;

    fn to_colors(samples: &[u8]) -> Vec<[f32; 3]> {
        samples
            .chunks_exact(3)
            .map(|c| [c[0], c[1], c[2]].map(f32::from))
            .collect()
    }

    #[test]
    fn nearest_matches_brute_force() {
        let centroids = to_colors(&test_samples(13, 3, 1));
        let colors = to_colors(&test_samples(500, 3, 2));

        for color in colors {
            let actual = nearest_centroid(&centroids, color) as usize;
            let best = centroids
                .iter()
                .map(|&c| squared_euclidean_distance(c, color))
                .fold(f32::INFINITY, f32::min);

            #[allow(clippy::float_cmp)]
            {
                assert_eq!(squared_euclidean_distance(centroids[actual], color), best);
            }
            for centroid in &centroids[..actual] {
                assert!(squared_euclidean_distance(*centroid, color) > best);
            }
        }
    }

    #[test]
    fn ties_go_to_lowest_index() {
        let centroids = [[10.0, 10.0, 10.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0]];
        assert_eq!(nearest_centroid(&centroids, [1.0, 1.0, 1.0]), 1);

        let centroids = [[0.0, 0.0, 0.0], [2.0, 2.0, 2.0]];
        assert_eq!(nearest_centroid(&centroids, [1.0, 1.0, 1.0]), 0);
    }

    #[test]
    fn assign_range_writes_only_its_range() {
        let samples = black_and_white();
        let centroids = [[0.0, 0.0, 0.0], [255.0, 255.0, 255.0]];
        let assignment = (0..4).map(|_| AtomicU32::new(7)).collect::<Vec<_>>();

        assign_range(&samples, 4, 1..3, &centroids, &assignment);

        let assignment = assignment.into_iter().map(AtomicU32::into_inner).collect::<Vec<_>>();
        assert_eq!(assignment, vec![7, 0, 1, 7]);
    }
}
