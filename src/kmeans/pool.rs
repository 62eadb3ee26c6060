//! The worker pool and the flag barrier that drives the parallel assignment phase.
//!
//! Each worker owns a contiguous range of pixels and a "pending work" flag.
//! The orchestrating thread publishes the centroid colors, raises every flag,
//! and then spins until all flags are lowered again.
//! A worker that sees its flag raised computes the assignment for its range and lowers the flag.
//!
//! Centroid colors and assignments are stored in atomics accessed with [`Ordering::Relaxed`].
//! Raising a flag is a release store paired with the worker's acquire load,
//! and lowering it is a release store paired with the orchestrator's acquire load,
//! so every access is ordered by the barrier.

use super::{assign::assign_range, centroids::CentroidSet};
use crate::KmeansError;
use log::trace;
use std::{
    hint,
    ops::Range,
    sync::atomic::{AtomicBool, AtomicU32, Ordering},
    thread,
};

/// Splits `0..len` into `parts` contiguous ranges of `len.div_ceil(parts)` items.
///
/// The last ranges may be shorter or empty.
pub(crate) fn partition(len: usize, parts: usize) -> impl Iterator<Item = Range<usize>> {
    let chunk = len.div_ceil(parts);
    (0..parts).map(move |i| {
        let start = (i * chunk).min(len);
        start..(start + chunk).min(len)
    })
}

const SPIN_LIMIT: u32 = 6;

/// Exponential spinning that falls back to yielding the thread.
struct Backoff {
    step: u32,
}

impl Backoff {
    const fn new() -> Self {
        Self { step: 0 }
    }

    fn reset(&mut self) {
        self.step = 0;
    }

    fn snooze(&mut self) {
        if self.step <= SPIN_LIMIT {
            for _ in 0..(1 << self.step) {
                hint::spin_loop();
            }
            self.step += 1;
        } else {
            thread::yield_now();
        }
    }
}

/// An `f32` color stored as bits.
struct AtomicColor([AtomicU32; 3]);

impl AtomicColor {
    fn new() -> Self {
        Self([0.0f32; 3].map(|c| AtomicU32::new(c.to_bits())))
    }

    fn load(&self) -> [f32; 3] {
        let [r, g, b] = &self.0;
        [r, g, b].map(|c| f32::from_bits(c.load(Ordering::Relaxed)))
    }

    fn store(&self, color: [f32; 3]) {
        for (c, value) in self.0.iter().zip(color) {
            c.store(value.to_bits(), Ordering::Relaxed);
        }
    }
}

/// The state shared between the orchestrator and the workers of one run.
pub(crate) struct Shared {
    centroids: Vec<AtomicColor>,
    assignment: Vec<AtomicU32>,
    pending: Vec<AtomicBool>,
    finished: AtomicBool,
    poisoned: AtomicBool,
}

impl Shared {
    pub(crate) fn new(k: usize, pixels: usize, threads: usize) -> Self {
        Self {
            centroids: (0..k).map(|_| AtomicColor::new()).collect(),
            assignment: (0..pixels).map(|_| AtomicU32::new(0)).collect(),
            pending: (0..threads).map(|_| AtomicBool::new(false)).collect(),
            finished: AtomicBool::new(false),
            poisoned: AtomicBool::new(false),
        }
    }

    /// Copies the current centroid colors for the next assignment phase.
    ///
    /// Must only be called while no assignment phase is running.
    pub(crate) fn publish(&self, centroids: &CentroidSet) {
        for (shared, color) in self.centroids.iter().zip(centroids.colors()) {
            shared.store(color);
        }
    }

    /// Runs one assignment phase on all workers and waits for it to complete.
    pub(crate) fn dispatch(&self) -> Result<(), KmeansError> {
        for flag in &self.pending {
            flag.store(true, Ordering::Release);
        }

        let mut backoff = Backoff::new();
        for flag in &self.pending {
            while flag.load(Ordering::Acquire) {
                if self.poisoned.load(Ordering::Acquire) {
                    return Err(KmeansError::WorkerPanicked);
                }
                backoff.snooze();
            }
        }

        Ok(())
    }

    /// The centroid index of each pixel from the last completed assignment phase.
    pub(crate) fn assignment(&self) -> impl Iterator<Item = u32> + '_ {
        self.assignment.iter().map(|i| i.load(Ordering::Relaxed))
    }

    pub(crate) fn into_assignment(self) -> Vec<u32> {
        self.assignment.into_iter().map(AtomicU32::into_inner).collect()
    }

    fn finish(&self) {
        self.finished.store(true, Ordering::Release);
    }
}

/// Sets the finished flag when dropped, including on unwind.
struct FinishOnDrop<'a>(&'a Shared);

impl Drop for FinishOnDrop<'_> {
    fn drop(&mut self) {
        self.0.finish();
    }
}

/// Marks the run as poisoned if the worker holding it unwinds.
struct PoisonOnPanic<'a>(&'a Shared);

impl Drop for PoisonOnPanic<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.poisoned.store(true, Ordering::Release);
        }
    }
}

struct Worker<'a> {
    id: usize,
    range: Range<usize>,
    samples: &'a [u8],
    channels: usize,
    shared: &'a Shared,
}

impl Worker<'_> {
    fn run(self) {
        let Self { id, range, samples, channels, shared } = self;
        let _poison = PoisonOnPanic(shared);
        let flag = &shared.pending[id];
        let mut centroids = Vec::with_capacity(shared.centroids.len());
        let mut backoff = Backoff::new();

        loop {
            if flag.load(Ordering::Acquire) {
                centroids.clear();
                centroids.extend(shared.centroids.iter().map(AtomicColor::load));
                assign_range(samples, channels, range.clone(), &centroids, &shared.assignment);
                flag.store(false, Ordering::Release);
                backoff.reset();
            } else if shared.finished.load(Ordering::Acquire) {
                trace!("worker {id} exiting");
                return;
            } else {
                backoff.snooze();
            }
        }
    }
}

/// Starts one worker per range of pixels, runs `orchestrate` on the calling thread,
/// then stops and joins all workers.
///
/// `samples` must hold `shared`'s pixel count times `channels` samples.
pub(crate) fn run<R>(
    shared: &Shared,
    samples: &[u8],
    channels: usize,
    orchestrate: impl FnOnce(&Shared) -> Result<R, KmeansError>,
) -> Result<R, KmeansError> {
    thread::scope(|scope| {
        let finish = FinishOnDrop(shared);

        let mut handles = Vec::with_capacity(shared.pending.len());
        let ranges = partition(shared.assignment.len(), shared.pending.len());
        for (id, range) in ranges.enumerate() {
            let worker = Worker { id, range, samples, channels, shared };
            let handle = thread::Builder::new()
                .name(format!("kmeans-worker-{id}"))
                .spawn_scoped(scope, move || worker.run())
                .map_err(KmeansError::Spawn)?;

            handles.push(handle);
        }

        let result = orchestrate(shared);

        drop(finish);
        let mut panicked = false;
        for handle in handles {
            panicked |= handle.join().is_err();
        }

        if panicked {
            Err(KmeansError::WorkerPanicked)
        } else {
            result
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{kmeans::assign::nearest_centroid, tests::*};

    #[test]
    fn partition_covers_range() {
        for (len, parts) in [(10, 3), (4, 4), (4, 3), (3, 8), (1, 1), (1000, 7)] {
            let ranges = partition(len, parts).collect::<Vec<_>>();
            assert_eq!(ranges.len(), parts);
            assert_eq!(ranges[0].start, 0);
            assert_eq!(ranges[parts - 1].end, len);
            for pair in ranges.windows(2) {
                assert_eq!(pair[0].end, pair[1].start);
            }

            let chunk = len.div_ceil(parts);
            assert!(ranges.iter().all(|r| r.len() <= chunk));
        }
    }

    #[test]
    fn partition_sizes() {
        let ranges = partition(10, 3).collect::<Vec<_>>();
        assert_eq!(ranges, vec![0..4, 4..8, 8..10]);

        let ranges = partition(4, 3).collect::<Vec<_>>();
        assert_eq!(ranges, vec![0..2, 2..4, 4..4]);
    }

    #[test]
    fn atomic_color_round_trips_bits() {
        let color = AtomicColor::new();
        assert_eq!(color.load(), [0.0; 3]);
        color.store([1.5, -0.0, 255.0]);
        assert_eq!(color.load().map(f32::to_bits), [1.5f32, -0.0, 255.0].map(f32::to_bits));
    }

    #[test]
    fn dispatch_assigns_every_pixel() {
        let samples = test_samples(997, 4, 5);
        let centroids = CentroidSet::from_colors(
            test_samples(9, 3, 6)
                .chunks_exact(3)
                .map(|c| [c[0], c[1], c[2]]),
        );
        let colors = centroids.colors().collect::<Vec<_>>();

        for threads in [1, 2, 5, 16] {
            let shared = Shared::new(centroids.len(), 997, threads);
            run(&shared, &samples, 4, |shared| {
                shared.publish(&centroids);
                shared.dispatch()?;
                shared.dispatch()
            })
            .unwrap();

            let expected = samples
                .chunks_exact(4)
                .map(|c| nearest_centroid(&colors, [c[0], c[1], c[2]].map(f32::from)))
                .collect::<Vec<_>>();

            assert_eq!(shared.into_assignment(), expected);
        }
    }

    #[test]
    fn workers_stop_without_work() {
        let samples = black_and_white();
        let shared = Shared::new(1, 4, 3);
        let result = run(&shared, &samples, 4, |_| Ok(42));
        assert_eq!(result.unwrap(), 42);
    }

    #[test]
    fn orchestrator_error_stops_workers() {
        let samples = black_and_white();
        let shared = Shared::new(1, 4, 2);
        let result = run(&shared, &samples, 4, |_| -> Result<(), _> {
            Err(KmeansError::WorkerPanicked)
        });
        assert!(matches!(result, Err(KmeansError::WorkerPanicked)));
    }
}
