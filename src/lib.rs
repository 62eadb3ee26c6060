//! A library to reduce an image to a fixed number of colors using Lloyd's k-means in RGB space.
//!
//! The clustering work is split across a fixed pool of worker threads which compute
//! the nearest centroid for disjoint ranges of pixels, while the calling thread recomputes
//! the centroids and checks for convergence between passes.
//!
//! # Features
//! To reduce dependencies and compile times, `palettize` has several `cargo` features
//! that can be turned off or on:
//! - `threads`: exposes a parallel version of the final pixel write-back via [`rayon`].
//! - `image`: enables integration with the [`image`] crate.
//!
//! # Example
//! ```
//! # use palettize::{kmeans, KmeansOptions, PixelBuffer};
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut samples = vec![
//!     0u8, 0, 0, 255,
//!     10, 10, 10, 255,
//!     250, 250, 250, 128,
//!     240, 240, 240, 128,
//! ];
//! let mut pixels = PixelBuffer::rgba(&mut samples)?;
//!
//! let options = KmeansOptions::new()
//!     .cluster_count(2)
//!     .thread_count(2)
//!     .seed(7);
//!
//! let clustering = kmeans::quantize(&mut pixels, &options)?;
//! assert!(clustering.iterations <= 1000);
//! assert_eq!(clustering.counts.iter().sum::<u32>(), 4);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code, unsafe_op_in_unsafe_fn)]
#![warn(
    clippy::pedantic,
    clippy::cargo,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::todo,
    clippy::unimplemented,
    clippy::unwrap_used,
    clippy::unwrap_in_result,
    clippy::expect_used,
    clippy::unneeded_field_pattern,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::unnecessary_self_imports,
    clippy::str_to_string,
    clippy::string_to_string,
    clippy::string_slice,
    missing_docs,
    rustdoc::all,
    clippy::float_cmp_const,
    clippy::lossy_float_literal
)]
#![allow(
    clippy::doc_markdown,
    clippy::module_name_repetitions,
    clippy::many_single_char_names,
    clippy::missing_panics_doc,
    clippy::unreadable_literal
)]

mod options;
mod types;

pub mod kmeans;

pub use options::KmeansOptions;
pub use types::*;

/// The default relative change below which a centroid channel is considered settled (1%).
pub const DEFAULT_THRESHOLD: f32 = 0.01;

#[cfg(test)]
pub(crate) mod tests {
    use rand::{Rng, SeedableRng};
    use rand_xoshiro::Xoroshiro128PlusPlus;

    /// Interleaved samples for `len` random pixels.
    pub fn test_samples(len: usize, channels: usize, seed: u64) -> Vec<u8> {
        let mut rng = Xoroshiro128PlusPlus::seed_from_u64(seed);
        (0..len * channels).map(|_| rng.gen()).collect()
    }

    /// Two black and two white RGBA pixels.
    pub fn black_and_white() -> Vec<u8> {
        vec![
            0, 0, 0, 255, //
            0, 0, 0, 255, //
            255, 255, 255, 255, //
            255, 255, 255, 255,
        ]
    }
}
