//! `meshnn-core`: the concurrent, in-memory, multi-layer HNSW graph engine.
//!
//! This crate is the "hard part" of `meshnn` (the workspace's FFI surface,
//! `meshnn-ffi`, is a thin `extern "C"` shell over it): the node/edge arena,
//! the region-lock protocol that lets `add`/`remove`/`update`/`knn` proceed
//! concurrently without a global write lock, the layer-local greedy and
//! beam search, the neighbor-selection heuristic, and the removal/update
//! algorithms that repair or selectively rewire the graph around a changed
//! node.
//!
//! ```
//! use meshnn_core::{Index, IndexParams, DistanceMetric};
//!
//! let index: Index<Vec<f32>, f32> = Index::new(
//!     IndexParams::default(),
//!     |a: &Vec<f32>, b: &Vec<f32>| DistanceMetric::Cosine.distance(a, b),
//! );
//! let id = index.add(vec![1.0, 0.0, 0.0]).unwrap();
//! let results = index.knn(&vec![1.0, 0.0, 0.0], 1).unwrap();
//! assert_eq!(results[0].0, id);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod connector;
pub mod distance;
pub mod error;
pub mod heap;
pub mod index;
pub mod persistence;
pub mod sync;
pub mod visited;

// `arena`, `region_lock`, `navigator`, and `heuristic` hold the pieces a
// caller of the public façade never needs to name directly (a `NodeId` and
// a `Filter` are the only internals that leak into `Index`'s own API). The
// `internals` feature exposes them anyway, for benches and integration
// tests that want to exercise the arena or the region locker in isolation
// from the full façade.
#[cfg(any(test, feature = "internals"))]
pub mod arena;
#[cfg(not(any(test, feature = "internals")))]
mod arena;

#[cfg(any(test, feature = "internals"))]
pub mod heuristic;
#[cfg(not(any(test, feature = "internals")))]
mod heuristic;

#[cfg(any(test, feature = "internals"))]
pub mod navigator;
#[cfg(not(any(test, feature = "internals")))]
mod navigator;

#[cfg(any(test, feature = "internals"))]
pub mod region_lock;
#[cfg(not(any(test, feature = "internals")))]
mod region_lock;

pub use arena::NodeId;
pub use config::IndexParams;
pub use distance::{DistanceFn, DistanceMetric, Scalar};
pub use error::{Error, Result};
pub use heuristic::{Heuristic, NearestM, RelativeNeighborhood};
pub use index::{Index, IndexInfo, LayerStats};
pub use navigator::Filter;
