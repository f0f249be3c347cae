//! Memory layer: the associative prototype store and its search index.
//!
//! This module provides:
//!
//! - [`FlatIndex`] — an exact squared-Euclidean nearest-neighbor index over
//!   flat f32 vectors, rebuilt wholesale via snapshot-replace.
//!
//! - [`PrototypeMemory`] — an append-only store of flattened feature
//!   prototypes built during the unsupervised phase, with the inherited
//!   two-batch index window and first-batch retrieval policy (see the
//!   module docs in [`prototype`]).
//!
//! # Usage
//!
//! ```rust
//! use ndspc::memory::PrototypeMemory;
//! use ndspc::Tensor;
//!
//! let mut memory = PrototypeMemory::with_min_prototypes(4, 2);
//!
//! // Phase 1: populate
//! let batch = Tensor::from_data(vec![
//!     1.0, 0.0, 0.0, 0.0,
//!     0.0, 1.0, 0.0, 0.0,
//!     0.0, 0.0, 1.0, 0.0,
//! ], &[3, 4]);
//! memory.add_prototypes(batch).unwrap();
//!
//! // Phase 2 / inference: retrieve nearest stored prototype
//! let query = Tensor::from_data(vec![0.9, 0.1, 0.0, 0.0], &[1, 4]);
//! let prototype = memory.search(&query).unwrap();
//! assert_eq!(prototype.row(0), &[1.0, 0.0, 0.0, 0.0]);
//! ```

pub mod index;
pub mod prototype;

pub use index::FlatIndex;
pub use prototype::{PrototypeMemory, DEFAULT_MIN_PROTOTYPES};
