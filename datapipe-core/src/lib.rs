//! Lazy, composable data-pipeline engine for tensor-shaped data
//!
//! A pipeline is an immutable description of transformations over dense or
//! sparse tensors (slicing, repetition, batching, caching, flat-mapping)
//! that compiles into a pull-based iterator. Nothing executes at
//! construction time; an external consumer drives the iterator by calling
//! `next` until exhaustion, or stops pulling on infinite pipelines.

#![warn(missing_docs)]

pub mod dataset;
pub mod element;
pub mod error;
pub mod iterator;
pub mod tensor;

// Re-export key types for convenience
pub use dataset::{get_single_element, Dataset};
pub use element::Element;
pub use error::{Error, Result};
pub use iterator::{DatasetIterator, ElementIter};
pub use tensor::{SparseTensor, Tensor, TensorType};
