//! Immutable dataset descriptions
//!
//! A [`Dataset`] is a purely descriptive chain of transformation nodes over
//! a materialized tensor; nothing executes at construction time. Execution
//! begins when [`Dataset::iter`] compiles the chain into a pull iterator.

use std::sync::{Arc, Mutex};

use crate::element::Element;
use crate::error::{Error, Result};
use crate::iterator::{CacheState, DatasetIterator};
use crate::tensor::{SparseTensor, Tensor, TensorType};

/// Mapping applied by [`Dataset::flat_map`]: one element in, a fresh
/// sub-dataset description out
pub type FlatMapFn<T> = Arc<dyn Fn(Element<T>) -> Result<Dataset<T>> + Send + Sync>;

/// The closed set of transformation node kinds
///
/// New kinds are added by extending this variant; the iterator compiler in
/// [`Dataset::iter`] is the single dispatch point over it.
pub(crate) enum Node<T: TensorType> {
    /// Produces the materialized element exactly once
    Source(Element<T>),

    /// Splits each parent element along its leading dimension
    Slices { parent: Dataset<T> },

    /// Re-drives the parent `count` times, or endlessly when `count` is None
    Repeat {
        parent: Dataset<T>,
        count: Option<u64>,
    },

    /// Stacks `size` consecutive parent elements into one batched element
    Batch {
        parent: Dataset<T>,
        size: usize,
        drop_remainder: bool,
    },

    /// Materializes the parent's output on first pass and replays it after
    Cache {
        parent: Dataset<T>,
        store: Arc<Mutex<CacheState<T>>>,
    },

    /// Expands each parent element into a sub-dataset, drained in order
    FlatMap { parent: Dataset<T>, f: FlatMapFn<T> },
}

/// An immutable description of a chain of transformations over a data source
///
/// Cloning a `Dataset` is cheap and shares the underlying nodes; any number
/// of independent iterators can be created from one description. The one
/// nuance is [`Dataset::cache`]: its materialization store lives in the
/// description node, so every iterator created from the same cached
/// description shares a single store.
pub struct Dataset<T: TensorType> {
    pub(crate) node: Arc<Node<T>>,
}

impl<T: TensorType> Dataset<T> {
    fn from_node(node: Node<T>) -> Self {
        Self {
            node: Arc::new(node),
        }
    }

    /// Create a dataset producing the given dense tensor as its one element
    pub fn from_tensor(tensor: Tensor<T>) -> Self {
        Self::from_node(Node::Source(Element::Dense(tensor)))
    }

    /// Create a dataset producing the given sparse tensor as its one element
    pub fn from_sparse(sparse: SparseTensor<T>) -> Self {
        Self::from_node(Node::Source(Element::Sparse(sparse)))
    }

    /// Create a dataset producing the given element exactly once
    pub fn from_element(element: Element<T>) -> Self {
        Self::from_node(Node::Source(element))
    }

    /// Create a dataset of the leading-dimension slices of a dense tensor
    pub fn from_tensor_slices(tensor: Tensor<T>) -> Self {
        Self::from_tensor(tensor).slices()
    }

    /// Create a dataset of the leading-dimension slices of a sparse tensor
    pub fn from_sparse_slices(sparse: SparseTensor<T>) -> Self {
        Self::from_sparse(sparse).slices()
    }

    /// Split every element of this dataset along its leading dimension
    ///
    /// An element of shape `[N, d1, ...]` expands to `N` elements of shape
    /// `[d1, ...]`, in index order. Rank-0 elements fail with a shape error
    /// when the iterator reaches them.
    #[must_use]
    pub fn slices(&self) -> Self {
        Self::from_node(Node::Slices {
            parent: self.clone(),
        })
    }

    /// Concatenate `count` passes over this dataset
    ///
    /// `count = 0` yields no elements.
    #[must_use]
    pub fn repeat(&self, count: u64) -> Self {
        Self::from_node(Node::Repeat {
            parent: self.clone(),
            count: Some(count),
        })
    }

    /// Re-drive this dataset endlessly; the consumer must stop pulling
    #[must_use]
    pub fn repeat_forever(&self) -> Self {
        Self::from_node(Node::Repeat {
            parent: self.clone(),
            count: None,
        })
    }

    /// Stack consecutive elements into batches of `size`, emitting a final
    /// partial batch if the element count is not a multiple of `size`
    pub fn batch(&self, size: usize) -> Result<Self> {
        self.batch_with_options(size, false)
    }

    /// Stack consecutive elements into batches of `size`
    ///
    /// With `drop_remainder` set, a final undersized batch is discarded
    /// instead of emitted.
    pub fn batch_with_options(&self, size: usize, drop_remainder: bool) -> Result<Self> {
        if size == 0 {
            return Err(Error::invalid_argument("batch size must be at least 1"));
        }
        Ok(Self::from_node(Node::Batch {
            parent: self.clone(),
            size,
            drop_remainder,
        }))
    }

    /// Materialize this dataset's output in memory on first pass
    ///
    /// The store belongs to the returned description: every iterator created
    /// from it (including re-drives by an enclosing `repeat`) shares one
    /// store, so the parent is evaluated exactly once per element across the
    /// description's lifetime. An abandoned first pass leaves a partial
    /// store; the next pass resumes pulling the parent at the abandonment
    /// point.
    #[must_use]
    pub fn cache(&self) -> Self {
        Self::from_node(Node::Cache {
            parent: self.clone(),
            store: Arc::new(Mutex::new(CacheState::new())),
        })
    }

    /// Expand every element into a sub-dataset and concatenate the outputs
    ///
    /// Each sub-dataset is drained fully before the next parent element is
    /// pulled. `f` must be deterministic; if it fails for some element the
    /// iterator fails at that point.
    #[must_use]
    pub fn flat_map<F>(&self, f: F) -> Self
    where
        F: Fn(Element<T>) -> Result<Dataset<T>> + Send + Sync + 'static,
    {
        Self::from_node(Node::FlatMap {
            parent: self.clone(),
            f: Arc::new(f),
        })
    }

    /// Compile this description into a fresh pull iterator
    #[must_use]
    pub fn iter(&self) -> DatasetIterator<T> {
        DatasetIterator::new(self)
    }
}

impl<T: TensorType> Clone for Dataset<T> {
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
        }
    }
}

/// Drain a dataset expected to yield exactly one element and return it
///
/// Fails with an invalid-argument error if the dataset yields zero elements
/// or would yield a second one.
pub fn get_single_element<T: TensorType>(dataset: &Dataset<T>) -> Result<Element<T>> {
    let mut iter = dataset.iter();
    let element = iter.next()?.ok_or_else(|| {
        Error::invalid_argument("expected a single element, dataset was empty")
    })?;
    if iter.next()?.is_some() {
        return Err(Error::invalid_argument(
            "expected a single element, dataset produced more than one",
        ));
    }
    Ok(element)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::{SparseTensor, Tensor};

    fn range_tensor(n: usize) -> Tensor<i64> {
        Tensor::from_vec((0..n as i64).collect(), vec![n]).unwrap()
    }

    #[test]
    fn test_get_single_element_ok() {
        let dataset = Dataset::from_tensor(range_tensor(3));
        let element = get_single_element(&dataset).unwrap();
        assert_eq!(element.dense().unwrap().data(), &[0, 1, 2]);
    }

    #[test]
    fn test_get_single_element_empty() {
        let dataset = Dataset::from_tensor_slices(range_tensor(0));
        assert!(matches!(
            get_single_element(&dataset),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_get_single_element_too_many() {
        let dataset = Dataset::from_tensor_slices(range_tensor(2));
        assert!(matches!(
            get_single_element(&dataset),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_descriptions_are_reusable() {
        let dataset = Dataset::from_tensor_slices(range_tensor(4));
        let mut a = dataset.iter();
        let mut b = dataset.iter();
        // Independent iterators over one description do not share state.
        a.next().unwrap();
        a.next().unwrap();
        let first_of_b = b.next().unwrap().unwrap();
        assert_eq!(first_of_b.dense().unwrap().data(), &[0]);
    }

    // Slicing a rank-1 sparse tensor produces rank-0 elements; batching
    // them back together must reproduce the original coordinates and
    // values rather than dropping them.
    #[test]
    fn test_batching_scalar_sparse_slices_keeps_coordinates() {
        let sparse = SparseTensor::new(vec![0, 1], vec![10_i64, 20], vec![2]).unwrap();

        let batched = Dataset::from_sparse_slices(sparse.clone()).batch(2).unwrap();
        let element = get_single_element(&batched).unwrap();
        assert_eq!(element.sparse().unwrap(), &sparse);
    }

    // Mirrors the sparse repeat/batch/flat_map pipeline of the original
    // throughput scenario: batching R copies of one sparse row, extracting
    // the batched tensor, then slicing it back apart must reproduce the
    // per-row tensors exactly.
    #[test]
    fn test_sparse_batch_round_trip() {
        let rows = 4;
        let sparse = SparseTensor::new(
            vec![0, 2, 7],
            vec![10_i64, 20, 30],
            vec![1000],
        )
        .unwrap();

        let batched = Dataset::from_sparse(sparse.clone())
            .repeat(rows as u64)
            .batch(rows)
            .unwrap();
        let element = get_single_element(&batched).unwrap();
        assert_eq!(element.sparse().unwrap().dense_shape(), &[rows, 1000]);

        let sliced = Dataset::from_element(element)
            .flat_map(|batch| Ok(Dataset::from_element(batch).slices()));
        let mut iter = sliced.iter();
        for _ in 0..rows {
            let row = iter.next().unwrap().unwrap();
            assert_eq!(row.sparse().unwrap(), &sparse);
        }
        assert!(iter.next().unwrap().is_none());
    }
}
