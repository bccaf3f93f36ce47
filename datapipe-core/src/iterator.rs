//! The pull-based iterator engine
//!
//! [`Dataset::iter`] compiles a description into a stateful iterator; each
//! node kind has a corresponding iterator struct here, composing by
//! delegating to its parent's iterator. Execution is single-threaded and
//! synchronous: every element is produced by a `next` call from the single
//! downstream consumer, and an abandoned iterator is simply dropped.

use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::dataset::{Dataset, FlatMapFn, Node};
use crate::element::Element;
use crate::error::{Error, Result};
use crate::tensor::TensorType;

/// A stateful producer of pipeline elements
///
/// `Ok(None)` signals end of sequence; errors are surfaced at the `next`
/// call where the violation first becomes detectable.
pub trait ElementIter<T: TensorType>: Send {
    /// Produce the next element, or `None` on exhaustion
    fn next(&mut self) -> Result<Option<Element<T>>>;
}

/// The iterator handle returned by [`Dataset::iter`]
pub struct DatasetIterator<T: TensorType> {
    inner: Box<dyn ElementIter<T>>,
}

impl<T: TensorType> DatasetIterator<T> {
    pub(crate) fn new(dataset: &Dataset<T>) -> Self {
        debug!("compiling dataset description into an iterator");
        Self {
            inner: compile(dataset),
        }
    }

    /// Produce the next element, or `None` on exhaustion
    pub fn next(&mut self) -> Result<Option<Element<T>>> {
        self.inner.next()
    }
}

impl<T: TensorType> ElementIter<T> for DatasetIterator<T> {
    fn next(&mut self) -> Result<Option<Element<T>>> {
        self.inner.next()
    }
}

/// Single dispatch point mapping each node kind to its iterator
pub(crate) fn compile<T: TensorType>(dataset: &Dataset<T>) -> Box<dyn ElementIter<T>> {
    match &*dataset.node {
        Node::Source(element) => Box::new(SourceIter {
            element: Some(element.clone()),
        }),
        Node::Slices { parent } => Box::new(SlicesIter {
            parent: compile(parent),
            current: None,
        }),
        Node::Repeat { parent, count } => Box::new(RepeatIter {
            parent: parent.clone(),
            remaining: *count,
            inner: None,
            produced_any: false,
        }),
        Node::Batch {
            parent,
            size,
            drop_remainder,
        } => Box::new(BatchIter {
            parent: compile(parent),
            size: *size,
            drop_remainder: *drop_remainder,
        }),
        Node::Cache { parent, store } => Box::new(CacheIter {
            parent: parent.clone(),
            store: Arc::clone(store),
            position: 0,
        }),
        Node::FlatMap { parent, f } => Box::new(FlatMapIter {
            parent: compile(parent),
            f: Arc::clone(f),
            current: None,
        }),
    }
}

/// Yields the materialized source element once, then terminates
struct SourceIter<T: TensorType> {
    element: Option<Element<T>>,
}

impl<T: TensorType> ElementIter<T> for SourceIter<T> {
    fn next(&mut self) -> Result<Option<Element<T>>> {
        Ok(self.element.take())
    }
}

/// In-progress expansion of one parent element into its slices
struct SliceCursor<T: TensorType> {
    element: Element<T>,
    next_index: usize,
    leading: usize,
}

/// Splits each parent element along its leading dimension
struct SlicesIter<T: TensorType> {
    parent: Box<dyn ElementIter<T>>,
    current: Option<SliceCursor<T>>,
}

impl<T: TensorType> ElementIter<T> for SlicesIter<T> {
    fn next(&mut self) -> Result<Option<Element<T>>> {
        loop {
            if let Some(cursor) = &mut self.current {
                if cursor.next_index < cursor.leading {
                    let slice = cursor.element.slice_leading(cursor.next_index)?;
                    cursor.next_index += 1;
                    return Ok(Some(slice));
                }
                self.current = None;
            }

            match self.parent.next()? {
                Some(element) => {
                    let leading = element.leading_dim()?;
                    self.current = Some(SliceCursor {
                        element,
                        next_index: 0,
                        leading,
                    });
                }
                None => return Ok(None),
            }
        }
    }
}

/// Concatenates repeated passes over the parent description
///
/// Each pass compiles a fresh parent iterator; a cached parent replays its
/// store instead of recomputing because the store lives in the description.
struct RepeatIter<T: TensorType> {
    parent: Dataset<T>,
    remaining: Option<u64>,
    inner: Option<Box<dyn ElementIter<T>>>,
    produced_any: bool,
}

impl<T: TensorType> ElementIter<T> for RepeatIter<T> {
    fn next(&mut self) -> Result<Option<Element<T>>> {
        loop {
            if let Some(inner) = &mut self.inner {
                if let Some(element) = inner.next()? {
                    self.produced_any = true;
                    return Ok(Some(element));
                }
                self.inner = None;
                // One real pass is enough to discover emptiness; spinning
                // through further passes would never terminate for the
                // infinite case.
                if !self.produced_any {
                    return Err(Error::EmptySource(
                        "repeat requested over a dataset that produced no elements".into(),
                    ));
                }
            }

            match &mut self.remaining {
                Some(0) => return Ok(None),
                Some(passes) => {
                    *passes -= 1;
                    self.inner = Some(compile(&self.parent));
                }
                None => self.inner = Some(compile(&self.parent)),
            }
        }
    }
}

/// Stacks consecutive parent elements into batched elements
struct BatchIter<T: TensorType> {
    parent: Box<dyn ElementIter<T>>,
    size: usize,
    drop_remainder: bool,
}

impl<T: TensorType> ElementIter<T> for BatchIter<T> {
    fn next(&mut self) -> Result<Option<Element<T>>> {
        let mut buffered = Vec::with_capacity(self.size);
        while buffered.len() < self.size {
            match self.parent.next()? {
                Some(element) => buffered.push(element),
                None => break,
            }
        }

        if buffered.is_empty() || (buffered.len() < self.size && self.drop_remainder) {
            return Ok(None);
        }
        Element::stack(&buffered).map(Some)
    }
}

/// Materialization store shared by every iterator over one cache node
///
/// The producer iterator over the parent persists here across passes until
/// the sequence completes, so the parent is evaluated exactly once per
/// element over the store's lifetime even when a pass is abandoned midway.
/// A failing parent leaves the store incomplete but valid; the producer is
/// discarded, and the next pull rebuilds one and fast-forwards it past the
/// cached prefix so the failed element itself is retried.
pub(crate) struct CacheState<T: TensorType> {
    elements: Vec<Element<T>>,
    complete: bool,
    producer: Option<Producer<T>>,
}

impl<T: TensorType> CacheState<T> {
    pub(crate) fn new() -> Self {
        Self {
            elements: Vec::new(),
            complete: false,
            producer: None,
        }
    }
}

/// The parent iterator feeding a cache store, with the count of elements it
/// has delivered so far
struct Producer<T: TensorType> {
    iter: Box<dyn ElementIter<T>>,
    position: usize,
}

impl<T: TensorType> Producer<T> {
    /// Pull the next uncached element, discarding any already-cached prefix
    /// a rebuilt producer still has to re-deliver
    fn pull(&mut self, cached: usize) -> Result<Option<Element<T>>> {
        while self.position < cached {
            match self.iter.next()? {
                Some(_) => self.position += 1,
                None => return Ok(None),
            }
        }
        let element = self.iter.next()?;
        if element.is_some() {
            self.position += 1;
        }
        Ok(element)
    }
}

/// Replays the store where populated, extending it from the parent otherwise
struct CacheIter<T: TensorType> {
    parent: Dataset<T>,
    store: Arc<Mutex<CacheState<T>>>,
    position: usize,
}

impl<T: TensorType> ElementIter<T> for CacheIter<T> {
    fn next(&mut self) -> Result<Option<Element<T>>> {
        let mut guard = self
            .store
            .lock()
            .map_err(|_| Error::invalid_argument("cache store poisoned by a panicked pass"))?;
        let state = &mut *guard;

        if self.position < state.elements.len() {
            let element = state.elements[self.position].clone();
            self.position += 1;
            return Ok(Some(element));
        }
        if state.complete {
            return Ok(None);
        }

        if state.producer.is_none() {
            state.producer = Some(Producer {
                iter: compile(&self.parent),
                position: 0,
            });
        }
        let cached = state.elements.len();
        let pulled = match state.producer.as_mut() {
            Some(producer) => producer.pull(cached),
            None => Ok(None),
        };
        match pulled {
            Ok(Some(element)) => {
                state.elements.push(element.clone());
                self.position = state.elements.len();
                Ok(Some(element))
            }
            Ok(None) => {
                state.complete = true;
                state.producer = None;
                debug!(elements = state.elements.len(), "cache materialization complete");
                Ok(None)
            }
            Err(error) => {
                state.producer = None;
                Err(error)
            }
        }
    }
}

/// Expands each parent element into a sub-dataset drained in order
struct FlatMapIter<T: TensorType> {
    parent: Box<dyn ElementIter<T>>,
    f: FlatMapFn<T>,
    current: Option<Box<dyn ElementIter<T>>>,
}

impl<T: TensorType> ElementIter<T> for FlatMapIter<T> {
    fn next(&mut self) -> Result<Option<Element<T>>> {
        loop {
            if let Some(inner) = &mut self.current {
                if let Some(element) = inner.next()? {
                    return Ok(Some(element));
                }
                self.current = None;
            }

            match self.parent.next()? {
                Some(element) => {
                    let sub = (self.f)(element)?;
                    self.current = Some(compile(&sub));
                }
                None => return Ok(None),
            }
        }
    }
}
