//! The unit value flowing through a pipeline

use crate::error::{Error, Result};
use crate::tensor::{SparseTensor, Tensor, TensorType};

/// One unit of data produced by an iterator: a dense tensor, a sparse
/// tensor, or a fixed-arity tuple of such values
///
/// Slicing and batching operate uniformly over whichever variant the
/// upstream produces; for tuples they apply component-wise.
#[derive(Clone)]
pub enum Element<T: TensorType> {
    /// A dense tensor
    Dense(Tensor<T>),

    /// A coordinate-format sparse tensor
    Sparse(SparseTensor<T>),

    /// A fixed-arity tuple of nested values
    Tuple(Vec<Element<T>>),
}

impl<T: TensorType> Element<T> {
    /// Get the dense tensor held by this element, if it is one
    pub fn dense(&self) -> Option<&Tensor<T>> {
        match self {
            Element::Dense(tensor) => Some(tensor),
            _ => None,
        }
    }

    /// Get the sparse tensor held by this element, if it is one
    pub fn sparse(&self) -> Option<&SparseTensor<T>> {
        match self {
            Element::Sparse(sparse) => Some(sparse),
            _ => None,
        }
    }

    /// Get the tuple components of this element, if it is a tuple
    pub fn tuple(&self) -> Option<&[Element<T>]> {
        match self {
            Element::Tuple(components) => Some(components),
            _ => None,
        }
    }

    /// Size of the leading dimension shared by every component
    ///
    /// Fails with a shape error for rank-0 values and for tuples whose
    /// components disagree on the leading dimension.
    pub fn leading_dim(&self) -> Result<usize> {
        match self {
            Element::Dense(tensor) => tensor
                .shape()
                .first()
                .copied()
                .ok_or_else(|| Error::shape("cannot slice a rank-0 tensor")),
            Element::Sparse(sparse) => sparse
                .dense_shape()
                .first()
                .copied()
                .ok_or_else(|| Error::shape("cannot slice a rank-0 sparse tensor")),
            Element::Tuple(components) => {
                let mut dims = components.iter().map(Element::leading_dim);
                let first = dims.next().ok_or_else(|| {
                    Error::shape("cannot slice an empty tuple element")
                })??;
                for dim in dims {
                    let dim = dim?;
                    if dim != first {
                        return Err(Error::shape(format!(
                            "tuple components disagree on leading dimension: {first} vs {dim}"
                        )));
                    }
                }
                Ok(first)
            }
        }
    }

    /// Extract the `index`-th slice along the leading dimension of every
    /// component
    pub fn slice_leading(&self, index: usize) -> Result<Self> {
        match self {
            Element::Dense(tensor) => tensor.slice_leading(index).map(Element::Dense),
            Element::Sparse(sparse) => sparse.slice_leading(index).map(Element::Sparse),
            Element::Tuple(components) => components
                .iter()
                .map(|component| component.slice_leading(index))
                .collect::<Result<Vec<_>>>()
                .map(Element::Tuple),
        }
    }

    /// Stack elements of matching structure along a new leading dimension
    ///
    /// All elements must hold the same variant with identical shapes (and
    /// identical arity for tuples, stacked component-wise).
    pub fn stack(elements: &[Self]) -> Result<Self> {
        match elements
            .first()
            .ok_or_else(|| Error::invalid_argument("cannot stack zero elements"))?
        {
            Element::Dense(_) => {
                let tensors = elements
                    .iter()
                    .map(|element| {
                        element
                            .dense()
                            .cloned()
                            .ok_or_else(|| Error::shape("cannot batch mixed element kinds"))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Tensor::stack(&tensors).map(Element::Dense)
            }
            Element::Sparse(_) => {
                let sparses = elements
                    .iter()
                    .map(|element| {
                        element
                            .sparse()
                            .cloned()
                            .ok_or_else(|| Error::shape("cannot batch mixed element kinds"))
                    })
                    .collect::<Result<Vec<_>>>()?;
                SparseTensor::stack(&sparses).map(Element::Sparse)
            }
            Element::Tuple(first) => {
                let arity = first.len();
                let mut columns: Vec<Vec<Element<T>>> = vec![Vec::new(); arity];
                for element in elements {
                    let components = element
                        .tuple()
                        .ok_or_else(|| Error::shape("cannot batch mixed element kinds"))?;
                    if components.len() != arity {
                        return Err(Error::shape("cannot batch tuples of differing arity"));
                    }
                    for (column, component) in columns.iter_mut().zip(components) {
                        column.push(component.clone());
                    }
                }
                columns
                    .iter()
                    .map(|column| Element::stack(column))
                    .collect::<Result<Vec<_>>>()
                    .map(Element::Tuple)
            }
        }
    }
}

impl<T: TensorType + PartialEq> PartialEq for Element<T> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Element::Dense(a), Element::Dense(b)) => a == b,
            (Element::Sparse(a), Element::Sparse(b)) => a == b,
            (Element::Tuple(a), Element::Tuple(b)) => a == b,
            _ => false,
        }
    }
}

impl<T: TensorType + std::fmt::Debug> std::fmt::Debug for Element<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Element::Dense(tensor) => write!(f, "Element::Dense({tensor:?})"),
            Element::Sparse(sparse) => write!(f, "Element::Sparse({sparse:?})"),
            Element::Tuple(components) => write!(f, "Element::Tuple({components:?})"),
        }
    }
}

impl<T: TensorType> From<Tensor<T>> for Element<T> {
    fn from(tensor: Tensor<T>) -> Self {
        Element::Dense(tensor)
    }
}

impl<T: TensorType> From<SparseTensor<T>> for Element<T> {
    fn from(sparse: SparseTensor<T>) -> Self {
        Element::Sparse(sparse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dense(data: Vec<i64>, shape: Vec<usize>) -> Element<i64> {
        Element::Dense(Tensor::from_vec(data, shape).unwrap())
    }

    #[test]
    fn test_leading_dim_tuple_agreement() {
        let tuple = Element::Tuple(vec![
            dense(vec![1, 2, 3], vec![3]),
            dense(vec![4, 5, 6, 7, 8, 9], vec![3, 2]),
        ]);
        assert_eq!(tuple.leading_dim().unwrap(), 3);

        let mismatched = Element::Tuple(vec![
            dense(vec![1, 2, 3], vec![3]),
            dense(vec![4, 5], vec![2]),
        ]);
        assert!(matches!(mismatched.leading_dim(), Err(Error::Shape(_))));
    }

    #[test]
    fn test_slice_tuple() {
        let tuple = Element::Tuple(vec![
            dense(vec![1, 2], vec![2]),
            dense(vec![10, 20, 30, 40], vec![2, 2]),
        ]);

        let sliced = tuple.slice_leading(1).unwrap();
        let components = sliced.tuple().unwrap();
        assert_eq!(components[0].dense().unwrap().data(), &[2]);
        assert_eq!(components[1].dense().unwrap().data(), &[30, 40]);
    }

    #[test]
    fn test_stack_mixed_kinds_fails() {
        let sparse =
            Element::Sparse(SparseTensor::new(vec![0], vec![1_i64], vec![3]).unwrap());
        let elements = [dense(vec![1, 2, 3], vec![3]), sparse];
        assert!(matches!(Element::stack(&elements), Err(Error::Shape(_))));
    }

    #[test]
    fn test_stack_tuple_with_non_tuple_reports_mixed_kinds() {
        let tuple = Element::Tuple(vec![dense(vec![1], vec![1])]);
        let err = Element::stack(&[tuple, dense(vec![2], vec![1])]).unwrap_err();
        assert_eq!(err, Error::Shape("cannot batch mixed element kinds".into()));
    }

    #[test]
    fn test_stack_tuples_of_differing_arity() {
        let a = Element::Tuple(vec![dense(vec![1], vec![1])]);
        let b = Element::Tuple(vec![dense(vec![2], vec![1]), dense(vec![3], vec![1])]);
        let err = Element::stack(&[a, b]).unwrap_err();
        assert_eq!(err, Error::Shape("cannot batch tuples of differing arity".into()));
    }

    #[test]
    fn test_stack_tuples_component_wise() {
        let a = Element::Tuple(vec![dense(vec![1], vec![1]), dense(vec![2], vec![1])]);
        let b = Element::Tuple(vec![dense(vec![3], vec![1]), dense(vec![4], vec![1])]);

        let stacked = Element::stack(&[a, b]).unwrap();
        let components = stacked.tuple().unwrap();
        assert_eq!(components[0].dense().unwrap().data(), &[1, 3]);
        assert_eq!(components[1].dense().unwrap().data(), &[2, 4]);
    }
}
