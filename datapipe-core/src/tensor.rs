//! Dense and sparse tensor values flowing through pipelines

use std::fmt;
use std::sync::Arc;

use bytemuck::Pod;

use crate::error::{Error, Result};

/// Trait for scalar types that can be stored in tensors
pub trait TensorType: Pod + Send + Sync + 'static {}

impl<T: Pod + Send + Sync + 'static> TensorType for T {}

/// A dense multidimensional tensor, immutable once constructed
pub struct Tensor<T: TensorType> {
    /// Shape of the tensor (dimension sizes)
    shape: Vec<usize>,

    /// Flat row-major data, length equal to the product of the shape
    data: Arc<[T]>,
}

impl<T: TensorType> Tensor<T> {
    /// Create a tensor from a flat vector and a shape
    pub fn from_vec(data: Vec<T>, shape: Vec<usize>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(Error::invalid_argument(format!(
                "data length {} does not match shape product {}",
                data.len(),
                expected
            )));
        }

        Ok(Self {
            shape,
            data: data.into(),
        })
    }

    /// Create a rank-0 tensor holding a single value
    pub fn scalar(value: T) -> Self {
        Self {
            shape: Vec::new(),
            data: vec![value].into(),
        }
    }

    /// Get the shape of this tensor
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Get the number of dimensions
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Get the total number of elements
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if this tensor has no elements
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get the flat row-major data
    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Get the value at the given indices, one per dimension
    pub fn get(&self, indices: &[usize]) -> Result<T> {
        if indices.len() != self.shape.len() {
            return Err(Error::invalid_argument(format!(
                "expected {} indices for a rank-{} tensor, got {}",
                self.shape.len(),
                self.shape.len(),
                indices.len()
            )));
        }

        let mut offset = 0;
        for (dim, (&index, &bound)) in indices.iter().zip(&self.shape).enumerate() {
            if index >= bound {
                return Err(Error::invalid_argument(format!(
                    "index {index} out of bounds for dimension {dim} of size {bound}"
                )));
            }
            offset = offset * bound + index;
        }
        Ok(self.data[offset])
    }

    /// Reinterpret the data under a new shape with the same element count
    pub fn reshape(&self, new_shape: Vec<usize>) -> Result<Self> {
        let new_len: usize = new_shape.iter().product();
        if new_len != self.data.len() {
            return Err(Error::invalid_argument(format!(
                "cannot reshape tensor of {} elements to shape {:?}",
                self.data.len(),
                new_shape
            )));
        }

        Ok(Self {
            shape: new_shape,
            data: Arc::clone(&self.data),
        })
    }

    /// Extract the `index`-th slice along the leading dimension
    ///
    /// For a tensor of shape `[N, d1, d2, ...]` the result has shape
    /// `[d1, d2, ...]`.
    pub fn slice_leading(&self, index: usize) -> Result<Self> {
        let leading = *self
            .shape
            .first()
            .ok_or_else(|| Error::shape("cannot slice a rank-0 tensor"))?;
        if index >= leading {
            return Err(Error::invalid_argument(format!(
                "slice index {index} out of bounds for leading dimension {leading}"
            )));
        }

        let stride: usize = self.shape[1..].iter().product();
        let data = self.data[index * stride..(index + 1) * stride].to_vec();

        Ok(Self {
            shape: self.shape[1..].to_vec(),
            data: data.into(),
        })
    }

    /// Stack tensors of identical shape along a new leading dimension
    ///
    /// The result of stacking `k` tensors of shape `[d1, ...]` has shape
    /// `[k, d1, ...]`.
    pub fn stack(tensors: &[Self]) -> Result<Self> {
        let first = tensors
            .first()
            .ok_or_else(|| Error::invalid_argument("cannot stack zero tensors"))?;

        let mut data = Vec::with_capacity(first.len() * tensors.len());
        for tensor in tensors {
            if tensor.shape != first.shape {
                return Err(Error::shape(format!(
                    "cannot stack tensor of shape {:?} with shape {:?}",
                    tensor.shape, first.shape
                )));
            }
            data.extend_from_slice(&tensor.data);
        }

        let mut shape = Vec::with_capacity(first.shape.len() + 1);
        shape.push(tensors.len());
        shape.extend_from_slice(&first.shape);

        Ok(Self {
            shape,
            data: data.into(),
        })
    }
}

impl<T: TensorType> Clone for Tensor<T> {
    fn clone(&self) -> Self {
        Self {
            shape: self.shape.clone(),
            data: Arc::clone(&self.data),
        }
    }
}

impl<T: TensorType + PartialEq> PartialEq for Tensor<T> {
    fn eq(&self, other: &Self) -> bool {
        self.shape == other.shape && self.data == other.data
    }
}

impl<T: TensorType + fmt::Debug> fmt::Debug for Tensor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Tensor<{}>{{ shape: {:?}, len: {} }}",
            std::any::type_name::<T>(),
            self.shape,
            self.data.len()
        )
    }
}

/// A coordinate-format sparse tensor
///
/// Rows are `(index tuple, value)` pairs over a declared dense shape; every
/// unlisted position is implicitly zero. Index tuples are stored flattened
/// (`rank` coordinates per row) and must be strictly increasing in row-major
/// order, which also rules out duplicates.
pub struct SparseTensor<T: TensorType> {
    /// Declared dense shape
    dense_shape: Vec<usize>,

    /// Flattened index tuples, `dense_shape.len()` coordinates per row
    indices: Arc<[usize]>,

    /// One value per index tuple
    values: Arc<[T]>,
}

impl<T: TensorType> SparseTensor<T> {
    /// Create a sparse tensor, validating the coordinate-format invariants
    pub fn new(indices: Vec<usize>, values: Vec<T>, dense_shape: Vec<usize>) -> Result<Self> {
        let rank = dense_shape.len();
        if rank == 0 {
            if !indices.is_empty() || !values.is_empty() {
                return Err(Error::shape(
                    "a rank-0 sparse tensor cannot hold any rows",
                ));
            }
        } else if indices.len() != values.len() * rank {
            return Err(Error::invalid_argument(format!(
                "expected {} coordinates for {} values of rank {}, got {}",
                values.len() * rank,
                values.len(),
                rank,
                indices.len()
            )));
        }

        for (row, tuple) in indices.chunks(rank.max(1)).enumerate() {
            for (dim, (&coord, &bound)) in tuple.iter().zip(&dense_shape).enumerate() {
                if coord >= bound {
                    return Err(Error::invalid_argument(format!(
                        "index {coord} at row {row} exceeds dense_shape[{dim}] = {bound}"
                    )));
                }
            }
            if row > 0 {
                let prev = &indices[(row - 1) * rank..row * rank];
                if tuple <= prev {
                    return Err(Error::invalid_argument(format!(
                        "indices not strictly increasing in row-major order at row {row}"
                    )));
                }
            }
        }

        Ok(Self {
            dense_shape,
            indices: indices.into(),
            values: values.into(),
        })
    }

    /// Get the declared dense shape
    pub fn dense_shape(&self) -> &[usize] {
        &self.dense_shape
    }

    /// Get the number of dimensions
    pub fn rank(&self) -> usize {
        self.dense_shape.len()
    }

    /// Get the number of explicitly stored rows
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Get the flattened index tuples
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Get the stored values
    pub fn values(&self) -> &[T] {
        &self.values
    }

    /// Get the index tuple of the `row`-th stored entry
    pub fn index(&self, row: usize) -> &[usize] {
        let rank = self.rank();
        &self.indices[row * rank..(row + 1) * rank]
    }

    /// Extract the `index`-th slice along the leading dimension
    ///
    /// Retains the rows whose leading coordinate equals `index`, strips that
    /// coordinate from each retained tuple, and drops the leading
    /// `dense_shape` entry.
    pub fn slice_leading(&self, index: usize) -> Result<Self> {
        let leading = *self
            .dense_shape
            .first()
            .ok_or_else(|| Error::shape("cannot slice a rank-0 sparse tensor"))?;
        if index >= leading {
            return Err(Error::invalid_argument(format!(
                "slice index {index} out of bounds for leading dimension {leading}"
            )));
        }

        let rank = self.rank();
        let mut indices = Vec::new();
        let mut values = Vec::new();
        for (row, tuple) in self.indices.chunks(rank).enumerate() {
            if tuple[0] == index {
                indices.extend_from_slice(&tuple[1..]);
                values.push(self.values[row]);
            }
        }

        Ok(Self {
            dense_shape: self.dense_shape[1..].to_vec(),
            indices: indices.into(),
            values: values.into(),
        })
    }

    /// Stack sparse tensors of identical dense shape along a new leading
    /// batch dimension
    ///
    /// Each retained row gains its tensor's batch position as a new leading
    /// coordinate. Inputs are already sorted and batch positions ascend, so
    /// plain concatenation preserves the row-major ordering invariant.
    pub fn stack(tensors: &[Self]) -> Result<Self> {
        let first = tensors
            .first()
            .ok_or_else(|| Error::invalid_argument("cannot stack zero sparse tensors"))?;

        let rank = first.rank();
        let mut indices = Vec::new();
        let mut values = Vec::new();
        for (batch, tensor) in tensors.iter().enumerate() {
            if tensor.dense_shape != first.dense_shape {
                return Err(Error::shape(format!(
                    "cannot stack sparse tensor of dense_shape {:?} with dense_shape {:?}",
                    tensor.dense_shape, first.dense_shape
                )));
            }
            // Iterate by stored row, not by index chunk: rank-0 rows have
            // empty index tuples but still carry a value and need a batch
            // coordinate.
            for row in 0..tensor.nnz() {
                indices.push(batch);
                indices.extend_from_slice(tensor.index(row));
            }
            values.extend_from_slice(&tensor.values);
        }

        let mut dense_shape = Vec::with_capacity(rank + 1);
        dense_shape.push(tensors.len());
        dense_shape.extend_from_slice(&first.dense_shape);

        Ok(Self {
            dense_shape,
            indices: indices.into(),
            values: values.into(),
        })
    }
}

impl<T: TensorType> Clone for SparseTensor<T> {
    fn clone(&self) -> Self {
        Self {
            dense_shape: self.dense_shape.clone(),
            indices: Arc::clone(&self.indices),
            values: Arc::clone(&self.values),
        }
    }
}

impl<T: TensorType + PartialEq> PartialEq for SparseTensor<T> {
    fn eq(&self, other: &Self) -> bool {
        self.dense_shape == other.dense_shape
            && self.indices == other.indices
            && self.values == other.values
    }
}

impl<T: TensorType + fmt::Debug> fmt::Debug for SparseTensor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SparseTensor<{}>{{ dense_shape: {:?}, nnz: {} }}",
            std::any::type_name::<T>(),
            self.dense_shape,
            self.values.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vec_validates_length() {
        let err = Tensor::from_vec(vec![1.0_f64, 2.0, 3.0], vec![2, 2]).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_slice_leading_dense() {
        let tensor = Tensor::from_vec(vec![1, 2, 3, 4, 5, 6], vec![3, 2]).unwrap();

        let row = tensor.slice_leading(1).unwrap();
        assert_eq!(row.shape(), &[2]);
        assert_eq!(row.data(), &[3, 4]);

        let err = tensor.slice_leading(3).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_slice_scalar_is_shape_error() {
        let scalar = Tensor::scalar(7_i64);
        assert!(matches!(scalar.slice_leading(0), Err(Error::Shape(_))));
    }

    #[test]
    fn test_stack_dense() {
        let a = Tensor::from_vec(vec![1, 2], vec![2]).unwrap();
        let b = Tensor::from_vec(vec![3, 4], vec![2]).unwrap();

        let stacked = Tensor::stack(&[a, b]).unwrap();
        assert_eq!(stacked.shape(), &[2, 2]);
        assert_eq!(stacked.data(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_stack_shape_mismatch() {
        let a = Tensor::from_vec(vec![1, 2], vec![2]).unwrap();
        let b = Tensor::from_vec(vec![3, 4, 5], vec![3]).unwrap();
        assert!(matches!(Tensor::stack(&[a, b]), Err(Error::Shape(_))));
    }

    #[test]
    fn test_reshape() {
        let tensor = Tensor::from_vec((0..6).collect(), vec![6]).unwrap();
        let reshaped = tensor.reshape(vec![2, 3]).unwrap();
        assert_eq!(reshaped.shape(), &[2, 3]);
        assert_eq!(reshaped.data(), tensor.data());
        assert!(tensor.reshape(vec![4]).is_err());
    }

    #[test]
    fn test_sparse_validation() {
        // out-of-bounds coordinate
        assert!(SparseTensor::new(vec![5], vec![1_i64], vec![5]).is_err());
        // unsorted rows
        assert!(SparseTensor::new(vec![3, 1], vec![1_i64, 2], vec![5]).is_err());
        // duplicate rows
        assert!(SparseTensor::new(vec![1, 1], vec![1_i64, 2], vec![5]).is_err());
        // coordinate count disagrees with value count
        assert!(SparseTensor::new(vec![0, 1, 2], vec![1_i64, 2], vec![5, 5]).is_err());

        let ok = SparseTensor::new(vec![0, 1, 1, 0], vec![1_i64, 2], vec![2, 2]).unwrap();
        assert_eq!(ok.nnz(), 2);
        assert_eq!(ok.index(1), &[1, 0]);
    }

    #[test]
    fn test_sparse_slice_leading() {
        let sparse = SparseTensor::new(
            vec![0, 1, 1, 0, 1, 2],
            vec![10_i64, 20, 30],
            vec![3, 4],
        )
        .unwrap();

        let row1 = sparse.slice_leading(1).unwrap();
        assert_eq!(row1.dense_shape(), &[4]);
        assert_eq!(row1.indices(), &[0, 2]);
        assert_eq!(row1.values(), &[20, 30]);

        let row2 = sparse.slice_leading(2).unwrap();
        assert_eq!(row2.nnz(), 0);
    }

    #[test]
    fn test_sparse_stack() {
        let a = SparseTensor::new(vec![0, 2], vec![1_i64, 3], vec![4]).unwrap();
        let b = SparseTensor::new(vec![1], vec![5_i64], vec![4]).unwrap();

        let stacked = SparseTensor::stack(&[a, b]).unwrap();
        assert_eq!(stacked.dense_shape(), &[2, 4]);
        assert_eq!(stacked.indices(), &[0, 0, 0, 2, 1, 1]);
        assert_eq!(stacked.values(), &[1, 3, 5]);
    }

    #[test]
    fn test_sparse_stack_scalar_rows() {
        // Slicing a rank-1 sparse tensor yields rank-0 rows whose index
        // tuples are empty; stacking must still emit one batch coordinate
        // per stored value.
        let row = SparseTensor::new(vec![0, 1], vec![10_i64, 20], vec![2]).unwrap();
        let scalars = [row.slice_leading(0).unwrap(), row.slice_leading(1).unwrap()];

        let stacked = SparseTensor::stack(&scalars).unwrap();
        assert_eq!(stacked.dense_shape(), &[2]);
        assert_eq!(stacked.indices(), &[0, 1]);
        assert_eq!(stacked.values(), &[10, 20]);
    }

    #[test]
    fn test_get_indexed_value() {
        let tensor = Tensor::from_vec((0..6).collect(), vec![2, 3]).unwrap();
        assert_eq!(tensor.get(&[0, 0]).unwrap(), 0);
        assert_eq!(tensor.get(&[1, 2]).unwrap(), 5);
        assert!(matches!(tensor.get(&[1]), Err(Error::InvalidArgument(_))));
        assert!(matches!(tensor.get(&[0, 3]), Err(Error::InvalidArgument(_))));
        assert_eq!(Tensor::scalar(9_i64).get(&[]).unwrap(), 9);
    }

    #[test]
    fn test_sparse_stack_shape_mismatch() {
        let a = SparseTensor::new(vec![0], vec![1_i64], vec![4]).unwrap();
        let b = SparseTensor::new(vec![0], vec![1_i64], vec![5]).unwrap();
        assert!(matches!(
            SparseTensor::stack(&[a, b]),
            Err(Error::Shape(_))
        ));
    }
}
