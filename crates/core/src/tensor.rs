//! Typed, shaped arrays exchanged at the operation boundary
//!
//! A [`Tensor`] is a flat buffer of one [`DType`] plus a [`TensorShape`].
//! It carries keys, values and defaults into shard operations and carries
//! results back out. The element types are the closed set the shard tables
//! are instantiated for, plus `String` for the reference form of a handle.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Element type of a tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    /// 32-bit signed integer
    Int32,
    /// 64-bit signed integer
    Int64,
    /// 32-bit floating point
    Float,
    /// 64-bit floating point
    Double,
    /// UTF-8 string
    String,
}

impl DType {
    /// Lowercase name used in error messages
    pub fn name(&self) -> &'static str {
        match self {
            DType::Int32 => "int32",
            DType::Int64 => "int64",
            DType::Float => "float",
            DType::Double => "double",
            DType::String => "string",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Shape of a tensor; rank 0 is a scalar
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TensorShape(Vec<usize>);

impl TensorShape {
    /// Create a shape from its dimensions
    pub fn new(dims: impl Into<Vec<usize>>) -> Self {
        TensorShape(dims.into())
    }

    /// The rank-0 shape
    pub fn scalar() -> Self {
        TensorShape(Vec::new())
    }

    /// One-dimensional shape of length `len`
    pub fn vector(len: usize) -> Self {
        TensorShape(vec![len])
    }

    /// Number of dimensions
    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Dimension sizes
    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// Product of all dimensions (1 for a scalar)
    ///
    /// `None` if the product does not fit in `usize`.
    pub fn num_elements(&self) -> Option<usize> {
        self.0.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
    }

    /// True if `suffix` matches the trailing dimensions of this shape
    pub fn ends_with(&self, suffix: &TensorShape) -> bool {
        self.0.ends_with(&suffix.0)
    }

    /// Drop the last `n` dimensions (saturating at rank 0)
    pub fn remove_last_dims(&mut self, n: usize) {
        let keep = self.0.len().saturating_sub(n);
        self.0.truncate(keep);
    }

    /// Append every dimension of `other`
    pub fn append_shape(&mut self, other: &TensorShape) {
        self.0.extend_from_slice(&other.0);
    }
}

impl fmt::Display for TensorShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", d)?;
        }
        write!(f, "]")
    }
}

/// Flat storage for one tensor, tagged by element type
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    /// `DType::Int32` elements
    Int32(Vec<i32>),
    /// `DType::Int64` elements
    Int64(Vec<i64>),
    /// `DType::Float` elements
    Float(Vec<f32>),
    /// `DType::Double` elements
    Double(Vec<f64>),
    /// `DType::String` elements
    String(Vec<String>),
}

impl TensorData {
    /// Element type of this buffer
    pub fn dtype(&self) -> DType {
        match self {
            TensorData::Int32(_) => DType::Int32,
            TensorData::Int64(_) => DType::Int64,
            TensorData::Float(_) => DType::Float,
            TensorData::Double(_) => DType::Double,
            TensorData::String(_) => DType::String,
        }
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        match self {
            TensorData::Int32(v) => v.len(),
            TensorData::Int64(v) => v.len(),
            TensorData::Float(v) => v.len(),
            TensorData::Double(v) => v.len(),
            TensorData::String(v) => v.len(),
        }
    }

    /// True if the buffer holds no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Numeric element types a tensor can be viewed as
///
/// Implemented for exactly the Rust types backing the numeric [`DType`]s.
pub trait Element: Copy + Send + Sync + PartialEq + fmt::Debug + fmt::Display + 'static {
    /// Tag for this element type
    const DTYPE: DType;

    /// Borrow the buffer as `&[Self]` if the tags agree
    fn view(data: &TensorData) -> Option<&[Self]>;

    /// Wrap owned elements in a tagged buffer
    fn wrap(values: Vec<Self>) -> TensorData;
}

macro_rules! impl_element {
    ($ty:ty, $variant:ident) => {
        impl Element for $ty {
            const DTYPE: DType = DType::$variant;

            #[inline]
            fn view(data: &TensorData) -> Option<&[Self]> {
                match data {
                    TensorData::$variant(v) => Some(v.as_slice()),
                    _ => None,
                }
            }

            #[inline]
            fn wrap(values: Vec<Self>) -> TensorData {
                TensorData::$variant(values)
            }
        }
    };
}

impl_element!(i32, Int32);
impl_element!(i64, Int64);
impl_element!(f32, Float);
impl_element!(f64, Double);

/// A shaped, typed array
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: TensorShape,
    data: TensorData,
}

impl Tensor {
    /// Create a tensor, checking that `shape` accounts for every element
    pub fn new<T: Element>(shape: TensorShape, values: Vec<T>) -> Result<Self> {
        Self::from_data(shape, T::wrap(values))
    }

    /// Create a tensor from an already tagged buffer
    pub fn from_data(shape: TensorShape, data: TensorData) -> Result<Self> {
        let expected = shape.num_elements().ok_or_else(|| {
            Error::invalid_argument(format!("Shape {} has too many elements", shape))
        })?;
        if expected != data.len() {
            return Err(Error::invalid_argument(format!(
                "Shape {} requires {} elements, got {}",
                shape,
                expected,
                data.len()
            )));
        }
        Ok(Tensor { shape, data })
    }

    /// One-dimensional tensor holding `values`
    pub fn from_vec<T: Element>(values: Vec<T>) -> Self {
        Tensor {
            shape: TensorShape::vector(values.len()),
            data: T::wrap(values),
        }
    }

    /// Rank-0 tensor holding `value`
    pub fn scalar<T: Element>(value: T) -> Self {
        Tensor {
            shape: TensorShape::scalar(),
            data: T::wrap(vec![value]),
        }
    }

    /// One-dimensional string tensor
    pub fn from_strings<S: Into<String>>(values: impl IntoIterator<Item = S>) -> Self {
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        Tensor {
            shape: TensorShape::vector(values.len()),
            data: TensorData::String(values),
        }
    }

    /// Element type
    pub fn dtype(&self) -> DType {
        self.data.dtype()
    }

    /// Shape
    pub fn shape(&self) -> &TensorShape {
        &self.shape
    }

    /// Number of elements
    pub fn num_elements(&self) -> usize {
        self.data.len()
    }

    /// Underlying buffer
    pub fn data(&self) -> &TensorData {
        &self.data
    }

    /// Flat view of the elements as `T`
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the tensor's dtype is not `T::DTYPE`.
    pub fn flat<T: Element>(&self) -> Result<&[T]> {
        T::view(&self.data).ok_or_else(|| {
            Error::invalid_argument(format!(
                "Expected tensor of type {}, got {}",
                T::DTYPE,
                self.dtype()
            ))
        })
    }

    /// Flat view of a string tensor
    pub fn flat_strings(&self) -> Result<&[String]> {
        match &self.data {
            TensorData::String(v) => Ok(v.as_slice()),
            other => Err(Error::invalid_argument(format!(
                "Expected tensor of type string, got {}",
                other.dtype()
            ))),
        }
    }

    /// Reinterpret with a new shape of the same element count
    pub fn reshape(self, shape: TensorShape) -> Result<Self> {
        Self::from_data(shape, self.data)
    }

    /// Approximate heap footprint of the element buffer in bytes
    pub fn allocated_bytes(&self) -> usize {
        match &self.data {
            TensorData::Int32(v) => v.len() * std::mem::size_of::<i32>(),
            TensorData::Int64(v) => v.len() * std::mem::size_of::<i64>(),
            TensorData::Float(v) => v.len() * std::mem::size_of::<f32>(),
            TensorData::Double(v) => v.len() * std::mem::size_of::<f64>(),
            TensorData::String(v) => v
                .iter()
                .map(|s| std::mem::size_of::<String>() + s.capacity())
                .sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_num_elements() {
        assert_eq!(TensorShape::scalar().num_elements(), Some(1));
        assert_eq!(TensorShape::vector(0).num_elements(), Some(0));
        assert_eq!(TensorShape::new(vec![2, 3]).num_elements(), Some(6));
        assert_eq!(TensorShape::new(vec![usize::MAX, 2]).num_elements(), None);
    }

    #[test]
    fn test_new_rejects_overflowing_shape() {
        let shape = TensorShape::new(vec![usize::MAX, 2]);
        let err = Tensor::new(shape.clone(), Vec::<i64>::new()).unwrap_err();
        assert!(err.is_invalid_argument());

        let err = Tensor::from_vec(vec![1i32]).reshape(shape).unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn test_shape_display() {
        assert_eq!(TensorShape::scalar().to_string(), "[]");
        assert_eq!(TensorShape::new(vec![2, 3]).to_string(), "[2,3]");
    }

    #[test]
    fn test_shape_suffix_ops() {
        let mut shape = TensorShape::new(vec![4, 2]);
        assert!(shape.ends_with(&TensorShape::scalar()));
        assert!(shape.ends_with(&TensorShape::vector(2)));
        assert!(!shape.ends_with(&TensorShape::vector(4)));

        shape.remove_last_dims(1);
        assert_eq!(shape, TensorShape::vector(4));
        shape.append_shape(&TensorShape::new(vec![3, 5]));
        assert_eq!(shape.dims(), &[4, 3, 5]);
        shape.remove_last_dims(10);
        assert_eq!(shape.rank(), 0);
    }

    #[test]
    fn test_new_rejects_wrong_element_count() {
        let err = Tensor::new(TensorShape::new(vec![2, 2]), vec![1i64, 2, 3]).unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn test_flat_checks_dtype() {
        let t = Tensor::from_vec(vec![1.0f32, 2.0]);
        assert_eq!(t.dtype(), DType::Float);
        assert_eq!(t.flat::<f32>().unwrap(), &[1.0, 2.0]);
        assert!(t.flat::<f64>().unwrap_err().is_invalid_argument());
        assert!(t.flat_strings().is_err());
    }

    #[test]
    fn test_scalar_tensor() {
        let t = Tensor::scalar(7i32);
        assert_eq!(t.shape().rank(), 0);
        assert_eq!(t.num_elements(), 1);
        assert_eq!(t.flat::<i32>().unwrap(), &[7]);
    }

    #[test]
    fn test_reshape() {
        let t = Tensor::from_vec(vec![1i64, 2, 3, 4]);
        let t = t.reshape(TensorShape::new(vec![2, 2])).unwrap();
        assert_eq!(t.shape().dims(), &[2, 2]);
        assert!(t.reshape(TensorShape::vector(3)).is_err());
    }

    #[test]
    fn test_strings() {
        let t = Tensor::from_strings(["localhost", "table"]);
        assert_eq!(t.dtype(), DType::String);
        assert_eq!(t.flat_strings().unwrap()[1], "table");
        assert!(t.flat::<i64>().is_err());
    }

    #[test]
    fn test_dtype_serde_names() {
        let json = serde_json::to_string(&DType::Double).unwrap();
        assert_eq!(json, "\"double\"");
        let back: DType = serde_json::from_str("\"int64\"").unwrap();
        assert_eq!(back, DType::Int64);
    }
}
