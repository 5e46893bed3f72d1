//! Type-erased parameter shards
//!
//! A shard wraps exactly one [`Table`] behind the object-safe [`PsShard`]
//! trait so the registry and the operation layer can hold shards of any
//! supported key/value pair as `Arc<dyn PsShard>`.
//!
//! # Shape contract
//!
//! Keys and values are scalars (`key_shape()` and `value_shape()` are rank
//! 0), so a batch of keys of shape `S` must come with values of shape `S`.
//! The general rule implemented by [`PsShard::expected_value_shape`] is
//! "keys shape, minus the key-shape suffix, plus the value shape".
//!
//! # Supported pairs
//!
//! | key   | value                        |
//! |-------|------------------------------|
//! | int32 | double, float, int32         |
//! | int64 | double, float, int32, int64  |

use crate::table::{ScalarKey, Table};
use psshard_core::{DType, Element, Error, Result, Tensor, TensorShape};
use std::fmt;
use std::sync::Arc;

/// Shared, reference-counted shard
///
/// Cloning takes a reference; dropping releases it. A shard is destroyed
/// once the registry and every in-flight operation have dropped theirs.
pub type ShardRef = Arc<dyn PsShard>;

/// Key/value dtype pairs a scalar shard can be created for
pub const SUPPORTED_DTYPE_PAIRS: &[(DType, DType)] = &[
    (DType::Int32, DType::Double),
    (DType::Int32, DType::Float),
    (DType::Int32, DType::Int32),
    (DType::Int64, DType::Double),
    (DType::Int64, DType::Float),
    (DType::Int64, DType::Int32),
    (DType::Int64, DType::Int64),
];

/// Capability interface of one shard
///
/// Data operations validate their arguments before touching the table, so
/// a rejected call never mutates the shard.
pub trait PsShard: Send + Sync + fmt::Debug {
    /// Declared key dtype, fixed at construction
    fn key_dtype(&self) -> DType;

    /// Declared value dtype, fixed at construction
    fn value_dtype(&self) -> DType;

    /// Shape of one key
    fn key_shape(&self) -> TensorShape {
        TensorShape::scalar()
    }

    /// Shape of one value
    fn value_shape(&self) -> TensorShape {
        TensorShape::scalar()
    }

    /// Number of entries
    fn size(&self) -> usize;

    /// Look up `keys`, substituting defaults for absent keys
    ///
    /// The result has shape [`expected_value_shape`](Self::expected_value_shape)
    /// of the keys.
    fn find(&self, keys: &Tensor, defaults: &Tensor) -> Result<Tensor>;

    /// Insert or overwrite pairs
    fn insert(&self, keys: &Tensor, values: &Tensor) -> Result<()>;

    /// Replace the whole content with the given pairs
    fn import_values(&self, keys: &Tensor, values: &Tensor) -> Result<()>;

    /// Every entry as 1-D `(keys, values)` tensors
    fn export_values(&self) -> Result<(Tensor, Tensor)>;

    /// Remove keys (validated no-op)
    fn remove(&self, keys: &Tensor) -> Result<()>;

    /// Approximate memory footprint
    fn memory_used(&self) -> i64;

    /// Values shape that must accompany a batch of keys of `keys_shape`
    fn expected_value_shape(&self, keys_shape: &TensorShape) -> TensorShape {
        let mut shape = keys_shape.clone();
        shape.remove_last_dims(self.key_shape().rank());
        shape.append_shape(&self.value_shape());
        shape
    }

    /// Keys and values must carry the declared dtypes
    fn check_key_and_value_types(&self, keys: &Tensor, values: &Tensor) -> Result<()> {
        if keys.dtype() != self.key_dtype() {
            return Err(Error::invalid_argument(format!(
                "Key must be type {} but got {}",
                self.key_dtype(),
                keys.dtype()
            )));
        }
        if values.dtype() != self.value_dtype() {
            return Err(Error::invalid_argument(format!(
                "Value must be type {} but got {}",
                self.value_dtype(),
                values.dtype()
            )));
        }
        Ok(())
    }

    /// Keys must end with the key-shape suffix
    fn check_key_shape(&self, keys_shape: &TensorShape) -> Result<()> {
        let key_shape = self.key_shape();
        if !keys_shape.ends_with(&key_shape) {
            return Err(Error::invalid_argument(format!(
                "Expected key shape {} to end with {}",
                keys_shape, key_shape
            )));
        }
        Ok(())
    }

    /// Validation for insert and import
    fn check_key_and_value(&self, keys: &Tensor, values: &Tensor) -> Result<()> {
        self.check_key_and_value_types(keys, values)?;
        self.check_key_shape(keys.shape())?;

        let expected = self.expected_value_shape(keys.shape());
        if values.shape() != &expected {
            return Err(Error::invalid_argument(format!(
                "Expected shape {} for value, got {}",
                expected,
                values.shape()
            )));
        }
        Ok(())
    }

    /// Validation for remove
    fn check_key(&self, keys: &Tensor) -> Result<()> {
        if keys.dtype() != self.key_dtype() {
            return Err(Error::invalid_argument(format!(
                "Key must be type {} but got {}",
                self.key_dtype(),
                keys.dtype()
            )));
        }
        self.check_key_shape(keys.shape())
    }

    /// Strict validation for a lookup
    ///
    /// The default must be a single value or one value per key, with the
    /// matching shape.
    fn check_find_arguments(&self, keys: &Tensor, default: &Tensor) -> Result<()> {
        self.check_key_and_value_types(keys, default)?;
        self.check_key_shape(keys.shape())?;

        let value_shape = self.value_shape();
        let full = self.expected_value_shape(keys.shape());
        if default.shape() != &value_shape && default.shape() != &full {
            return Err(Error::invalid_argument(format!(
                "Expected shape {} or {} for default value, got {}",
                value_shape,
                full,
                default.shape()
            )));
        }
        Ok(())
    }
}

/// Verify that a shard was created with the dtypes the caller expects
pub fn check_shard_dtypes(
    shard: &dyn PsShard,
    key_dtype: DType,
    value_dtype: DType,
    shard_name: &str,
) -> Result<()> {
    if shard.key_dtype() != key_dtype || shard.value_dtype() != value_dtype {
        return Err(Error::invalid_argument(format!(
            "Conflicting key/value dtypes {}->{} with {}-{} for table {}",
            key_dtype,
            value_dtype,
            shard.key_dtype(),
            shard.value_dtype(),
            shard_name
        )));
    }
    Ok(())
}

/// Shard of scalar keys mapped to scalar values
pub struct ShardOfScalars<K, V> {
    table: Table<K, V>,
}

impl<K: ScalarKey, V: Element> ShardOfScalars<K, V> {
    /// Create an empty shard
    pub fn new() -> Self {
        Self {
            table: Table::new(),
        }
    }

    /// Create a shard whose table pre-allocates `capacity` entries
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the capacity cannot be reserved.
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        Ok(Self {
            table: Table::with_capacity(capacity)?,
        })
    }

    /// Underlying table
    pub fn table(&self) -> &Table<K, V> {
        &self.table
    }

    fn do_insert(&self, clear: bool, keys: &Tensor, values: &Tensor) -> Result<()> {
        self.check_key_and_value(keys, values)?;
        self.table.insert(keys.flat::<K>()?, values.flat::<V>()?, clear)
    }
}

impl<K: ScalarKey, V: Element> Default for ShardOfScalars<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for ShardOfScalars<K, V>
where
    K: ScalarKey,
    V: Element,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardOfScalars")
            .field("key_dtype", &K::DTYPE)
            .field("value_dtype", &V::DTYPE)
            .field("size", &self.table.size())
            .finish()
    }
}

impl<K: ScalarKey, V: Element> PsShard for ShardOfScalars<K, V> {
    fn key_dtype(&self) -> DType {
        K::DTYPE
    }

    fn value_dtype(&self) -> DType {
        V::DTYPE
    }

    fn size(&self) -> usize {
        self.table.size()
    }

    fn find(&self, keys: &Tensor, defaults: &Tensor) -> Result<Tensor> {
        self.check_key_and_value_types(keys, defaults)?;
        self.check_key_shape(keys.shape())?;

        let found = self.table.find(keys.flat::<K>()?, defaults.flat::<V>()?)?;
        Tensor::new(self.expected_value_shape(keys.shape()), found)
    }

    fn insert(&self, keys: &Tensor, values: &Tensor) -> Result<()> {
        self.do_insert(false, keys, values)
    }

    fn import_values(&self, keys: &Tensor, values: &Tensor) -> Result<()> {
        self.do_insert(true, keys, values)
    }

    fn export_values(&self) -> Result<(Tensor, Tensor)> {
        let (keys, values) = self.table.export_all();
        Ok((Tensor::from_vec(keys), Tensor::from_vec(values)))
    }

    fn remove(&self, keys: &Tensor) -> Result<()> {
        self.check_key(keys)?;
        self.table.remove(keys.flat::<K>()?)
    }

    fn memory_used(&self) -> i64 {
        self.table.memory_estimate()
    }
}

/// Create an empty scalar shard for a runtime dtype pair
///
/// # Errors
///
/// `Unsupported` if the pair is not in [`SUPPORTED_DTYPE_PAIRS`],
/// `InvalidArgument` if `capacity` entries cannot be reserved.
pub fn new_scalar_shard(key_dtype: DType, value_dtype: DType, capacity: usize) -> Result<ShardRef> {
    fn make<K: ScalarKey, V: Element>(capacity: usize) -> Result<ShardRef> {
        Ok(Arc::new(ShardOfScalars::<K, V>::with_capacity(capacity)?))
    }

    match (key_dtype, value_dtype) {
        (DType::Int32, DType::Double) => make::<i32, f64>(capacity),
        (DType::Int32, DType::Float) => make::<i32, f32>(capacity),
        (DType::Int32, DType::Int32) => make::<i32, i32>(capacity),
        (DType::Int64, DType::Double) => make::<i64, f64>(capacity),
        (DType::Int64, DType::Float) => make::<i64, f32>(capacity),
        (DType::Int64, DType::Int32) => make::<i64, i32>(capacity),
        (DType::Int64, DType::Int64) => make::<i64, i64>(capacity),
        (k, v) => Err(Error::unsupported(format!(
            "No scalar shard for key/value dtypes {}->{}",
            k, v
        ))),
    }
}
