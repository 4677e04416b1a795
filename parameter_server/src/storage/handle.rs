use std::sync::Arc;

use ndarray::{ArrayD, IxDyn};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{ParamKind, Partition, Result, StoreErr};

/// The single live instance of a named parameter.
#[derive(Debug)]
struct Parameter {
    name: String,
    shape: Box<[usize]>,
    partition: Option<Partition>,
    kind: ParamKind,
    data: RwLock<ArrayD<f32>>,
}

/// A shared reference to a parameter living in a `ParameterStore`.
///
/// Cloning a handle never copies the parameter, every clone reads and writes the same storage.
/// The storage is pinned to the store, a replica running on another device reaches it through
/// an implicit transfer, so reads aren't device local.
#[derive(Debug, Clone)]
pub struct ParameterHandle(Arc<Parameter>);

impl ParameterHandle {
    /// Creates a new `ParameterHandle` owning freshly initialized values.
    ///
    /// # Arguments
    /// * `name` - The stable name of the parameter.
    /// * `shape` - The shape of the parameter.
    /// * `partition` - The partition this parameter belongs to, if any.
    /// * `kind` - Whether it's trainable or a normalization statistic.
    /// * `values` - The initial values in row major order.
    ///
    /// # Returns
    /// A new `ParameterHandle` or a `SizeMismatch` error if `values` doesn't fill `shape`.
    pub(super) fn new(
        name: &str,
        shape: &[usize],
        partition: Option<Partition>,
        kind: ParamKind,
        values: Vec<f32>,
    ) -> Result<Self> {
        let expected = shape.iter().product();

        if values.len() != expected {
            return Err(StoreErr::SizeMismatch {
                what: name.to_string(),
                got: values.len(),
                expected,
            });
        }

        let data = ArrayD::from_shape_vec(IxDyn(shape), values).map_err(|_| {
            StoreErr::SizeMismatch {
                what: name.to_string(),
                got: 0,
                expected,
            }
        })?;

        Ok(Self(Arc::new(Parameter {
            name: name.to_string(),
            shape: shape.into(),
            partition,
            kind,
            data: RwLock::new(data),
        })))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn shape(&self) -> &[usize] {
        &self.0.shape
    }

    /// Returns the amount of scalar values held by this parameter.
    pub fn len(&self) -> usize {
        self.0.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn partition(&self) -> Option<Partition> {
        self.0.partition
    }

    pub fn kind(&self) -> ParamKind {
        self.0.kind
    }

    pub fn is_trainable(&self) -> bool {
        self.0.kind == ParamKind::Trainable
    }

    /// Locks the parameter for reading.
    ///
    /// This lock only covers this parameter. A reader that needs a consistent view across
    /// parameters holds [`ParameterStore::read_gate`] first, the way replica passes and
    /// [`ParameterStore::snapshot`] do, otherwise it may observe a half committed step.
    ///
    /// [`ParameterStore::read_gate`]: crate::ParameterStore::read_gate
    /// [`ParameterStore::snapshot`]: crate::ParameterStore::snapshot
    pub fn read(&self) -> RwLockReadGuard<'_, ArrayD<f32>> {
        self.0.data.read()
    }

    /// Locks the parameter for writing.
    ///
    /// Only a train step commit should write, and only while holding the store's write gate.
    pub fn write(&self) -> RwLockWriteGuard<'_, ArrayD<f32>> {
        self.0.data.write()
    }

    /// Checks whether both handles point to the very same parameter instance.
    pub fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
