use std::ops::Range;

use ndarray::{ArrayView2, s};

use crate::error::{OrchestratorError, Result};

/// How the rows of a global batch are split across devices.
///
/// Device `i` owns rows `[i·B, (i+1)·B)`: the slices are contiguous, never overlap and cover
/// the batch exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPartition {
    n_devices: usize,
    batch_size_per_device: usize,
}

impl BatchPartition {
    pub fn new(n_devices: usize, batch_size_per_device: usize) -> Self {
        Self {
            n_devices,
            batch_size_per_device,
        }
    }

    /// Splits a batch of `rows` rows evenly across `n_devices` devices.
    ///
    /// # Returns
    /// A `DevicePartitionMismatch` error if the rows aren't evenly divisible.
    pub fn even(rows: usize, n_devices: usize) -> Result<Self> {
        if n_devices == 0 || rows % n_devices != 0 {
            return Err(OrchestratorError::DevicePartitionMismatch {
                rows,
                n_devices,
                batch_size_per_device: rows.checked_div(n_devices).unwrap_or(0),
            });
        }

        Ok(Self::new(n_devices, rows / n_devices))
    }

    pub fn n_devices(&self) -> usize {
        self.n_devices
    }

    pub fn batch_size_per_device(&self) -> usize {
        self.batch_size_per_device
    }

    pub fn rows(&self) -> usize {
        self.n_devices * self.batch_size_per_device
    }

    /// Returns the rows owned by `device`.
    pub fn range(&self, device: usize) -> Range<usize> {
        let b = self.batch_size_per_device;
        device * b..(device + 1) * b
    }

    /// Checks that a batch has exactly one slice per device.
    pub fn check(&self, rows: usize) -> Result<()> {
        if rows != self.rows() {
            return Err(OrchestratorError::DevicePartitionMismatch {
                rows,
                n_devices: self.n_devices,
                batch_size_per_device: self.batch_size_per_device,
            });
        }

        Ok(())
    }

    /// Returns the slice of `batch` owned by `device`.
    pub fn slice<'a>(&self, batch: ArrayView2<'a, f32>, device: usize) -> ArrayView2<'a, f32> {
        batch.slice_move(s![self.range(device), ..])
    }
}
