use std::collections::HashMap;

use log::debug;
use ndarray::ArrayViewD;
use parking_lot::Mutex;
use rayon::prelude::*;

use super::{Optimizer, OptimizerFactory};
use crate::storage::{ParameterHandle, Partition, Result, StoreErr};

/// The optimizer owning the trainable parameters of one partition.
///
/// Each parameter gets its own slot, created through the factory the first time a gradient for
/// it shows up, so slot state lives as long as this instance.
pub struct PartitionOptimizer {
    partition: Partition,
    factory: OptimizerFactory,
    slots: HashMap<String, Mutex<Box<dyn Optimizer>>>,
}

impl PartitionOptimizer {
    /// Creates a new `PartitionOptimizer`.
    ///
    /// # Arguments
    /// * `partition` - The partition whose parameters this optimizer updates.
    /// * `factory` - Builds the optimizer slot of a parameter given its amount of values.
    ///
    /// # Returns
    /// A new `PartitionOptimizer` instance.
    pub fn new(partition: Partition, factory: OptimizerFactory) -> Self {
        Self {
            partition,
            factory,
            slots: HashMap::new(),
        }
    }

    pub fn partition(&self) -> Partition {
        self.partition
    }

    /// Returns the amount of parameters with an allocated slot.
    pub fn slots(&self) -> usize {
        self.slots.len()
    }

    /// Applies one averaged gradient per parameter.
    ///
    /// Every gradient is validated against its parameter before any value is written, the
    /// updates themselves run in parallel across parameters.
    ///
    /// # Arguments
    /// * `gradients` - The parameters to update paired with their gradients.
    ///
    /// # Returns
    /// An error if a gradient doesn't match the shape of its parameter.
    pub fn apply_gradients(
        &mut self,
        gradients: &[(&ParameterHandle, ArrayViewD<'_, f32>)],
    ) -> Result<()> {
        for (param, grad) in gradients {
            if grad.shape() != param.shape() {
                return Err(StoreErr::SizeMismatch {
                    what: format!("gradient of {}", param.name()),
                    got: grad.len(),
                    expected: param.len(),
                });
            }

            if !self.slots.contains_key(param.name()) {
                let slot = (self.factory)(param.len());
                self.slots.insert(param.name().to_string(), Mutex::new(slot));
            }
        }

        debug!(partition = self.partition.scope(), params = gradients.len(); "applying gradients");

        let slots = &self.slots;

        gradients.par_iter().try_for_each(|(param, grad)| {
            let non_contiguous = || StoreErr::NonContiguous {
                name: param.name().to_string(),
            };

            let mut slot = slots
                .get(param.name())
                .ok_or_else(|| StoreErr::MissingParameter {
                    name: param.name().to_string(),
                })?
                .lock();
            let grad = grad.as_standard_layout();
            let grad = grad.as_slice().ok_or_else(non_contiguous)?;

            let mut data = param.write();
            let values = data.as_slice_mut().ok_or_else(non_contiguous)?;

            slot.update_params(grad, values)
        })
    }
}
