use ndarray::{Array1, ArrayView1};
use parameter_server::ParameterHandle;

use super::layers::LayerCache;
use crate::{MlErr, Result};

/// The intermediate values recorded by one forward application of a module.
///
/// A module applied twice in the same pass (the discriminator on real and generated inputs)
/// records two independent traces, and each backward pass must be given the trace of the
/// application it differentiates.
#[derive(Debug, Default)]
pub struct Trace {
    caches: Vec<LayerCache>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    pub(super) fn push(&mut self, cache: LayerCache) {
        self.caches.push(cache);
    }

    pub(super) fn caches(&self) -> &[LayerCache] {
        &self.caches
    }

    pub fn len(&self) -> usize {
        self.caches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.caches.is_empty()
    }
}

/// A pending exponential moving average update of a normalization statistic.
///
/// Passes only produce these, they are applied when a train step commits.
#[derive(Debug, Clone)]
pub struct NormUpdate {
    stat: ParameterHandle,
    value: Array1<f32>,
    decay: f32,
}

impl NormUpdate {
    /// Creates a new `NormUpdate`.
    ///
    /// # Arguments
    /// * `stat` - The running statistic to update.
    /// * `value` - The batch statistic observed during the pass.
    /// * `decay` - The weight kept by the running value.
    ///
    /// # Returns
    /// A new `NormUpdate` instance.
    pub fn new(stat: ParameterHandle, value: Array1<f32>, decay: f32) -> Self {
        Self { stat, value, decay }
    }

    pub fn stat(&self) -> &ParameterHandle {
        &self.stat
    }

    pub fn value(&self) -> ArrayView1<'_, f32> {
        self.value.view()
    }

    /// Checks that the batch statistic fits its running statistic.
    pub fn validate(&self) -> Result<()> {
        if self.value.len() != self.stat.len() {
            return Err(MlErr::SizeMismatch {
                what: "normalization update",
                got: self.value.len(),
                expected: self.stat.len(),
            });
        }

        Ok(())
    }

    /// Folds the batch statistic into the running one: `running * decay + value * (1 - decay)`.
    pub fn apply(&self) -> Result<()> {
        self.validate()?;

        let decay = self.decay;
        let mut running = self.stat.write();

        running
            .iter_mut()
            .zip(self.value.iter())
            .for_each(|(r, v)| *r = *r * decay + v * (1. - decay));

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parameter_server::{ParameterStore, initialization::ConstParamGen};

    #[test]
    fn apply_moves_towards_the_batch_value() {
        let store = ParameterStore::new();
        let mean = store
            .get_or_create("generator/bn/moving_mean", &[2], &mut ConstParamGen::new(0.))
            .unwrap();

        NormUpdate::new(mean.clone(), ndarray::arr1(&[1., -1.]), 0.75)
            .apply()
            .unwrap();

        assert_eq!(mean.read().as_slice().unwrap(), &[0.25, -0.25]);
    }

    #[test]
    fn rejects_misshaped_values() {
        let store = ParameterStore::new();
        let var = store
            .get_or_create("generator/bn/moving_variance", &[2], &mut ConstParamGen::new(1.))
            .unwrap();

        let update = NormUpdate::new(var.clone(), ndarray::arr1(&[1.]), 0.5);

        assert!(update.apply().is_err());
        assert_eq!(var.read().as_slice().unwrap(), &[1., 1.]);
    }
}
