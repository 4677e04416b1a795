use std::collections::{HashMap, hash_map::Entry};

use ndarray::ArrayD;
use parameter_server::ParameterHandle;

use crate::{MlErr, Result};

/// Accumulates the gradients of a backward pass, keyed by parameter name.
///
/// A parameter reached by more than one loss (or more than one application of a module)
/// gets the sum of its contributions.
#[derive(Debug, Default)]
pub struct GradSink {
    grads: HashMap<String, ArrayD<f32>>,
}

impl GradSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `grad` to the gradient accumulated for `param`.
    ///
    /// # Arguments
    /// * `param` - The parameter the gradient belongs to.
    /// * `grad` - The gradient, shaped like the parameter.
    ///
    /// # Returns
    /// A `SizeMismatch` error if the shapes differ.
    pub fn accumulate(&mut self, param: &ParameterHandle, grad: ArrayD<f32>) -> Result<()> {
        if grad.shape() != param.shape() {
            return Err(MlErr::SizeMismatch {
                what: "gradient",
                got: grad.len(),
                expected: param.len(),
            });
        }

        match self.grads.entry(param.name().to_string()) {
            Entry::Occupied(mut entry) => *entry.get_mut() += &grad,
            Entry::Vacant(entry) => {
                entry.insert(grad);
            }
        }

        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ArrayD<f32>> {
        self.grads.get(name)
    }

    /// Removes and returns the gradient of `name`, if the pass reached it.
    pub fn take(&mut self, name: &str) -> Option<ArrayD<f32>> {
        self.grads.remove(name)
    }

    pub fn len(&self) -> usize {
        self.grads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grads.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parameter_server::{ParameterStore, initialization::ConstParamGen};

    #[test]
    fn contributions_are_summed() {
        let store = ParameterStore::new();
        let w = store
            .get_or_create("discriminator/w", &[2], &mut ConstParamGen::new(0.))
            .unwrap();

        let mut sink = GradSink::new();
        sink.accumulate(&w, ndarray::arr1(&[1., 2.]).into_dyn())
            .unwrap();
        sink.accumulate(&w, ndarray::arr1(&[0.5, 0.5]).into_dyn())
            .unwrap();

        assert_eq!(sink.len(), 1);
        assert_eq!(
            sink.take("discriminator/w").unwrap().as_slice().unwrap(),
            &[1.5, 2.5]
        );
        assert!(sink.is_empty());
    }

    #[test]
    fn rejects_misshaped_gradients() {
        let store = ParameterStore::new();
        let w = store
            .get_or_create("w", &[2], &mut ConstParamGen::new(0.))
            .unwrap();

        let err = GradSink::new()
            .accumulate(&w, ndarray::arr1(&[1., 2., 3.]).into_dyn())
            .unwrap_err();

        assert!(matches!(err, MlErr::SizeMismatch { got: 3, expected: 2, .. }));
    }
}
