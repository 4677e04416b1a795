use std::collections::HashMap;

use ndarray::{ArrayD, IxDyn};
use parameter_server::ParameterHandle;
use rayon::prelude::*;

use crate::{
    error::{OrchestratorError, Result},
    replica::GradientEntry,
};

/// The gradient of one parameter averaged over the replicas that used it.
#[derive(Debug, Clone)]
pub struct AveragedGradient {
    pub param: ParameterHandle,
    pub grad: ArrayD<f32>,
    /// The amount of replicas that reported a gradient for `param`.
    pub contributors: usize,
}

/// Combines the gradients every replica reported into one gradient per parameter.
pub struct GradientAggregator;

impl GradientAggregator {
    /// Averages the gradients of each parameter over the replicas that reported one.
    ///
    /// Absent gradients count neither in the sum nor in the divisor. The contributions of each
    /// element are summed in `f64` in sorted order, so the result doesn't depend on the order of
    /// `towers`.
    ///
    /// # Arguments
    /// * `towers` - The gradient list of each replica.
    ///
    /// # Returns
    /// One averaged gradient per distinct parameter, in order of first appearance, or an error if
    /// a parameter has no gradient or a gradient doesn't fit its parameter.
    pub fn average(towers: &[Vec<GradientEntry>]) -> Result<Vec<AveragedGradient>> {
        let mut params: Vec<(&ParameterHandle, Vec<&ArrayD<f32>>)> = Vec::new();
        let mut index: HashMap<&str, usize> = HashMap::new();

        for entry in towers.iter().flatten() {
            let idx = *index.entry(entry.param.name()).or_insert_with(|| {
                params.push((&entry.param, Vec::new()));
                params.len() - 1
            });

            if let Some(grad) = &entry.grad {
                if grad.shape() != entry.param.shape() {
                    return Err(OrchestratorError::GradientShapeMismatch {
                        name: entry.param.name().to_string(),
                        got: grad.shape().to_vec(),
                        expected: entry.param.shape().to_vec(),
                    });
                }

                params[idx].1.push(grad);
            }
        }

        params
            .into_par_iter()
            .map(|(param, grads)| {
                if grads.is_empty() {
                    return Err(OrchestratorError::NoGradientForParameter {
                        name: param.name().to_string(),
                    });
                }

                Ok(AveragedGradient {
                    param: param.clone(),
                    grad: mean(param.shape(), &grads),
                    contributors: grads.len(),
                })
            })
            .collect()
    }
}

/// Averages same shaped gradients into a standard layout array.
fn mean(shape: &[usize], grads: &[&ArrayD<f32>]) -> ArrayD<f32> {
    if let [grad] = grads {
        return grad.as_standard_layout().into_owned();
    }

    let k = grads.len() as f64;
    let mut out = ArrayD::zeros(IxDyn(shape));
    let mut elems: Vec<_> = grads.iter().map(|g| g.iter()).collect();
    let mut values = Vec::with_capacity(grads.len());

    // Logical iteration order is row major whatever the memory layout of each gradient.
    for o in out.iter_mut() {
        values.clear();
        values.extend(elems.iter_mut().filter_map(Iterator::next).map(|&v| v as f64));
        values.sort_by(f64::total_cmp);

        *o = (values.iter().sum::<f64>() / k) as f32;
    }

    out
}
