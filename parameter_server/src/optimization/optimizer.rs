use crate::storage::{Result, StoreErr};

/// Defines the strategy for updating model parameters based on calculated gradients.
///
/// An instance holds the slot state (velocities, moments) of exactly one parameter.
pub trait Optimizer: Send {
    /// Updates the provided slice of parameters using the averaged gradient.
    ///
    /// # Arguments
    /// * `grad` - The gradient of the parameter.
    /// * `params` - The parameter values to update.
    ///
    /// # Returns
    /// An error if there's a mismatch in the sizes of `grad` and `params`.
    fn update_params(&mut self, grad: &[f32], params: &mut [f32]) -> Result<()>;
}

/// Builds a fresh optimizer for a parameter holding the given amount of values.
pub type OptimizerFactory = Box<dyn Fn(usize) -> Box<dyn Optimizer> + Send + Sync>;

/// Checks that a gradient and its parameter have the same amount of values.
pub(super) fn check_sizes(grad: &[f32], params: &[f32]) -> Result<()> {
    if grad.len() != params.len() {
        return Err(StoreErr::SizeMismatch {
            what: "gradient".to_string(),
            got: grad.len(),
            expected: params.len(),
        });
    }

    Ok(())
}
