mod cross_entropy;
mod gaussian_kl;
mod loss_fn;

pub use cross_entropy::{BinaryCrossEntropy, Reduction};
pub use gaussian_kl::GaussianKl;
pub use loss_fn::LossFn;

/// Added inside every logarithm so saturated probabilities stay finite.
pub const EPS: f32 = 1e-8;
