//! Layers, losses and the adversarial models a replica runs.
//!
//! Modules never own their parameters: they request them through a [`ParameterScope`] and keep
//! the returned handles, so a model built twice over the same store shares every value.

pub mod arch;
pub mod error;
mod grads;
pub mod models;
pub mod scope;

pub use error::{MlErr, Result};
pub use grads::GradSink;
pub use models::{Model, ModelPass};
pub use scope::ParameterScope;
