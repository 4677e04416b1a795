pub mod activations;
pub mod layers;
pub mod loss;
mod sequential;
mod trace;

pub use sequential::Sequential;
pub use trace::{NormUpdate, Trace};
