mod optimizer;
mod training;

pub use optimizer::OptimizerConfig;
pub use training::{ImageConfig, TrainingConfig};

pub use machine_learning::models::{BatchNormSpec, InitSpec, ModelSpec};
