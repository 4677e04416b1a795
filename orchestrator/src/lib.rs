//! Replicates an adversarial model across devices and trains it with one synchronized update
//! per minibatch.
//!
//! Every replica shares the parameters of a single [`ParameterStore`]. Per minibatch the replicas
//! run concurrently over their slices of the batch, the [`LossCollector`] and the
//! [`GradientAggregator`] combine what they produced, and the [`TrainStepCoordinator`] commits
//! the averaged gradients and the retained normalization updates as one step.
//!
//! [`ParameterStore`]: parameter_server::ParameterStore

pub mod aggregation;
pub mod collector;
pub mod configs;
pub mod error;
pub mod partition;
pub mod replica;
pub mod step;
pub mod summary;
mod train_op;

pub use aggregation::{AveragedGradient, GradientAggregator};
pub use collector::LossCollector;
pub use error::{OrchestratorError, Result};
pub use partition::BatchPartition;
pub use replica::{GradientEntry, Replica, ReplicaBuilder, ReplicaPass};
pub use step::{TrainStep, TrainStepCoordinator};
pub use summary::{Histogram, Summary};
pub use train_op::TrainOp;
