use std::fmt;

use machine_learning::MlErr;
use parameter_server::{Partition, StoreErr};

/// All errors that can occur while building or running a train op.
#[derive(Debug)]
pub enum OrchestratorError {
    /// Invalid configuration, caught before any replica is built.
    InvalidConfig(String),
    /// A parameter request or update was rejected by the store.
    Store(StoreErr),
    /// A model failed to build or to run a pass.
    Ml(MlErr),
    /// A trainable parameter received no gradient from any replica.
    NoGradientForParameter { name: String },
    /// The batch rows can't be split evenly across the devices.
    DevicePartitionMismatch {
        rows: usize,
        n_devices: usize,
        batch_size_per_device: usize,
    },
    /// A replica reported a gradient whose shape differs from its parameter's.
    GradientShapeMismatch {
        name: String,
        got: Vec<usize>,
        expected: Vec<usize>,
    },
    /// A gradient was handed to the optimizer of a partition the parameter isn't in.
    PartitionViolation { name: String, partition: Partition },
    MissingOptimizer(Partition),
    DuplicateOptimizer(Partition),
    /// Replicas must be built in device order.
    ReplicaOutOfOrder { expected: usize, got: usize },
    /// The input batch doesn't have the configured sample shape.
    InputShapeMismatch { got: Vec<usize>, expected: Vec<usize> },
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            Self::Store(e) => write!(f, "parameter store error: {e}"),
            Self::Ml(e) => write!(f, "model error: {e}"),
            Self::NoGradientForParameter { name } => {
                write!(f, "no replica produced a gradient for {name}")
            }
            Self::DevicePartitionMismatch {
                rows,
                n_devices,
                batch_size_per_device,
            } => write!(
                f,
                "a batch of {rows} rows can't be split into {n_devices} slices of {batch_size_per_device}"
            ),
            Self::GradientShapeMismatch {
                name,
                got,
                expected,
            } => write!(
                f,
                "gradient of {name} has shape {got:?} but the parameter has shape {expected:?}"
            ),
            Self::PartitionViolation { name, partition } => {
                write!(f, "{name} isn't a trainable parameter of the {partition} partition")
            }
            Self::MissingOptimizer(partition) => {
                write!(f, "there's no optimizer for the {partition} partition")
            }
            Self::DuplicateOptimizer(partition) => {
                write!(f, "the {partition} partition has more than one optimizer")
            }
            Self::ReplicaOutOfOrder { expected, got } => {
                write!(f, "expected to build replica {expected} but got {got}")
            }
            Self::InputShapeMismatch { got, expected } => {
                write!(f, "input batch has shape {got:?}, expected {expected:?}")
            }
            Self::Io(e) => write!(f, "io error: {e}"),
            Self::Json(e) => write!(f, "json error: {e}"),
        }
    }
}

impl std::error::Error for OrchestratorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(e) => Some(e),
            Self::Ml(e) => Some(e),
            Self::Io(e) => Some(e),
            Self::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreErr> for OrchestratorError {
    fn from(e: StoreErr) -> Self {
        Self::Store(e)
    }
}

impl From<MlErr> for OrchestratorError {
    fn from(e: MlErr) -> Self {
        match e {
            MlErr::Store(e) => Self::Store(e),
            e => Self::Ml(e),
        }
    }
}

impl From<std::io::Error> for OrchestratorError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for OrchestratorError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

/// The result type used across the orchestrator.
pub type Result<T> = std::result::Result<T, OrchestratorError>;
