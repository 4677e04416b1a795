use std::{
    error::Error,
    fmt::{self, Display},
};

use ndarray::ShapeError;
use parameter_server::{StoreErr, initialization::RandErr};

/// The result type used in the entire machine learning module.
pub type Result<T> = std::result::Result<T, MlErr>;

/// The machine learning module's error type.
#[derive(Debug)]
pub enum MlErr {
    /// A parameter request was rejected by the store.
    Store(StoreErr),
    /// An initializer couldn't be built from its spec.
    Rand(RandErr),
    /// A parameter couldn't be viewed with the dimensionality a layer expects.
    Shape(ShapeError),
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    /// A backward pass was given a trace recorded by a different module.
    TraceMismatch,
    EmptyBatch,
}

impl Display for MlErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MlErr::Store(e) => write!(f, "{e}"),
            MlErr::Rand(e) => write!(f, "invalid initializer: {e}"),
            MlErr::Shape(e) => write!(f, "invalid parameter shape: {e}"),
            MlErr::SizeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "There's a size mismatch in {what}, got {got} and expected {expected}"
            ),
            MlErr::TraceMismatch => {
                write!(f, "The given trace wasn't recorded by this module's forward pass")
            }
            MlErr::EmptyBatch => write!(f, "Can't run a pass over an empty batch"),
        }
    }
}

impl Error for MlErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MlErr::Store(e) => Some(e),
            MlErr::Rand(e) => Some(e),
            MlErr::Shape(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreErr> for MlErr {
    fn from(value: StoreErr) -> Self {
        Self::Store(value)
    }
}

impl From<RandErr> for MlErr {
    fn from(value: RandErr) -> Self {
        Self::Rand(value)
    }
}

impl From<ShapeError> for MlErr {
    fn from(value: ShapeError) -> Self {
        Self::Shape(value)
    }
}
