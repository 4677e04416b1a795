use std::{
    error::Error,
    fmt::{self, Display},
};

/// The specific result type for the storage module.
pub type Result<T> = std::result::Result<T, StoreErr>;

/// Error returned by the `ParameterStore` whenever a parameter is declared, reused or updated
/// in a way that would break the one-instance-per-name invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreErr {
    /// A parameter was created under a name that is already registered.
    ParameterRedefinition { name: String },
    /// A parameter was requested for reuse but it was never created.
    MissingParameter { name: String },
    /// A parameter was requested with a shape that differs from the registered one.
    DuplicateShapeMismatch {
        name: String,
        existing: Vec<usize>,
        requested: Vec<usize>,
    },
    /// A buffer doesn't have the amount of values its destination expects.
    SizeMismatch {
        what: String,
        got: usize,
        expected: usize,
    },
    /// The initializer failed to produce the values of a new parameter.
    Initialization { name: String, reason: String },
    /// The storage of a parameter or gradient isn't laid out contiguously.
    NonContiguous { name: String },
}

impl Display for StoreErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreErr::ParameterRedefinition { name } => {
                write!(f, "parameter {name} is already defined, it must be reused")
            }
            StoreErr::MissingParameter { name } => {
                write!(f, "parameter {name} can't be reused, it was never created")
            }
            StoreErr::DuplicateShapeMismatch {
                name,
                existing,
                requested,
            } => write!(
                f,
                "parameter {name} has shape {existing:?} but was requested with shape {requested:?}"
            ),
            StoreErr::SizeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "size mismatch for {what}: got {got} values and expected {expected}"
            ),
            StoreErr::Initialization { name, reason } => {
                write!(f, "failed to initialize parameter {name}: {reason}")
            }
            StoreErr::NonContiguous { name } => {
                write!(f, "the buffer of {name} is not contiguous in memory")
            }
        }
    }
}

impl Error for StoreErr {}
