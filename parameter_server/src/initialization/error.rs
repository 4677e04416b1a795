use std::{error::Error, fmt};

use rand_distr::{NormalError, uniform::Error as UniformError};

/// The result type of every parameter generator.
pub type Result<T> = std::result::Result<T, RandErr>;

/// Why an initializer can't produce values.
#[derive(Debug, Clone, PartialEq)]
pub enum RandErr {
    /// The standard deviation isn't finite or is negative.
    Normal {
        mean: f32,
        std_dev: f32,
        cause: NormalError,
    },
    /// The range is empty or not finite.
    Uniform {
        low: f32,
        high: f32,
        cause: UniformError,
    },
    /// A fan scaled initializer was asked for a parameter without inputs.
    EmptyFan { shape: Vec<usize> },
}

impl fmt::Display for RandErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal {
                mean,
                std_dev,
                cause,
            } => write!(f, "invalid normal initializer N({mean}, {std_dev}): {cause}"),
            Self::Uniform { low, high, cause } => {
                write!(f, "invalid uniform initializer U({low}, {high}): {cause}")
            }
            Self::EmptyFan { shape } => {
                write!(f, "can't scale an initializer by the fans of shape {shape:?}")
            }
        }
    }
}

impl Error for RandErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Normal { cause, .. } => Some(cause),
            Self::Uniform { cause, .. } => Some(cause),
            Self::EmptyFan { .. } => None,
        }
    }
}
