use parameter_server::optimization::{
    Adam, GradientDescent, GradientDescentWithMomentum, Optimizer, OptimizerFactory,
};
use serde::{Deserialize, Serialize};

use crate::error::{OrchestratorError, Result};

/// The optimizer every partition is trained with, each partition gets its own instance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerConfig {
    Adam {
        learning_rate: f32,
        beta1: f32,
        beta2: f32,
        epsilon: f32,
    },
    GradientDescent {
        learning_rate: f32,
    },
    GradientDescentWithMomentum {
        learning_rate: f32,
        momentum: f32,
    },
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self::Adam {
            learning_rate: 2e-4,
            beta1: 0.5,
            beta2: 0.999,
            epsilon: 1e-8,
        }
    }
}

impl OptimizerConfig {
    pub fn learning_rate(&self) -> f32 {
        match *self {
            Self::Adam { learning_rate, .. }
            | Self::GradientDescent { learning_rate }
            | Self::GradientDescentWithMomentum { learning_rate, .. } => learning_rate,
        }
    }

    /// Returns a factory building one optimizer slot per parameter.
    pub fn factory(self) -> OptimizerFactory {
        match self {
            Self::Adam {
                learning_rate,
                beta1,
                beta2,
                epsilon,
            } => Box::new(move |len: usize| -> Box<dyn Optimizer> {
                Box::new(Adam::new(len, learning_rate, beta1, beta2, epsilon))
            }),
            Self::GradientDescent { learning_rate } => {
                Box::new(move |_: usize| -> Box<dyn Optimizer> {
                    Box::new(GradientDescent::new(learning_rate))
                })
            }
            Self::GradientDescentWithMomentum {
                learning_rate,
                momentum,
            } => Box::new(move |len: usize| -> Box<dyn Optimizer> {
                Box::new(GradientDescentWithMomentum::new(len, learning_rate, momentum))
            }),
        }
    }

    pub(super) fn validate(&self) -> Result<()> {
        let lr = self.learning_rate();
        if !lr.is_finite() || lr <= 0. {
            return Err(OrchestratorError::InvalidConfig(format!(
                "learning_rate must be positive and finite, got {lr}"
            )));
        }

        let unit = |name: &str, value: f32| {
            if (0. ..1.).contains(&value) {
                Ok(())
            } else {
                Err(OrchestratorError::InvalidConfig(format!(
                    "{name} must be in [0, 1), got {value}"
                )))
            }
        };

        match *self {
            Self::Adam {
                beta1,
                beta2,
                epsilon,
                ..
            } => {
                unit("beta1", beta1)?;
                unit("beta2", beta2)?;
                if epsilon <= 0. {
                    return Err(OrchestratorError::InvalidConfig(
                        "epsilon must be greater than 0".into(),
                    ));
                }
            }
            Self::GradientDescentWithMomentum { momentum, .. } => unit("momentum", momentum)?,
            Self::GradientDescent { .. } => {}
        }

        Ok(())
    }
}
