use std::{fs, path::Path};

use machine_learning::models::{BatchNormSpec, InitSpec, ModelDims, ModelSpec};
use serde::{Deserialize, Serialize};

use super::OptimizerConfig;
use crate::error::{OrchestratorError, Result};

/// The shape of one input sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageConfig {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
}

impl ImageConfig {
    /// Returns the amount of values of one flattened sample.
    pub fn features(&self) -> usize {
        self.height * self.width * self.channels
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            height: 8,
            width: 8,
            channels: 1,
        }
    }
}

/// Everything needed to build and run a train op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub n_devices: usize,
    pub batch_size_per_device: usize,
    pub latent_size: usize,
    pub image: ImageConfig,
    pub model: ModelSpec,
    pub optimizer: OptimizerConfig,
    pub initializer: InitSpec,
    pub batch_norm: BatchNormSpec,
    /// The amount of minibatches the binary trains for.
    pub steps: usize,
    /// Seeds the initializers and every replica's latent noise.
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            n_devices: 2,
            batch_size_per_device: 8,
            latent_size: 16,
            image: ImageConfig::default(),
            model: ModelSpec::default(),
            optimizer: OptimizerConfig::default(),
            initializer: InitSpec::default(),
            batch_norm: BatchNormSpec::default(),
            steps: 100,
            seed: 42,
        }
    }
}

impl TrainingConfig {
    /// Parses a JSON config, missing fields take their default values.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses a JSON config file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Returns the amount of rows of a global batch.
    pub fn global_batch_size(&self) -> usize {
        self.n_devices * self.batch_size_per_device
    }

    pub fn dims(&self) -> ModelDims {
        ModelDims {
            features: self.image.features(),
            latent_size: self.latent_size,
        }
    }

    /// Checks the config before anything is built.
    ///
    /// # Returns
    /// An `InvalidConfig` error describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("n_devices", self.n_devices),
            ("batch_size_per_device", self.batch_size_per_device),
            ("latent_size", self.latent_size),
            ("image.height", self.image.height),
            ("image.width", self.image.width),
            ("image.channels", self.image.channels),
        ];

        for (name, value) in positive {
            if value == 0 {
                return Err(OrchestratorError::InvalidConfig(format!(
                    "{name} must be greater than 0"
                )));
            }
        }

        self.validate_model()?;
        self.optimizer.validate()?;

        let BatchNormSpec { decay, epsilon } = self.batch_norm;
        if !(0. ..1.).contains(&decay) {
            return Err(OrchestratorError::InvalidConfig(format!(
                "batch_norm.decay must be in [0, 1), got {decay}"
            )));
        }

        if epsilon <= 0. {
            return Err(OrchestratorError::InvalidConfig(format!(
                "batch_norm.epsilon must be greater than 0, got {epsilon}"
            )));
        }

        Ok(())
    }

    fn validate_model(&self) -> Result<()> {
        let (modules, outputs): (Vec<(&str, &[usize])>, usize) = match &self.model {
            ModelSpec::Gan {
                generator,
                discriminator,
                discriminator_outputs,
            } => (
                vec![
                    ("generator", generator.as_slice()),
                    ("discriminator", discriminator.as_slice()),
                ],
                *discriminator_outputs,
            ),
            ModelSpec::VaeGan {
                encoder,
                decoder,
                discriminator,
                discriminator_outputs,
            } => (
                vec![
                    ("encoder", encoder.as_slice()),
                    ("decoder", decoder.as_slice()),
                    ("discriminator", discriminator.as_slice()),
                ],
                *discriminator_outputs,
            ),
        };

        if outputs == 0 {
            return Err(OrchestratorError::InvalidConfig(
                "discriminator_outputs must be greater than 0".into(),
            ));
        }

        for (module, widths) in modules {
            if let Some(i) = widths.iter().position(|&w| w == 0) {
                return Err(OrchestratorError::InvalidConfig(format!(
                    "{module} layer {i} has a width of 0"
                )));
            }
        }

        Ok(())
    }
}
