use std::{cell::RefCell, rc::Rc};

use parameter_server::{
    Partition,
    initialization::{ConstParamGen, FanScaledParamGen, FanScaling, ParamGen, RandParamGen},
};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::Result;

/// The topology of a model.
///
/// Every list holds the widths of the hidden dense blocks of one module, the input and output
/// widths follow from the data and the latent size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelSpec {
    Gan {
        generator: Vec<usize>,
        discriminator: Vec<usize>,
        discriminator_outputs: usize,
    },
    VaeGan {
        encoder: Vec<usize>,
        decoder: Vec<usize>,
        discriminator: Vec<usize>,
        discriminator_outputs: usize,
    },
}

impl ModelSpec {
    pub const GAN_PARTITIONS: &'static [Partition] = &[Partition::Generator, Partition::Discriminator];

    pub const VAE_GAN_PARTITIONS: &'static [Partition] = &[
        Partition::Encoder,
        Partition::Latent,
        Partition::Decoder,
        Partition::Discriminator,
    ];

    /// Returns the parameter partitions of the model this spec describes.
    pub fn partitions(&self) -> &'static [Partition] {
        match self {
            ModelSpec::Gan { .. } => Self::GAN_PARTITIONS,
            ModelSpec::VaeGan { .. } => Self::VAE_GAN_PARTITIONS,
        }
    }
}

impl Default for ModelSpec {
    fn default() -> Self {
        Self::Gan {
            generator: vec![128, 256],
            discriminator: vec![256, 128],
            discriminator_outputs: 1,
        }
    }
}

/// The widths a model is built around.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelDims {
    /// The amount of values of one flattened input sample.
    pub features: usize,
    pub latent_size: usize,
}

/// The initializer of every trainable weight and bias.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitSpec {
    Const {
        value: f32,
    },
    Uniform {
        low: f32,
        high: f32,
    },
    Normal {
        mean: f32,
        std_dev: f32,
    },
    #[default]
    Kaiming,
    Xavier,
    XavierUniform,
    Lecun,
    LecunUniform,
}

impl InitSpec {
    /// Builds the parameter generator this spec describes.
    ///
    /// # Arguments
    /// * `rng` - The random number generator shared by every random initializer.
    ///
    /// # Returns
    /// The generator or an error if the distribution parameters are invalid.
    pub fn param_gen<R: Rng + 'static>(self, rng: Rc<RefCell<R>>) -> Result<Box<dyn ParamGen>> {
        let param_gen: Box<dyn ParamGen> = match self {
            InitSpec::Const { value } => Box::new(ConstParamGen::new(value)),
            InitSpec::Uniform { low, high } => Box::new(RandParamGen::uniform(rng, low, high)?),
            InitSpec::Normal { mean, std_dev } => {
                Box::new(RandParamGen::normal(rng, mean, std_dev)?)
            }
            InitSpec::Kaiming => Box::new(FanScaledParamGen::new(rng, FanScaling::Kaiming)),
            InitSpec::Xavier => Box::new(FanScaledParamGen::new(rng, FanScaling::Xavier)),
            InitSpec::XavierUniform => {
                Box::new(FanScaledParamGen::new(rng, FanScaling::XavierUniform))
            }
            InitSpec::Lecun => Box::new(FanScaledParamGen::new(rng, FanScaling::Lecun)),
            InitSpec::LecunUniform => {
                Box::new(FanScaledParamGen::new(rng, FanScaling::LecunUniform))
            }
        };

        Ok(param_gen)
    }
}

/// The hyperparameters shared by every batch normalization layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchNormSpec {
    /// The weight the running statistics keep on each update.
    pub decay: f32,
    /// Added to the variance before normalizing.
    pub epsilon: f32,
}

impl Default for BatchNormSpec {
    fn default() -> Self {
        Self {
            decay: 0.999,
            epsilon: 0.001,
        }
    }
}
