use ndarray::Array2;

use super::{BatchNorm, BatchNormCache, Dense};
use crate::{
    GradSink, MlErr, Result,
    arch::{NormUpdate, activations::ActFn},
};

#[derive(Debug, Clone)]
pub enum Layer {
    Dense(Dense),
    BatchNorm(BatchNorm),
    Activation(ActFn),
}

/// The forward values a layer records for its backward pass.
#[derive(Debug, Clone)]
pub enum LayerCache {
    /// The layer's input.
    Dense(Array2<f32>),
    BatchNorm(BatchNormCache),
    /// The pre-activation values.
    Activation(Array2<f32>),
}

impl Layer {
    pub fn forward(
        &self,
        x: Array2<f32>,
        norm_updates: &mut Vec<NormUpdate>,
    ) -> Result<(Array2<f32>, LayerCache)> {
        let out = match self {
            Layer::Dense(l) => {
                let y = l.forward(x.view())?;
                (y, LayerCache::Dense(x))
            }
            Layer::BatchNorm(l) => {
                let (y, cache) = l.forward(x.view(), norm_updates)?;
                (y, LayerCache::BatchNorm(cache))
            }
            Layer::Activation(act_fn) => {
                let y = act_fn.forward(x.view());
                (y, LayerCache::Activation(x))
            }
        };

        Ok(out)
    }

    pub fn backward(
        &self,
        cache: &LayerCache,
        d: Array2<f32>,
        sink: Option<&mut GradSink>,
    ) -> Result<Array2<f32>> {
        match (self, cache) {
            (Layer::Dense(l), LayerCache::Dense(x)) => l.backward(x.view(), d.view(), sink),
            (Layer::BatchNorm(l), LayerCache::BatchNorm(cache)) => l.backward(cache, d, sink),
            (Layer::Activation(act_fn), LayerCache::Activation(z)) => {
                Ok(act_fn.backward(z.view(), d))
            }
            _ => Err(MlErr::TraceMismatch),
        }
    }
}
