use ndarray::{Array2, ArrayView2};

use super::{NormUpdate, Trace, layers::Layer};
use crate::{GradSink, MlErr, Result};

/// A sequential module: information flows forward when computing an output and backward when
/// computing the *deltas* of its layers.
#[derive(Debug, Clone)]
pub struct Sequential {
    layers: Vec<Layer>,
}

impl Sequential {
    /// Creates a new `Sequential`.
    ///
    /// # Arguments
    /// * `layers` - The layers the sequential is composed of.
    ///
    /// # Returns
    /// A new `Sequential` instance.
    pub fn new<I>(layers: I) -> Self
    where
        I: IntoIterator<Item = Layer>,
    {
        Self {
            layers: layers.into_iter().collect(),
        }
    }

    /// Makes a forward pass through the module.
    ///
    /// # Arguments
    /// * `x` - The input rows.
    /// * `trace` - Where the values the backward pass needs are recorded.
    /// * `norm_updates` - Where batch normalization layers push their statistic updates.
    ///
    /// # Returns
    /// The output rows or an error if occurred.
    pub fn forward(
        &self,
        x: ArrayView2<f32>,
        trace: &mut Trace,
        norm_updates: &mut Vec<NormUpdate>,
    ) -> Result<Array2<f32>> {
        let mut x = x.to_owned();

        for layer in &self.layers {
            let (y, cache) = layer.forward(x, norm_updates)?;
            trace.push(cache);
            x = y;
        }

        Ok(x)
    }

    /// Makes a backward pass through the module.
    ///
    /// # Arguments
    /// * `trace` - The trace recorded by the forward pass being differentiated.
    /// * `d` - The delta of the loss with respect to the module's output.
    /// * `sink` - Where parameter gradients go, `None` to only propagate the delta.
    ///
    /// # Returns
    /// The delta of the loss with respect to the module's input.
    pub fn backward(
        &self,
        trace: &Trace,
        mut d: Array2<f32>,
        mut sink: Option<&mut GradSink>,
    ) -> Result<Array2<f32>> {
        if trace.len() != self.layers.len() {
            return Err(MlErr::TraceMismatch);
        }

        for (layer, cache) in self.layers.iter().zip(trace.caches()).rev() {
            d = layer.backward(cache, d, sink.as_deref_mut())?;
        }

        Ok(d)
    }
}
