use ndarray::{Array2, ArrayView2, Axis, Ix1, Ix2};
use parameter_server::ParameterHandle;

use crate::{GradSink, MlErr, Result, scope::ParameterScope};

/// A fully connected layer, `y = x·w + b` with `w` shaped `[inputs, outputs]`.
#[derive(Debug, Clone)]
pub struct Dense {
    dim: (usize, usize),
    w: ParameterHandle,
    b: ParameterHandle,
}

impl Dense {
    /// Creates a new `Dense` layer requesting its parameters under `scope/name`.
    ///
    /// # Arguments
    /// * `scope` - The scope the parameters are requested through.
    /// * `name` - The name of the layer inside `scope`.
    /// * `dim` - The amount of inputs and outputs.
    ///
    /// # Returns
    /// A new `Dense` instance or the store's error.
    pub fn new(scope: &mut ParameterScope, name: &str, dim: (usize, usize)) -> Result<Self> {
        let mut scope = scope.nested(name);
        let w = scope.trainable("w", &[dim.0, dim.1])?;
        let b = scope.trainable("b", &[dim.1])?;

        Ok(Self { dim, w, b })
    }

    pub fn forward(&self, x: ArrayView2<f32>) -> Result<Array2<f32>> {
        if x.ncols() != self.dim.0 {
            return Err(MlErr::SizeMismatch {
                what: "dense input",
                got: x.ncols(),
                expected: self.dim.0,
            });
        }

        let w = self.w.read();
        let b = self.b.read();
        let w = w.view().into_dimensionality::<Ix2>()?;
        let b = b.view().into_dimensionality::<Ix1>()?;

        Ok(x.dot(&w) + &b)
    }

    /// Propagates `d` back to the layer's input.
    ///
    /// # Arguments
    /// * `x` - The input this layer was applied to.
    /// * `d` - The delta of the loss with respect to the output.
    /// * `sink` - Receives `dw = xᵀ·d` and `db = Σ d` when present.
    ///
    /// # Returns
    /// The delta with respect to the input, `d·wᵀ`.
    pub fn backward(
        &self,
        x: ArrayView2<f32>,
        d: ArrayView2<f32>,
        sink: Option<&mut GradSink>,
    ) -> Result<Array2<f32>> {
        if let Some(sink) = sink {
            sink.accumulate(&self.w, x.t().dot(&d).into_dyn())?;
            sink.accumulate(&self.b, d.sum_axis(Axis(0)).into_dyn())?;
        }

        let w = self.w.read();
        let w = w.view().into_dimensionality::<Ix2>()?;

        Ok(d.dot(&w.t()))
    }
}
