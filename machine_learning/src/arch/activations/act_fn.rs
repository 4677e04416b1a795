use ndarray::{Array2, ArrayView2};

/// The element-wise activation functions a model can interleave between its layers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActFn {
    Relu,
    LeakyRelu { leak: f32 },
    Tanh,
    Sigmoid,
}
use ActFn::*;

impl ActFn {
    /// The leaky ReLU every discriminator and encoder block uses.
    pub const LRELU: ActFn = LeakyRelu { leak: 0.2 };

    pub fn f(&self, z: f32) -> f32 {
        match *self {
            Relu => z.max(0.),
            LeakyRelu { leak } => {
                if z > 0. {
                    z
                } else {
                    leak * z
                }
            }
            Tanh => z.tanh(),
            Sigmoid => 1. / (1. + (-z).exp()),
        }
    }

    pub fn df(&self, z: f32) -> f32 {
        match *self {
            Relu => {
                if z > 0. {
                    1.
                } else {
                    0.
                }
            }
            LeakyRelu { leak } => {
                if z > 0. {
                    1.
                } else {
                    leak
                }
            }
            Tanh => 1. - z.tanh().powi(2),
            Sigmoid => {
                let s = self.f(z);
                s * (1. - s)
            }
        }
    }

    /// Applies the activation to every element of `z`.
    pub fn forward(&self, z: ArrayView2<f32>) -> Array2<f32> {
        z.mapv(|z| self.f(z))
    }

    /// Scales the incoming delta by the derivative at the pre-activation values `z`.
    pub fn backward(&self, z: ArrayView2<f32>, mut d: Array2<f32>) -> Array2<f32> {
        d.zip_mut_with(&z, |d, &z| *d *= self.df(z));
        d
    }
}
