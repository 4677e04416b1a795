use super::Result;

/// A `ParamGen` generates the initial values of a parameter when it's first created.
pub trait ParamGen {
    /// Should sample exactly one value per element of a parameter shaped `shape`.
    ///
    /// # Arguments
    /// * `shape` - The shape of the parameter being created.
    ///
    /// # Returns
    /// The values in row major order, or an error if the distribution can't be built for
    /// this shape.
    fn sample(&mut self, shape: &[usize]) -> Result<Vec<f32>>;
}

/// The fan-in and fan-out of a parameter, as used by variance scaling initializers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fans {
    pub fan_in: usize,
    pub fan_out: usize,
}

impl Fans {
    /// Computes the fans of a parameter from its shape.
    ///
    /// Vectors use their length for both fans, matrices are laid out `[inputs, outputs]` and
    /// higher ranks treat the leading dimensions as the receptive field.
    ///
    /// # Arguments
    /// * `shape` - The shape of the parameter.
    ///
    /// # Returns
    /// A new `Fans` instance.
    pub fn of(shape: &[usize]) -> Self {
        match shape {
            [] => Self {
                fan_in: 1,
                fan_out: 1,
            },
            [n] => Self {
                fan_in: *n,
                fan_out: *n,
            },
            [.., i, o] => {
                let receptive: usize = shape[..shape.len() - 2].iter().product();
                Self {
                    fan_in: i * receptive,
                    fan_out: o * receptive,
                }
            }
        }
    }
}
