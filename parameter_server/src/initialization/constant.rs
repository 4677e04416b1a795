use super::{ParamGen, Result};

/// A parameter generator that fills every parameter with the same value.
///
/// Used for biases, normalization scales and offsets, and deterministic tests.
#[derive(Debug, Clone, Copy)]
pub struct ConstParamGen {
    value: f32,
}

impl ConstParamGen {
    /// Creates a new `ConstParamGen` parameter generator.
    ///
    /// # Arguments
    /// * `value` - The value to always generate.
    ///
    /// # Returns
    /// A new `ConstParamGen` instance.
    pub fn new(value: f32) -> Self {
        Self { value }
    }
}

impl ParamGen for ConstParamGen {
    fn sample(&mut self, shape: &[usize]) -> Result<Vec<f32>> {
        let len = shape.iter().product();
        Ok(vec![self.value; len])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_the_whole_shape() {
        let mut param_gen = ConstParamGen::new(0.5);

        assert_eq!(param_gen.sample(&[2, 3]).unwrap(), vec![0.5; 6]);
        assert_eq!(param_gen.sample(&[4]).unwrap(), vec![0.5; 4]);
    }

    #[test]
    fn empty_shape_dimension() {
        let mut param_gen = ConstParamGen::new(1.);
        assert!(param_gen.sample(&[0, 3]).unwrap().is_empty());
    }
}
