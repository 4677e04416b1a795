use std::{cell::RefCell, rc::Rc};

use rand::Rng;
use rand_distr::{Distribution, Normal, Uniform};

use super::{Fans, ParamGen, RandErr, Result};

/// A parameter generator that follows a fixed probabilistic distribution.
pub struct RandParamGen<R: Rng, D: Distribution<f32>> {
    rng: Rc<RefCell<R>>,
    distribution: D,
}

impl<R: Rng, D: Distribution<f32>> RandParamGen<R, D> {
    /// Creates a new `RandParamGen` parameter generator.
    ///
    /// # Arguments
    /// * `rng` - A random number generator.
    /// * `distribution` - The distribution to sample the random numbers from.
    ///
    /// # Returns
    /// A new `RandParamGen` instance.
    pub fn new(rng: Rc<RefCell<R>>, distribution: D) -> Self {
        Self { rng, distribution }
    }
}

impl<R: Rng> RandParamGen<R, Uniform<f32>> {
    /// Creates a new `RandParamGen` parameter generator with a uniform distribution.
    ///
    /// # Arguments
    /// * `rng` - A random number generator.
    /// * `low` - The inclusive lower limit.
    /// * `high` - The exclusive upper limit.
    ///
    /// # Returns
    /// An error if the range is invalid (low >= high).
    pub fn uniform(rng: Rc<RefCell<R>>, low: f32, high: f32) -> Result<Self> {
        let distribution =
            Uniform::new(low, high).map_err(|cause| RandErr::Uniform { low, high, cause })?;

        Ok(Self::new(rng, distribution))
    }
}

impl<R: Rng> RandParamGen<R, Normal<f32>> {
    /// Creates a new `RandParamGen` parameter generator with a normal distribution.
    ///
    /// # Arguments
    /// * `rng` - A random number generator.
    /// * `mean` - The mean of the distribution.
    /// * `std_dev` - The standard deviation of the distribution.
    ///
    /// # Returns
    /// An error if `std_dev` is not finite (Nan or infinite).
    pub fn normal(rng: Rc<RefCell<R>>, mean: f32, std_dev: f32) -> Result<Self> {
        let distribution = Normal::new(mean, std_dev).map_err(|cause| RandErr::Normal {
            mean,
            std_dev,
            cause,
        })?;

        Ok(Self::new(rng, distribution))
    }
}

impl<R: Rng, D: Distribution<f32>> ParamGen for RandParamGen<R, D> {
    fn sample(&mut self, shape: &[usize]) -> Result<Vec<f32>> {
        let len = shape.iter().product();
        let mut rng = self.rng.borrow_mut();
        Ok((0..len).map(|_| self.distribution.sample(&mut *rng)).collect())
    }
}

/// The variance scaling schemes a `FanScaledParamGen` can follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanScaling {
    /// Normal with `std_dev = sqrt(2 / fan_in)`.
    Kaiming,
    /// Normal with `std_dev = sqrt(2 / (fan_in + fan_out))`.
    Xavier,
    /// Uniform in `±sqrt(6 / (fan_in + fan_out))`.
    XavierUniform,
    /// Normal with `std_dev = sqrt(1 / fan_in)`.
    Lecun,
    /// Uniform in `±sqrt(3 / fan_in)`.
    LecunUniform,
}

/// A parameter generator whose distribution is scaled by the fans of each parameter.
///
/// A single instance serves every parameter of a model, the distribution is resolved from the
/// shape on each `sample` call.
pub struct FanScaledParamGen<R: Rng> {
    rng: Rc<RefCell<R>>,
    scaling: FanScaling,
}

impl<R: Rng> FanScaledParamGen<R> {
    /// Creates a new `FanScaledParamGen` parameter generator.
    ///
    /// # Arguments
    /// * `rng` - A random number generator.
    /// * `scaling` - The variance scaling scheme.
    ///
    /// # Returns
    /// A new `FanScaledParamGen` instance.
    pub fn new(rng: Rc<RefCell<R>>, scaling: FanScaling) -> Self {
        Self { rng, scaling }
    }
}

impl<R: Rng> ParamGen for FanScaledParamGen<R> {
    fn sample(&mut self, shape: &[usize]) -> Result<Vec<f32>> {
        let Fans { fan_in, fan_out } = Fans::of(shape);
        if fan_in == 0 {
            return Err(RandErr::EmptyFan {
                shape: shape.to_vec(),
            });
        }

        let (fan_in, fan_sum) = (fan_in as f32, (fan_in + fan_out) as f32);
        let rng = Rc::clone(&self.rng);

        match self.scaling {
            FanScaling::Kaiming => RandParamGen::normal(rng, 0., (2. / fan_in).sqrt())?.sample(shape),
            FanScaling::Xavier => RandParamGen::normal(rng, 0., (2. / fan_sum).sqrt())?.sample(shape),
            FanScaling::Lecun => RandParamGen::normal(rng, 0., (1. / fan_in).sqrt())?.sample(shape),
            FanScaling::XavierUniform => {
                let range = (6. / fan_sum).sqrt();
                RandParamGen::uniform(rng, -range, range)?.sample(shape)
            }
            FanScaling::LecunUniform => {
                let range = (3. / fan_in).sqrt();
                RandParamGen::uniform(rng, -range, range)?.sample(shape)
            }
        }
    }
}
