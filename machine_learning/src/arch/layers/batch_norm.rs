use ndarray::{Array1, Array2, ArrayView2, Axis, Ix1};
use parameter_server::ParameterHandle;

use crate::{
    GradSink, MlErr, Result, arch::NormUpdate, models::BatchNormSpec, scope::ParameterScope,
};

/// Batch normalization over the rows of a batch, with a learned scale and shift.
///
/// Forward passes always normalize with the batch statistics and emit one `NormUpdate` per
/// running statistic.
#[derive(Debug, Clone)]
pub struct BatchNorm {
    features: usize,
    spec: BatchNormSpec,
    gamma: ParameterHandle,
    beta: ParameterHandle,
    moving_mean: ParameterHandle,
    moving_variance: ParameterHandle,
}

/// What the backward pass of a `BatchNorm` needs from its forward pass.
#[derive(Debug, Clone)]
pub struct BatchNormCache {
    xhat: Array2<f32>,
    inv_std: Array1<f32>,
}

impl BatchNorm {
    /// Creates a new `BatchNorm` layer requesting its parameters under `scope/name`.
    ///
    /// # Arguments
    /// * `scope` - The scope the parameters are requested through.
    /// * `name` - The name of the layer inside `scope`.
    /// * `features` - The width of the normalized rows.
    /// * `spec` - The moving average decay and the variance epsilon.
    ///
    /// # Returns
    /// A new `BatchNorm` instance or the store's error.
    pub fn new(
        scope: &mut ParameterScope,
        name: &str,
        features: usize,
        spec: BatchNormSpec,
    ) -> Result<Self> {
        let mut scope = scope.nested(name);
        let shape = [features];

        Ok(Self {
            features,
            spec,
            gamma: scope.trainable_const("gamma", &shape, 1.)?,
            beta: scope.trainable_const("beta", &shape, 0.)?,
            moving_mean: scope.statistic("moving_mean", &shape, 0.)?,
            moving_variance: scope.statistic("moving_variance", &shape, 1.)?,
        })
    }

    pub fn forward(
        &self,
        x: ArrayView2<f32>,
        norm_updates: &mut Vec<NormUpdate>,
    ) -> Result<(Array2<f32>, BatchNormCache)> {
        if x.ncols() != self.features {
            return Err(MlErr::SizeMismatch {
                what: "batch norm input",
                got: x.ncols(),
                expected: self.features,
            });
        }

        let mean = x.mean_axis(Axis(0)).ok_or(MlErr::EmptyBatch)?;
        let centered = &x - &mean;
        let variance = centered
            .mapv(|c| c * c)
            .mean_axis(Axis(0))
            .ok_or(MlErr::EmptyBatch)?;

        let eps = self.spec.epsilon;
        let inv_std = variance.mapv(|v| 1. / (v + eps).sqrt());
        let xhat = centered * &inv_std;

        let gamma = self.gamma.read();
        let beta = self.beta.read();
        let gamma = gamma.view().into_dimensionality::<Ix1>()?;
        let beta = beta.view().into_dimensionality::<Ix1>()?;
        let y = &xhat * &gamma + &beta;

        let decay = self.spec.decay;
        norm_updates.push(NormUpdate::new(self.moving_mean.clone(), mean, decay));
        norm_updates.push(NormUpdate::new(self.moving_variance.clone(), variance, decay));

        Ok((y, BatchNormCache { xhat, inv_std }))
    }

    /// Propagates `d` back through the normalization.
    ///
    /// `dx = inv_std / n · (n·dxhat − Σ dxhat − xhat·Σ(dxhat·xhat))` with `dxhat = d·gamma`.
    pub fn backward(
        &self,
        cache: &BatchNormCache,
        d: Array2<f32>,
        sink: Option<&mut GradSink>,
    ) -> Result<Array2<f32>> {
        let BatchNormCache { xhat, inv_std } = cache;
        let n = d.nrows() as f32;

        if let Some(sink) = sink {
            sink.accumulate(&self.gamma, (&d * xhat).sum_axis(Axis(0)).into_dyn())?;
            sink.accumulate(&self.beta, d.sum_axis(Axis(0)).into_dyn())?;
        }

        let gamma = self.gamma.read();
        let gamma = gamma.view().into_dimensionality::<Ix1>()?;

        let dxhat = d * &gamma;
        let sum_dxhat = dxhat.sum_axis(Axis(0));
        let sum_dxhat_xhat = (&dxhat * xhat).sum_axis(Axis(0));

        let dx = (dxhat * n - &sum_dxhat - xhat * &sum_dxhat_xhat) * inv_std / n;

        Ok(dx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parameter_server::{ParameterStore, ReuseMode, initialization::ConstParamGen};

    fn layer(store: &ParameterStore) -> BatchNorm {
        let mut param_gen = ConstParamGen::new(0.);
        let mut scope = ParameterScope::root(store, ReuseMode::Create, &mut param_gen);
        BatchNorm::new(&mut scope, "generator/bn", 2, BatchNormSpec::default()).unwrap()
    }

    fn input() -> Array2<f32> {
        ndarray::arr2(&[[1., -2.], [3., 0.5], [-1., 4.], [0.5, 1.]])
    }

    #[test]
    fn forward_normalizes_each_feature() {
        let store = ParameterStore::new();
        let bn = layer(&store);
        let mut updates = Vec::new();

        let (y, _) = bn.forward(input().view(), &mut updates).unwrap();

        for column in y.columns() {
            let mean = column.mean().unwrap();
            let var = column.mapv(|v| (v - mean).powi(2)).mean().unwrap();
            assert!(mean.abs() < 1e-5);
            assert!((var - 1.).abs() < 1e-2);
        }

        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].stat().name(), "generator/bn/moving_mean");
        assert!((updates[0].value()[0] - 0.875).abs() < 1e-6);
    }

    #[test]
    fn statistics_are_not_trainable() {
        let store = ParameterStore::new();
        layer(&store);

        let names: Vec<_> = store
            .trainable(parameter_server::Partition::Generator)
            .iter()
            .map(|p| p.name().to_string())
            .collect();

        assert_eq!(names, ["generator/bn/gamma", "generator/bn/beta"]);
        assert_eq!(store.len(), 4);
    }

    #[test]
    fn backward_matches_finite_differences() {
        let store = ParameterStore::new();
        let bn = layer(&store);
        let x = input();
        let weights = ndarray::arr2(&[[0.3, -1.], [2., 0.1], [-0.7, 0.4], [1., 1.5]]);

        // loss = Σ weights · y, so dloss/dy = weights.
        let loss = |x: &Array2<f32>| {
            let (y, _) = bn.forward(x.view(), &mut Vec::new()).unwrap();
            (&y * &weights).sum()
        };

        let (_, cache) = bn.forward(x.view(), &mut Vec::new()).unwrap();
        let mut sink = GradSink::new();
        let dx = bn.backward(&cache, weights.clone(), Some(&mut sink)).unwrap();

        let h = 1e-2;
        for ((i, j), analytic) in dx.indexed_iter() {
            let mut plus = x.clone();
            let mut minus = x.clone();
            plus[[i, j]] += h;
            minus[[i, j]] -= h;

            let numeric = (loss(&plus) - loss(&minus)) / (2. * h);
            assert!(
                (numeric - analytic).abs() < 2e-2,
                "({i}, {j}): {numeric} vs {analytic}"
            );
        }

        assert_eq!(sink.len(), 2);
    }
}
