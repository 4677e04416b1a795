use ndarray::{Array2, ArrayView2, Zip};

use super::EPS;

/// The divergence of `N(mean, stddev²)` from the unit gaussian, summed per sample and averaged
/// over the rows: `0.5·Σ(mean² + stddev² − ln(EPS + stddev²) − 1) / rows`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GaussianKl;

impl GaussianKl {
    pub fn loss(&self, mean: ArrayView2<f32>, stddev: ArrayView2<f32>) -> f32 {
        let total = Zip::from(&mean).and(&stddev).fold(0., |acc, &m, &s| {
            let s2 = s * s;
            acc + 0.5 * (m * m + s2 - (EPS + s2).ln() - 1.)
        });

        total / mean.nrows().max(1) as f32
    }

    /// Returns the derivatives with respect to `mean` and `stddev`.
    pub fn loss_prime(
        &self,
        mean: ArrayView2<f32>,
        stddev: ArrayView2<f32>,
    ) -> (Array2<f32>, Array2<f32>) {
        let rows = mean.nrows().max(1) as f32;

        let d_mean = mean.mapv(|m| m / rows);
        let d_stddev = stddev.mapv(|s| (s - s / (EPS + s * s)) / rows);

        (d_mean, d_stddev)
    }
}
