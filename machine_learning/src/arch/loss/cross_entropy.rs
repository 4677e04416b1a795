use ndarray::{Array2, ArrayView2, Zip};

use super::{EPS, LossFn};

/// How the element-wise losses are reduced to a scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduction {
    /// The mean over every element.
    Mean,
    /// The sum over each row, averaged over the rows.
    SumPerSample,
}

/// Binary cross-entropy of probabilities against targets in `[0, 1]`.
///
/// With `Reduction::Mean` and constant targets this gives the adversarial losses:
/// `g_loss = bce(d_fake, 1)` and `d_loss = bce(d_real, 1) + bce(d_fake, 0)`.
#[derive(Debug, Clone, Copy)]
pub struct BinaryCrossEntropy {
    reduction: Reduction,
}

impl BinaryCrossEntropy {
    pub fn new(reduction: Reduction) -> Self {
        Self { reduction }
    }

    pub fn mean() -> Self {
        Self::new(Reduction::Mean)
    }

    pub fn sum_per_sample() -> Self {
        Self::new(Reduction::SumPerSample)
    }

    fn count(&self, y_pred: &ArrayView2<f32>) -> f32 {
        match self.reduction {
            Reduction::Mean => y_pred.len() as f32,
            Reduction::SumPerSample => y_pred.nrows() as f32,
        }
    }
}

impl LossFn for BinaryCrossEntropy {
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> f32 {
        let total = Zip::from(&y_pred).and(&y).fold(0., |acc, &p, &y| {
            acc - (y * (p + EPS).ln() + (1. - y) * (1. - p + EPS).ln())
        });

        total / self.count(&y_pred)
    }

    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32> {
        let count = self.count(&y_pred);

        Zip::from(&y_pred)
            .and(&y)
            .map_collect(|&p, &y| (-y / (p + EPS) + (1. - y) / (1. - p + EPS)) / count)
    }
}
