use ndarray::{Array2, ArrayView2};

pub trait LossFn {
    /// Computes the scalar loss of a prediction against its target.
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> f32;

    /// Computes the derivative of `loss` with respect to every element of `y_pred`.
    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32>;
}
