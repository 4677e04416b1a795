use std::collections::BTreeMap;

use ndarray::{Array2, ArrayView2};
use rand::Rng;

use super::{BatchNormSpec, ModelDims, ModelPass, blocks, check_input, standard_normal};
use crate::{
    GradSink, Result,
    arch::{
        Sequential, Trace,
        loss::{BinaryCrossEntropy, LossFn},
    },
    scope::ParameterScope,
};

/// A generative adversarial network: a generator mapping gaussian noise to samples and a
/// discriminator telling them apart from real data.
#[derive(Debug, Clone)]
pub struct Gan {
    dims: ModelDims,
    generator: Sequential,
    discriminator: Sequential,
}

impl Gan {
    /// Creates a new `Gan`, requesting its parameters under `generator/` and `discriminator/`.
    ///
    /// # Arguments
    /// * `scope` - The root scope of the replica being built.
    /// * `dims` - The input and latent widths.
    /// * `generator` - The hidden widths of the generator.
    /// * `discriminator` - The hidden widths of the discriminator.
    /// * `outputs` - The width of the discriminator's output.
    /// * `bn` - The batch normalization spec.
    ///
    /// # Returns
    /// A new `Gan` instance or the store's error.
    pub fn new(
        scope: &mut ParameterScope,
        dims: ModelDims,
        generator: &[usize],
        discriminator: &[usize],
        outputs: usize,
        bn: BatchNormSpec,
    ) -> Result<Self> {
        let generator = blocks::generator(
            &mut scope.nested("generator"),
            dims.latent_size,
            generator,
            dims.features,
            bn,
        )?;
        let discriminator = blocks::discriminator(
            &mut scope.nested("discriminator"),
            dims.features,
            discriminator,
            outputs,
            bn,
        )?;

        Ok(Self {
            dims,
            generator,
            discriminator,
        })
    }

    /// Runs the forward and backward passes over one slice of the batch.
    ///
    /// `d_loss` is differentiated only into the discriminator and `g_loss` only into the
    /// generator, the discriminator just forwards the generator's delta.
    pub fn pass<R: Rng>(&self, x: ArrayView2<f32>, rng: &mut R) -> Result<ModelPass> {
        check_input(x, self.dims.features)?;

        let mut norm_updates = Vec::new();
        let z = standard_normal(rng, x.nrows(), self.dims.latent_size);

        let mut g_trace = Trace::new();
        let fake = self.generator.forward(z.view(), &mut g_trace, &mut norm_updates)?;

        let mut real_trace = Trace::new();
        let mut fake_trace = Trace::new();
        let d_real = self
            .discriminator
            .forward(x, &mut real_trace, &mut norm_updates)?;
        let d_fake = self
            .discriminator
            .forward(fake.view(), &mut fake_trace, &mut norm_updates)?;

        let bce = BinaryCrossEntropy::mean();
        let ones = Array2::ones(d_fake.raw_dim());
        let zeros = Array2::zeros(d_fake.raw_dim());

        let g_loss = bce.loss(d_fake.view(), ones.view());
        let d_loss = bce.loss(d_real.view(), ones.view()) + bce.loss(d_fake.view(), zeros.view());

        let mut grads = GradSink::new();

        self.discriminator.backward(
            &real_trace,
            bce.loss_prime(d_real.view(), ones.view()),
            Some(&mut grads),
        )?;
        self.discriminator.backward(
            &fake_trace,
            bce.loss_prime(d_fake.view(), zeros.view()),
            Some(&mut grads),
        )?;

        let d_fake_input = self.discriminator.backward(
            &fake_trace,
            bce.loss_prime(d_fake.view(), ones.view()),
            None,
        )?;
        self.generator
            .backward(&g_trace, d_fake_input, Some(&mut grads))?;

        Ok(ModelPass {
            losses: BTreeMap::from([("g_loss", g_loss), ("d_loss", d_loss)]),
            grads,
            norm_updates,
            samples: BTreeMap::from([
                ("latent/sample", z),
                ("generator/sample", fake),
                ("discriminator/sample", d_fake),
            ]),
        })
    }
}
