use std::collections::BTreeMap;

use ndarray::{Array2, ArrayView2};
use rand::Rng;

use super::{BatchNormSpec, ModelDims, ModelPass, blocks, check_input, standard_normal};
use crate::{
    GradSink, Result,
    arch::{
        Sequential, Trace,
        layers::Dense,
        loss::{BinaryCrossEntropy, GaussianKl, LossFn},
    },
    scope::ParameterScope,
};

/// A variational autoencoder whose decoder doubles as the generator of an adversarial pair.
#[derive(Debug, Clone)]
pub struct VaeGan {
    dims: ModelDims,
    encoder: Sequential,
    z_mean: Dense,
    z_stddev: Dense,
    decoder: Sequential,
    discriminator: Sequential,
}

impl VaeGan {
    /// Creates a new `VaeGan`, requesting its parameters under `encoder/`, `latent/`,
    /// `decoder/` and `discriminator/`.
    pub fn new(
        scope: &mut ParameterScope,
        dims: ModelDims,
        encoder: &[usize],
        decoder: &[usize],
        discriminator: &[usize],
        outputs: usize,
        bn: BatchNormSpec,
    ) -> Result<Self> {
        let encoded = encoder.last().copied().unwrap_or(dims.features);
        let encoder = blocks::encoder(&mut scope.nested("encoder"), dims.features, encoder)?;

        let mut latent = scope.nested("latent");
        let z_mean = Dense::new(&mut latent, "z_mean", (encoded, dims.latent_size))?;
        let z_stddev = Dense::new(&mut latent, "z_stddev", (encoded, dims.latent_size))?;
        drop(latent);

        let decoder = blocks::decoder(
            &mut scope.nested("decoder"),
            dims.latent_size,
            decoder,
            dims.features,
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
            encoder,
            z_mean,
            z_stddev,
            decoder,
            discriminator,
        })
    }

    /// Runs the forward and backward passes over one slice of the batch.
    ///
    /// `vae_loss` reaches the encoder, the latent heads and the decoder, `g_loss` only the
    /// decoder and `d_loss` only the discriminator.
    pub fn pass<R: Rng>(&self, x: ArrayView2<f32>, rng: &mut R) -> Result<ModelPass> {
        check_input(x, self.dims.features)?;

        let mut norm_updates = Vec::new();

        let mut enc_trace = Trace::new();
        let encoded = self.encoder.forward(x, &mut enc_trace, &mut norm_updates)?;

        let mean = self.z_mean.forward(encoded.view())?;
        let stddev = self.z_stddev.forward(encoded.view())?;
        let eps = standard_normal(rng, x.nrows(), self.dims.latent_size);
        let z = &mean + &(&stddev * &eps);

        let mut dec_trace = Trace::new();
        let decoded = self.decoder.forward(z.view(), &mut dec_trace, &mut norm_updates)?;

        let mut real_trace = Trace::new();
        let mut fake_trace = Trace::new();
        let d_real = self
            .discriminator
            .forward(x, &mut real_trace, &mut norm_updates)?;
        let d_fake = self
            .discriminator
            .forward(decoded.view(), &mut fake_trace, &mut norm_updates)?;

        let reconstruction = BinaryCrossEntropy::sum_per_sample();
        let bce = BinaryCrossEntropy::mean();
        let ones = Array2::ones(d_fake.raw_dim());
        let zeros = Array2::zeros(d_fake.raw_dim());

        let reconstruction_loss = reconstruction.loss(decoded.view(), x);
        let latent_loss = GaussianKl.loss(mean.view(), stddev.view());
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

        // adversarial term, stops at the decoder's input
        let d_adversarial = self.discriminator.backward(
            &fake_trace,
            bce.loss_prime(d_fake.view(), ones.view()),
            None,
        )?;
        self.decoder
            .backward(&dec_trace, d_adversarial, Some(&mut grads))?;

        let dz = self.decoder.backward(
            &dec_trace,
            reconstruction.loss_prime(decoded.view(), x),
            Some(&mut grads),
        )?;

        let (kl_mean, kl_stddev) = GaussianKl.loss_prime(mean.view(), stddev.view());
        let d_mean = &dz + &kl_mean;
        let d_stddev = &dz * &eps + &kl_stddev;

        let d_encoded = self
            .z_mean
            .backward(encoded.view(), d_mean.view(), Some(&mut grads))?
            + self
                .z_stddev
                .backward(encoded.view(), d_stddev.view(), Some(&mut grads))?;
        self.encoder
            .backward(&enc_trace, d_encoded, Some(&mut grads))?;

        Ok(ModelPass {
            losses: BTreeMap::from([
                ("reconstruction_loss", reconstruction_loss),
                ("latent_loss", latent_loss),
                ("vae_loss", reconstruction_loss + latent_loss),
                ("g_loss", g_loss),
                ("d_loss", d_loss),
            ]),
            grads,
            norm_updates,
            samples: BTreeMap::from([
                ("encoder/sample", encoded),
                ("latent/sample", z),
                ("decoder/sample", decoded),
                ("discriminator/sample", d_fake),
            ]),
        })
    }
}
