use crate::{
    Result,
    arch::{
        Sequential,
        activations::ActFn,
        layers::{BatchNorm, Dense, Layer},
    },
    models::BatchNormSpec,
    scope::ParameterScope,
};

fn dense(scope: &mut ParameterScope, i: usize, dim: (usize, usize)) -> Result<Layer> {
    Ok(Layer::Dense(Dense::new(scope, &format!("dense_{i}"), dim)?))
}

fn batch_norm(
    scope: &mut ParameterScope,
    i: usize,
    features: usize,
    spec: BatchNormSpec,
) -> Result<Layer> {
    Ok(Layer::BatchNorm(BatchNorm::new(
        scope,
        &format!("batch_norm_{i}"),
        features,
        spec,
    )?))
}

fn output(scope: &mut ParameterScope, dim: (usize, usize), act_fn: ActFn) -> Result<[Layer; 2]> {
    Ok([
        Layer::Dense(Dense::new(scope, "dense_out", dim)?),
        Layer::Activation(act_fn),
    ])
}

/// `latent → (dense → batch norm → relu)* → dense → tanh`.
pub(super) fn generator(
    scope: &mut ParameterScope,
    latent_size: usize,
    widths: &[usize],
    features: usize,
    bn: BatchNormSpec,
) -> Result<Sequential> {
    let mut layers = Vec::new();
    let mut inputs = latent_size;

    for (i, &width) in widths.iter().enumerate() {
        layers.push(dense(scope, i, (inputs, width))?);
        layers.push(batch_norm(scope, i, width, bn)?);
        layers.push(Layer::Activation(ActFn::Relu));
        inputs = width;
    }

    layers.extend(output(scope, (inputs, features), ActFn::Tanh)?);
    Ok(Sequential::new(layers))
}

/// `features → dense → lrelu → (dense → batch norm → lrelu)* → dense → sigmoid`.
pub(super) fn discriminator(
    scope: &mut ParameterScope,
    features: usize,
    widths: &[usize],
    outputs: usize,
    bn: BatchNormSpec,
) -> Result<Sequential> {
    let mut layers = Vec::new();
    let mut inputs = features;

    for (i, &width) in widths.iter().enumerate() {
        layers.push(dense(scope, i, (inputs, width))?);
        if i > 0 {
            layers.push(batch_norm(scope, i, width, bn)?);
        }
        layers.push(Layer::Activation(ActFn::LRELU));
        inputs = width;
    }

    layers.extend(output(scope, (inputs, outputs), ActFn::Sigmoid)?);
    Ok(Sequential::new(layers))
}

/// `features → (dense → lrelu)*`.
pub(super) fn encoder(
    scope: &mut ParameterScope,
    features: usize,
    widths: &[usize],
) -> Result<Sequential> {
    let mut layers = Vec::new();
    let mut inputs = features;

    for (i, &width) in widths.iter().enumerate() {
        layers.push(dense(scope, i, (inputs, width))?);
        layers.push(Layer::Activation(ActFn::LRELU));
        inputs = width;
    }

    Ok(Sequential::new(layers))
}

/// `latent → (dense → relu)* → dense → sigmoid`.
pub(super) fn decoder(
    scope: &mut ParameterScope,
    latent_size: usize,
    widths: &[usize],
    features: usize,
) -> Result<Sequential> {
    let mut layers = Vec::new();
    let mut inputs = latent_size;

    for (i, &width) in widths.iter().enumerate() {
        layers.push(dense(scope, i, (inputs, width))?);
        layers.push(Layer::Activation(ActFn::Relu));
        inputs = width;
    }

    layers.extend(output(scope, (inputs, features), ActFn::Sigmoid)?);
    Ok(Sequential::new(layers))
}
