use std::env;

use anyhow::Context;
use log::info;
use ndarray::Array4;
use orchestrator::{
    TrainOp,
    configs::{ModelSpec, TrainingConfig},
};
use rand::{Rng, SeedableRng, rngs::StdRng};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = match env::args().nth(1) {
        Some(path) => TrainingConfig::from_path(&path)
            .with_context(|| format!("failed to load config from {path}"))?,
        None => TrainingConfig::default(),
    };

    // Pre-normalized input range of each model.
    let (low, high) = match config.model {
        ModelSpec::Gan { .. } => (-0.5, 0.5),
        ModelSpec::VaeGan { .. } => (0., 1.),
    };

    let shape = (
        config.global_batch_size(),
        config.image.height,
        config.image.width,
        config.image.channels,
    );
    let steps = config.steps;
    let mut rng = StdRng::seed_from_u64(config.seed);

    let mut train_op = TrainOp::build(config).context("failed to build the train op")?;

    for _ in 0..steps {
        let batch = Array4::from_shape_fn(shape, |_| rng.random_range(low..high));
        let summary = train_op.run(batch.view())?;

        let losses: Vec<String> = summary
            .losses
            .iter()
            .map(|(name, loss)| format!("{name}={loss:.4}"))
            .collect();

        info!(step = summary.step; "{}", losses.join(" "));
    }

    info!(steps = train_op.global_step(); "training finished");
    Ok(())
}
