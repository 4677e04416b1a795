use std::{cell::RefCell, collections::HashMap, rc::Rc};

use machine_learning::{
    Model, ParameterScope,
    models::{BatchNormSpec, ModelDims, ModelSpec},
};
use ndarray::{Array2, Array4, ArrayD, IxDyn};
use orchestrator::{
    BatchPartition, GradientAggregator, GradientEntry, OrchestratorError, ReplicaBuilder, TrainOp,
    TrainStepCoordinator,
    configs::{ImageConfig, InitSpec, OptimizerConfig, TrainingConfig},
};
use parameter_server::{
    ParameterStore, Partition, ReuseMode, StoreErr,
    initialization::{ConstParamGen, RandParamGen},
    optimization::{GradientDescent, Optimizer, PartitionOptimizer},
};
use rand::{Rng, SeedableRng, rngs::StdRng};

fn gan_config(n_devices: usize) -> TrainingConfig {
    TrainingConfig {
        n_devices,
        batch_size_per_device: 4,
        latent_size: 3,
        image: ImageConfig {
            height: 2,
            width: 2,
            channels: 1,
        },
        model: ModelSpec::Gan {
            generator: vec![5],
            discriminator: vec![5, 3],
            discriminator_outputs: 1,
        },
        steps: 1,
        ..Default::default()
    }
}

fn vae_gan_config() -> TrainingConfig {
    TrainingConfig {
        model: ModelSpec::VaeGan {
            encoder: vec![6],
            decoder: vec![6],
            discriminator: vec![4],
            discriminator_outputs: 1,
        },
        ..gan_config(2)
    }
}

fn batch(config: &TrainingConfig, low: f32, high: f32, seed: u64) -> Array4<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    let shape = (
        config.global_batch_size(),
        config.image.height,
        config.image.width,
        config.image.channels,
    );

    Array4::from_shape_fn(shape, |_| rng.random_range(low..high))
}

#[test]
fn two_replicas_average_their_gradients_into_one_update() {
    let partition = BatchPartition::even(8, 2).unwrap();
    assert_eq!(partition.batch_size_per_device(), 4);

    let store = ParameterStore::new();
    let rng = Rc::new(RefCell::new(StdRng::seed_from_u64(42)));
    let mut param_gen = RandParamGen::normal(rng, 0., 1.).unwrap();
    let w = store
        .get_or_create("generator/w", &[4], &mut param_gen)
        .unwrap();
    let initial = w.read().clone();

    let towers: Vec<Vec<GradientEntry>> = [1., 3.]
        .into_iter()
        .map(|g| {
            vec![GradientEntry {
                param: w.clone(),
                grad: Some(ArrayD::from_elem(IxDyn(&[4]), g)),
            }]
        })
        .collect();

    let averaged = GradientAggregator::average(&towers).unwrap();
    assert_eq!(averaged[0].grad.as_slice().unwrap(), &[2.; 4]);
    assert_eq!(averaged[0].contributors, 2);

    let sgd = PartitionOptimizer::new(
        Partition::Generator,
        Box::new(|_: usize| -> Box<dyn Optimizer> { Box::new(GradientDescent::new(1.)) }),
    );
    let mut coordinator =
        TrainStepCoordinator::new(store.clone(), vec![sgd], &[Partition::Generator]).unwrap();

    let step = coordinator
        .build_step(vec![(Partition::Generator, averaged)], vec![])
        .unwrap();
    assert_eq!(coordinator.commit(step).unwrap(), 1);

    let updated = w.read();
    for (after, before) in updated.iter().zip(initial.iter()) {
        assert_eq!(*after, before - 2.);
    }
}

#[test]
fn handles_from_every_binding_share_storage() {
    let store = ParameterStore::new();

    let a = store
        .get_or_create("generator/dense1", &[100, 512], &mut ConstParamGen::new(0.))
        .unwrap();
    let b = store
        .get_or_create("generator/dense1", &[100, 512], &mut ConstParamGen::new(7.))
        .unwrap();

    assert!(a.same(&b));
    assert_eq!(store.len(), 1);

    a.write()[[3, 9]] = 1.5;
    assert_eq!(b.read()[[3, 9]], 1.5);
    assert_eq!(b.read()[[0, 0]], 0.);

    let err = store
        .get_or_create("generator/dense1", &[512, 100], &mut ConstParamGen::new(0.))
        .unwrap_err();
    assert!(matches!(err, StoreErr::DuplicateShapeMismatch { .. }));
}

#[test]
fn a_second_create_build_is_a_redefinition() {
    let store = ParameterStore::new();
    let spec = ModelSpec::default();
    let dims = ModelDims {
        features: 4,
        latent_size: 2,
    };
    let mut param_gen = ConstParamGen::new(0.1);

    let mut scope = ParameterScope::root(&store, ReuseMode::Create, &mut param_gen);
    Model::build(&mut scope, &spec, dims, BatchNormSpec::default()).unwrap();
    let registered = store.len();

    let mut scope = ParameterScope::root(&store, ReuseMode::Create, &mut param_gen);
    let err = Model::build(&mut scope, &spec, dims, BatchNormSpec::default()).unwrap_err();
    assert!(matches!(
        OrchestratorError::from(err),
        OrchestratorError::Store(StoreErr::ParameterRedefinition { .. })
    ));

    let mut scope = ParameterScope::root(&store, ReuseMode::Reuse, &mut param_gen);
    Model::build(&mut scope, &spec, dims, BatchNormSpec::default()).unwrap();
    assert_eq!(store.len(), registered);
}

#[test]
fn replicas_must_be_built_in_device_order() {
    let config = gan_config(3);
    let rng = Rc::new(RefCell::new(StdRng::seed_from_u64(config.seed)));
    let param_gen = config.initializer.param_gen(rng).unwrap();

    let mut builder = ReplicaBuilder::new(
        ParameterStore::new(),
        config.model.clone(),
        config.dims(),
        config.batch_norm,
        param_gen,
        BatchPartition::new(3, 4),
        config.seed,
    );

    assert!(matches!(
        builder.build(1),
        Err(OrchestratorError::ReplicaOutOfOrder {
            expected: 0,
            got: 1
        })
    ));

    let first = builder.build(0).unwrap();
    let second = builder.build(1).unwrap();
    assert_eq!(first.rows(), 0..4);
    assert_eq!(second.rows(), 4..8);

    assert!(matches!(
        builder.build(1),
        Err(OrchestratorError::ReplicaOutOfOrder {
            expected: 2,
            got: 1
        })
    ));
}

#[test]
fn replicas_never_duplicate_parameters() {
    let single = TrainOp::build(gan_config(1)).unwrap();
    let quad = TrainOp::build(gan_config(4)).unwrap();

    assert_eq!(quad.replicas().len(), 4);
    assert_eq!(single.store().len(), quad.store().len());
}

#[test]
fn gan_step_updates_parameters_once() {
    let config = gan_config(2);
    let input = batch(&config, -0.5, 0.5, 7);
    let mut train_op = TrainOp::build(config).unwrap();

    let before = train_op.store().snapshot();
    let summary = train_op.run(input.view()).unwrap();
    let after = train_op.store().snapshot();

    assert_eq!(summary.step, 1);
    assert_eq!(train_op.global_step(), 1);
    assert!(summary.losses["g_loss"].is_finite());
    assert!(summary.losses["d_loss"].is_finite());
    assert_eq!(summary.samples["generator/sample"].dim(), (4, 4));
    assert!(summary.histogram("generator/dense_out/w").is_some());
    assert!(summary.histogram("discriminator/dense_out/b").is_some());

    let trainable = train_op.store().trainable(Partition::Generator).len()
        + train_op.store().trainable(Partition::Discriminator).len();
    assert_eq!(summary.histograms.len(), trainable);

    let changed = before
        .iter()
        .zip(after.iter())
        .filter(|((_, b), (_, a))| b != a)
        .count();
    assert!(changed > 0);
}

#[test]
fn training_is_reproducible() {
    let config = gan_config(2);
    let input = batch(&config, -0.5, 0.5, 11);

    let mut a = TrainOp::build(config.clone()).unwrap();
    let mut b = TrainOp::build(config).unwrap();

    for _ in 0..2 {
        a.run(input.view()).unwrap();
        b.run(input.view()).unwrap();
    }

    assert_eq!(a.store().snapshot(), b.store().snapshot());
}

#[test]
fn vae_gan_step_trains_every_partition() {
    let config = vae_gan_config();
    let input = batch(&config, 0., 1., 3);
    let mut train_op = TrainOp::build(config).unwrap();

    let summary = train_op.run(input.view()).unwrap();

    for loss in ["reconstruction_loss", "latent_loss", "vae_loss", "g_loss", "d_loss"] {
        assert!(summary.losses[loss].is_finite(), "{loss}");
    }

    for partition in ModelSpec::VAE_GAN_PARTITIONS {
        for param in train_op.store().trainable(*partition) {
            assert!(summary.histogram(param.name()).is_some(), "{}", param.name());
        }
    }

    assert_eq!(summary.samples["decoder/sample"].dim(), (4, 4));
}

#[test]
fn rejects_batches_that_do_not_fit_the_devices() {
    let config = gan_config(2);
    let mut train_op = TrainOp::build(config).unwrap();

    let short = Array4::<f32>::zeros((6, 2, 2, 1));
    assert!(matches!(
        train_op.run(short.view()),
        Err(OrchestratorError::DevicePartitionMismatch { rows: 6, .. })
    ));

    let wide = Array4::<f32>::zeros((8, 2, 3, 1));
    assert!(matches!(
        train_op.run(wide.view()),
        Err(OrchestratorError::InputShapeMismatch { .. })
    ));

    let flat = Array2::<f32>::zeros((8, 4));
    assert!(train_op.run_flat(flat.view()).is_ok());
    assert_eq!(train_op.global_step(), 1);
}

#[test]
fn invalid_configs_fail_before_building() {
    let config = TrainingConfig {
        optimizer: OptimizerConfig::GradientDescent { learning_rate: -1. },
        initializer: InitSpec::Xavier,
        ..gan_config(2)
    };

    assert!(matches!(
        TrainOp::build(config),
        Err(OrchestratorError::InvalidConfig(_))
    ));
}

fn flat_batch(config: &TrainingConfig, seed: u64) -> Array2<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    let shape = (config.global_batch_size(), config.image.features());

    Array2::from_shape_fn(shape, |_| rng.random_range(-0.5..0.5))
}

#[test]
fn committed_parameters_move_by_the_mean_of_the_replica_gradients() {
    let config = TrainingConfig {
        optimizer: OptimizerConfig::GradientDescent { learning_rate: 1. },
        ..gan_config(2)
    };
    let x = flat_batch(&config, 5);
    let mut train_op = TrainOp::build(config).unwrap();

    let passes: Vec<_> = train_op
        .replicas()
        .iter()
        .map(|replica| replica.run(x.view(), 0).unwrap())
        .collect();

    let mut grads: HashMap<String, Vec<ArrayD<f32>>> = HashMap::new();
    for pass in &passes {
        for entry in pass.gradients.iter().flat_map(|(_, entries)| entries) {
            let grad = entry.grad.clone().unwrap();
            grads.entry(entry.param.name().to_string()).or_default().push(grad);
        }
    }

    let before: HashMap<_, _> = train_op.store().snapshot().into_iter().collect();
    train_op.run_flat(x.view()).unwrap();

    assert_eq!(
        grads.len(),
        train_op.store().trainable(Partition::Generator).len()
            + train_op.store().trainable(Partition::Discriminator).len()
    );

    for (name, replica_grads) in &grads {
        assert_eq!(replica_grads.len(), 2, "{name}");

        let param = train_op.store().get(name).unwrap();
        let after = param.read();
        let expected: Vec<f32> = replica_grads[0]
            .iter()
            .zip(replica_grads[1].iter())
            .map(|(g0, g1)| ((*g0 as f64 + *g1 as f64) / 2.) as f32)
            .collect();

        for ((a, b), g) in after.iter().zip(before[name].iter()).zip(expected.iter()) {
            assert!((a - (b - g)).abs() <= 1e-6, "{name}: {a} vs {b} - {g}");
        }
    }
}

#[test]
fn running_statistics_follow_only_the_last_device() {
    let config = TrainingConfig {
        batch_norm: BatchNormSpec {
            decay: 0.9,
            epsilon: 1e-3,
        },
        ..gan_config(2)
    };
    let decay = config.batch_norm.decay;
    let x = flat_batch(&config, 9);
    let mut train_op = TrainOp::build(config).unwrap();

    let before: HashMap<_, _> = train_op.store().snapshot().into_iter().collect();
    let ema = |device: usize| {
        let pass = train_op.replicas()[device].run(x.view(), 0).unwrap();
        let mut running: HashMap<String, ArrayD<f32>> = HashMap::new();

        for update in &pass.norm_updates {
            let name = update.stat().name().to_string();
            let current = running.entry(name.clone()).or_insert_with(|| before[&name].clone());
            current
                .iter_mut()
                .zip(update.value().iter())
                .for_each(|(r, v)| *r = *r * decay + v * (1. - decay));
        }

        running
    };

    let first = ema(0);
    let last = ema(1);
    assert!(!last.is_empty());
    assert_ne!(first, last);

    train_op.run_flat(x.view()).unwrap();

    for (name, expected) in &last {
        let actual = train_op.store().get(name).unwrap().read().clone();
        for (a, e) in actual.iter().zip(expected.iter()) {
            assert!((a - e).abs() <= 1e-6, "{name}: {a} vs {e}");
        }
    }
}

#[test]
fn unreached_parameters_fail_the_build() {
    let store = ParameterStore::new();
    store
        .get_or_create("generator/unused", &[3], &mut ConstParamGen::new(0.))
        .unwrap();

    let err = TrainOp::build_in(gan_config(2), store.clone()).err().unwrap();

    assert!(matches!(
        err,
        OrchestratorError::NoGradientForParameter { name } if name == "generator/unused"
    ));
    assert_eq!(store.get("generator/unused").unwrap().read()[[0]], 0.);
}

#[test]
fn replicas_reject_batches_shorter_than_the_partition() {
    let train_op = TrainOp::build(gan_config(2)).unwrap();
    let short = Array2::<f32>::zeros((5, 4));

    assert!(matches!(
        train_op.replicas()[1].run(short.view(), 0),
        Err(OrchestratorError::DevicePartitionMismatch { rows: 5, .. })
    ));
}

