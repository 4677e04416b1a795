use std::{cell::RefCell, collections::BTreeMap, rc::Rc};

use log::{debug, info};
use machine_learning::MlErr;
use ndarray::{Array2, ArrayView2, ArrayView4};
use parameter_server::{ParameterStore, Partition, optimization::PartitionOptimizer};
use rand::{SeedableRng, rngs::StdRng};
use rayon::prelude::*;

use crate::{
    aggregation::{AveragedGradient, GradientAggregator},
    collector::{Collected, LossCollector},
    configs::TrainingConfig,
    error::{OrchestratorError, Result},
    partition::BatchPartition,
    replica::{GradientEntry, Replica, ReplicaBuilder, ReplicaPass},
    step::TrainStepCoordinator,
    summary::Summary,
};

type PartitionGradients = Vec<(Partition, Vec<AveragedGradient>)>;

/// The replicated model together with everything needed to train it one minibatch at a time.
///
/// Built once per config, [`TrainOp::run`] then executes one train step per minibatch.
pub struct TrainOp {
    config: TrainingConfig,
    store: ParameterStore,
    partition: BatchPartition,
    replicas: Vec<Replica>,
    coordinator: TrainStepCoordinator,
}

impl TrainOp {
    /// Builds every replica, one optimizer per partition and the step coordinator.
    ///
    /// Before returning, a pass over a zero batch runs aggregation without committing, so a
    /// parameter no loss reaches is reported here instead of at the first step.
    ///
    /// # Arguments
    /// * `config` - The training config.
    ///
    /// # Returns
    /// A new `TrainOp` or the first error found while building it.
    pub fn build(config: TrainingConfig) -> Result<Self> {
        Self::build_in(config, ParameterStore::new())
    }

    /// Builds the train op over an existing store.
    ///
    /// The model's own parameters must not be in `store` yet. Any trainable parameter already
    /// registered under one of the model's partitions is trained along with the model, so some
    /// loss must reach it.
    ///
    /// # Arguments
    /// * `config` - The training config.
    /// * `store` - The store the replicas request their parameters from.
    ///
    /// # Returns
    /// A new `TrainOp` or the first error found while building it.
    pub fn build_in(config: TrainingConfig, store: ParameterStore) -> Result<Self> {
        config.validate()?;

        let rng = Rc::new(RefCell::new(StdRng::seed_from_u64(config.seed)));
        let param_gen = config.initializer.param_gen(rng)?;
        let partition = BatchPartition::new(config.n_devices, config.batch_size_per_device);

        let mut builder = ReplicaBuilder::new(
            store.clone(),
            config.model.clone(),
            config.dims(),
            config.batch_norm,
            param_gen,
            partition,
            config.seed,
        );

        let replicas = (0..config.n_devices)
            .map(|device| builder.build(device))
            .collect::<Result<Vec<_>>>()?;

        let partitions = config.model.partitions();
        let optimizers = partitions
            .iter()
            .map(|&p| PartitionOptimizer::new(p, config.optimizer.factory()))
            .collect();
        let coordinator = TrainStepCoordinator::new(store.clone(), optimizers, partitions)?;

        let op = Self {
            config,
            store,
            partition,
            replicas,
            coordinator,
        };

        let probe = Array2::zeros((op.partition.rows(), op.config.dims().features));
        op.aggregate(probe.view())?;

        info!(
            devices = op.replicas.len(),
            params = op.store.len(),
            partitions = partitions.len();
            "built train op"
        );

        Ok(op)
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn store(&self) -> &ParameterStore {
        &self.store
    }

    pub fn replicas(&self) -> &[Replica] {
        &self.replicas
    }

    pub fn global_step(&self) -> u64 {
        self.coordinator.global_step()
    }

    /// Trains on one minibatch.
    ///
    /// # Arguments
    /// * `batch` - The global batch, `[n_devices * batch_size_per_device, height, width, channels]`.
    ///
    /// # Returns
    /// The summary of the committed step.
    pub fn run(&mut self, batch: ArrayView4<f32>) -> Result<Summary> {
        let (rows, height, width, channels) = batch.dim();
        self.partition.check(rows)?;

        let image = self.config.image;
        if (height, width, channels) != (image.height, image.width, image.channels) {
            return Err(OrchestratorError::InputShapeMismatch {
                got: batch.shape().to_vec(),
                expected: vec![rows, image.height, image.width, image.channels],
            });
        }

        let x = batch
            .to_shape((rows, image.features()))
            .map_err(MlErr::from)?;

        self.step(x.view())
    }

    /// Trains on one minibatch of already flattened samples.
    pub fn run_flat(&mut self, x: ArrayView2<f32>) -> Result<Summary> {
        self.partition.check(x.nrows())?;
        self.step(x)
    }

    fn step(&mut self, x: ArrayView2<f32>) -> Result<Summary> {
        let (collected, updates) = self.aggregate(x)?;
        let histograms = Summary::histograms_of(updates.iter().flat_map(|(_, grads)| grads));

        let step = self.coordinator.build_step(updates, collected.norm_updates)?;
        let global_step = self.coordinator.commit(step)?;

        debug!(step = global_step, losses = collected.losses.len(); "trained minibatch");

        Ok(Summary {
            step: global_step,
            losses: collected.losses,
            histograms,
            samples: collected.samples,
        })
    }

    /// Runs every replica over its slice of `x` and averages their gradients per partition.
    fn aggregate(&self, x: ArrayView2<f32>) -> Result<(Collected, PartitionGradients)> {
        let step = self.coordinator.global_step();

        let passes = self
            .replicas
            .par_iter()
            .map(|replica| replica.run(x, step))
            .collect::<Result<Vec<_>>>()?;

        let mut collector = LossCollector::new();
        let mut towers: BTreeMap<Partition, Vec<Vec<GradientEntry>>> = BTreeMap::new();

        for pass in passes {
            let ReplicaPass {
                device,
                losses,
                gradients,
                norm_updates,
                samples,
            } = pass;

            collector.collect(device, losses, norm_updates, samples);

            for (partition, entries) in gradients {
                towers.entry(partition).or_default().push(entries);
            }
        }

        let updates = self
            .config
            .model
            .partitions()
            .iter()
            .map(|&partition| {
                let towers = towers.remove(&partition).unwrap_or_default();
                Ok((partition, GradientAggregator::average(&towers)?))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok((collector.finish(), updates))
    }
}
