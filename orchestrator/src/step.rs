use std::collections::BTreeMap;

use log::debug;
use machine_learning::arch::NormUpdate;
use parameter_server::{ParameterStore, Partition, optimization::PartitionOptimizer};

use crate::{
    aggregation::AveragedGradient,
    error::{OrchestratorError, Result},
};

/// One averaged gradient application per partition plus the retained normalization updates.
///
/// Only [`TrainStepCoordinator::build_step`] creates these, so a step is always valid for the
/// coordinator that built it.
#[derive(Debug)]
pub struct TrainStep {
    updates: Vec<(Partition, Vec<AveragedGradient>)>,
    norm_updates: Vec<NormUpdate>,
}

impl TrainStep {
    pub fn updates(&self) -> &[(Partition, Vec<AveragedGradient>)] {
        &self.updates
    }

    pub fn norm_updates(&self) -> &[NormUpdate] {
        &self.norm_updates
    }
}

/// Applies train steps to the store, one optimizer per partition.
pub struct TrainStepCoordinator {
    store: ParameterStore,
    optimizers: BTreeMap<Partition, PartitionOptimizer>,
    global_step: u64,
}

impl TrainStepCoordinator {
    /// Creates a new `TrainStepCoordinator`.
    ///
    /// # Arguments
    /// * `store` - The store the steps are committed to.
    /// * `optimizers` - One optimizer per partition.
    /// * `partitions` - The partitions of the model being trained.
    ///
    /// # Returns
    /// A new coordinator or an error if a partition has no optimizer or more than one.
    pub fn new(
        store: ParameterStore,
        optimizers: Vec<PartitionOptimizer>,
        partitions: &[Partition],
    ) -> Result<Self> {
        let mut by_partition = BTreeMap::new();

        for optimizer in optimizers {
            let partition = optimizer.partition();

            if by_partition.insert(partition, optimizer).is_some() {
                return Err(OrchestratorError::DuplicateOptimizer(partition));
            }
        }

        if let Some(&missing) = partitions.iter().find(|p| !by_partition.contains_key(p)) {
            return Err(OrchestratorError::MissingOptimizer(missing));
        }

        Ok(Self {
            store,
            optimizers: by_partition,
            global_step: 0,
        })
    }

    /// The amount of steps committed so far.
    pub fn global_step(&self) -> u64 {
        self.global_step
    }

    /// Builds the step of a GAN.
    pub fn build_gan_step(
        &self,
        generator: Vec<AveragedGradient>,
        discriminator: Vec<AveragedGradient>,
        norm_updates: Vec<NormUpdate>,
    ) -> Result<TrainStep> {
        self.build_step(
            vec![
                (Partition::Generator, generator),
                (Partition::Discriminator, discriminator),
            ],
            norm_updates,
        )
    }

    /// Validates a step so that committing it can't fail half-way.
    ///
    /// # Arguments
    /// * `updates` - The averaged gradients of each partition.
    /// * `norm_updates` - The retained normalization updates.
    ///
    /// # Returns
    /// The step or an error if a partition has no optimizer, a gradient targets a parameter
    /// outside its partition or doesn't fit its parameter, or a normalization update doesn't
    /// fit its statistic.
    pub fn build_step(
        &self,
        updates: Vec<(Partition, Vec<AveragedGradient>)>,
        norm_updates: Vec<NormUpdate>,
    ) -> Result<TrainStep> {
        for (partition, grads) in &updates {
            if !self.optimizers.contains_key(partition) {
                return Err(OrchestratorError::MissingOptimizer(*partition));
            }

            for AveragedGradient { param, grad, .. } in grads {
                if param.partition() != Some(*partition) || !param.is_trainable() {
                    return Err(OrchestratorError::PartitionViolation {
                        name: param.name().to_string(),
                        partition: *partition,
                    });
                }

                if grad.shape() != param.shape() {
                    return Err(OrchestratorError::GradientShapeMismatch {
                        name: param.name().to_string(),
                        got: grad.shape().to_vec(),
                        expected: param.shape().to_vec(),
                    });
                }
            }
        }

        for update in &norm_updates {
            update.validate()?;
        }

        Ok(TrainStep {
            updates,
            norm_updates,
        })
    }

    /// Applies `step` while holding the store's write gate.
    ///
    /// # Returns
    /// The new global step.
    pub fn commit(&mut self, step: TrainStep) -> Result<u64> {
        let _gate = self.store.write_gate();

        for (partition, grads) in &step.updates {
            let optimizer = self
                .optimizers
                .get_mut(partition)
                .ok_or(OrchestratorError::MissingOptimizer(*partition))?;

            let grads: Vec<_> = grads.iter().map(|g| (&g.param, g.grad.view())).collect();
            optimizer.apply_gradients(&grads)?;
        }

        for update in &step.norm_updates {
            update.apply()?;
        }

        self.global_step += 1;
        debug!(
            step = self.global_step,
            partitions = step.updates.len(),
            norm_updates = step.norm_updates.len();
            "committed train step"
        );

        Ok(self.global_step)
    }
}
