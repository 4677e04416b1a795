use std::{collections::BTreeMap, ops::Range};

use log::{debug, info};
use machine_learning::{
    Model, ModelPass, ParameterScope,
    arch::NormUpdate,
    models::{BatchNormSpec, ModelDims, ModelSpec},
};
use ndarray::{Array2, ArrayD, ArrayView2};
use parameter_server::{
    ParameterHandle, ParameterStore, Partition, ReuseMode, initialization::ParamGen,
};
use rand::{SeedableRng, rngs::StdRng};

use crate::{
    error::{OrchestratorError, Result},
    partition::BatchPartition,
};

/// A parameter paired with the gradient one replica computed for it.
#[derive(Debug, Clone)]
pub struct GradientEntry {
    pub param: ParameterHandle,
    /// `None` when the replica never used the parameter.
    pub grad: Option<ArrayD<f32>>,
}

/// Everything one replica produces for one minibatch.
#[derive(Debug)]
pub struct ReplicaPass {
    pub device: usize,
    pub losses: BTreeMap<&'static str, f32>,
    /// One entry per trainable parameter of each partition, in registration order.
    pub gradients: Vec<(Partition, Vec<GradientEntry>)>,
    pub norm_updates: Vec<NormUpdate>,
    pub samples: BTreeMap<&'static str, Array2<f32>>,
}

/// One instantiation of the model bound to a device and its rows of the batch.
#[derive(Debug)]
pub struct Replica {
    device: usize,
    partition: BatchPartition,
    seed: u64,
    model: Model,
    store: ParameterStore,
}

impl Replica {
    pub fn device(&self) -> usize {
        self.device
    }

    /// Returns the rows of the global batch this replica consumes.
    pub fn rows(&self) -> Range<usize> {
        self.partition.range(self.device)
    }

    /// Runs the model over this replica's slice of `batch`.
    ///
    /// The store's read gate is held for the whole pass, so the parameters can't change
    /// underneath it.
    ///
    /// # Arguments
    /// * `batch` - The whole flattened global batch.
    /// * `step` - The global step, mixed into the seed of the latent noise.
    ///
    /// # Returns
    /// The replica's losses, gradients, normalization updates and samples, or a
    /// `DevicePartitionMismatch` if `batch` isn't one slice per device.
    pub fn run(&self, batch: ArrayView2<f32>, step: u64) -> Result<ReplicaPass> {
        self.partition.check(batch.nrows())?;

        let x = self.partition.slice(batch, self.device);
        let mut rng = StdRng::seed_from_u64(self.noise_seed(step));

        let ModelPass {
            losses,
            mut grads,
            norm_updates,
            samples,
        } = {
            let _gate = self.store.read_gate();
            self.model.pass(x, &mut rng)?
        };

        let gradients = self
            .model
            .partitions()
            .iter()
            .map(|&partition| {
                let entries = self
                    .store
                    .trainable(partition)
                    .into_iter()
                    .map(|param| GradientEntry {
                        grad: grads.take(param.name()),
                        param,
                    })
                    .collect();

                (partition, entries)
            })
            .collect();

        debug!(device = self.device, step = step; "replica pass finished");

        Ok(ReplicaPass {
            device: self.device,
            losses,
            gradients,
            norm_updates,
            samples,
        })
    }

    fn noise_seed(&self, step: u64) -> u64 {
        self.seed ^ ((step << 20) | self.device as u64)
    }
}

/// Builds the replicas of a model one device at a time.
///
/// Device 0 creates every parameter, every later device must find them already in the store.
pub struct ReplicaBuilder {
    store: ParameterStore,
    spec: ModelSpec,
    dims: ModelDims,
    batch_norm: BatchNormSpec,
    param_gen: Box<dyn ParamGen>,
    partition: BatchPartition,
    seed: u64,
    next_device: usize,
}

impl ReplicaBuilder {
    /// Creates a new `ReplicaBuilder`.
    ///
    /// # Arguments
    /// * `store` - The store every replica shares.
    /// * `spec` - The model topology.
    /// * `dims` - The input and latent widths.
    /// * `batch_norm` - The batch normalization spec.
    /// * `param_gen` - The initializer of the parameters device 0 creates.
    /// * `partition` - How the global batch is split across devices.
    /// * `seed` - The base seed of every replica's latent noise.
    ///
    /// # Returns
    /// A new `ReplicaBuilder` instance.
    pub fn new(
        store: ParameterStore,
        spec: ModelSpec,
        dims: ModelDims,
        batch_norm: BatchNormSpec,
        param_gen: Box<dyn ParamGen>,
        partition: BatchPartition,
        seed: u64,
    ) -> Self {
        Self {
            store,
            spec,
            dims,
            batch_norm,
            param_gen,
            partition,
            seed,
            next_device: 0,
        }
    }

    /// Builds the replica of `device`.
    ///
    /// # Returns
    /// The replica or a `ReplicaOutOfOrder` error if `device` isn't the next one, or the store's
    /// error if the build requests a parameter against its reuse mode.
    pub fn build(&mut self, device: usize) -> Result<Replica> {
        if device != self.next_device {
            return Err(OrchestratorError::ReplicaOutOfOrder {
                expected: self.next_device,
                got: device,
            });
        }

        if device >= self.partition.n_devices() {
            return Err(OrchestratorError::DevicePartitionMismatch {
                rows: self.partition.rows(),
                n_devices: self.partition.n_devices(),
                batch_size_per_device: self.partition.batch_size_per_device(),
            });
        }

        let mode = if device == 0 {
            ReuseMode::Create
        } else {
            ReuseMode::Reuse
        };

        let mut scope = ParameterScope::root(&self.store, mode, self.param_gen.as_mut());
        let model = Model::build(&mut scope, &self.spec, self.dims, self.batch_norm)?;

        self.next_device += 1;
        info!(device = device, reuse = device > 0, params = self.store.len(); "built replica");

        Ok(Replica {
            device,
            partition: self.partition,
            seed: self.seed,
            model,
            store: self.store.clone(),
        })
    }
}
