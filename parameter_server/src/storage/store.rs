use std::{collections::HashMap, sync::Arc};

use log::debug;
use ndarray::ArrayD;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{ParamKind, ParameterHandle, Partition, Result, ReuseMode, StoreErr};
use crate::initialization::ParamGen;

#[derive(Debug, Default)]
struct Registry {
    params: Vec<ParameterHandle>,
    index: HashMap<String, usize>,
}

/// The registry holding the canonical copy of every parameter of the model.
///
/// Replicas only ever receive handles into this store, so there is exactly one live instance
/// per name no matter how many replicas are built. Cloning the store clones the reference.
///
/// The store also carries a commit gate: readers (replica passes, snapshots) hold it shared
/// and a train step commit holds it exclusively, so no reader ever observes a half applied
/// step.
#[derive(Debug, Clone, Default)]
pub struct ParameterStore {
    registry: Arc<RwLock<Registry>>,
    gate: Arc<RwLock<()>>,
}

impl ParameterStore {
    /// Creates a new empty `ParameterStore`.
    ///
    /// # Returns
    /// A new `ParameterStore` instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the handle of an existing parameter, or creates it on the first call.
    ///
    /// The partition is resolved from the root scope of `name`.
    ///
    /// # Arguments
    /// * `name` - The stable name of the parameter.
    /// * `shape` - The requested shape.
    /// * `param_gen` - The initializer, only sampled when the parameter is created.
    ///
    /// # Returns
    /// The handle or a `DuplicateShapeMismatch` if `name` exists with a different shape.
    pub fn get_or_create(
        &self,
        name: &str,
        shape: &[usize],
        param_gen: &mut dyn ParamGen,
    ) -> Result<ParameterHandle> {
        self.request(
            name,
            shape,
            Partition::from_name(name),
            ParamKind::Trainable,
            ReuseMode::Auto,
            param_gen,
        )
    }

    /// Requests a parameter honoring an explicit reuse mode.
    ///
    /// # Arguments
    /// * `name` - The stable name of the parameter.
    /// * `shape` - The requested shape.
    /// * `partition` - The partition recorded when the parameter is created.
    /// * `kind` - The kind recorded when the parameter is created.
    /// * `mode` - Whether the name must be new, must exist or either.
    /// * `param_gen` - The initializer, only sampled when the parameter is created.
    ///
    /// # Returns
    /// The handle or an error if the request violates `mode` or the registered shape.
    pub fn request(
        &self,
        name: &str,
        shape: &[usize],
        partition: Option<Partition>,
        kind: ParamKind,
        mode: ReuseMode,
        param_gen: &mut dyn ParamGen,
    ) -> Result<ParameterHandle> {
        let mut registry = self.registry.write();

        match (registry.index.get(name).copied(), mode) {
            (Some(_), ReuseMode::Create) => Err(StoreErr::ParameterRedefinition {
                name: name.to_string(),
            }),
            (None, ReuseMode::Reuse) => Err(StoreErr::MissingParameter {
                name: name.to_string(),
            }),
            (Some(i), _) => {
                let param = &registry.params[i];

                if param.shape() != shape {
                    return Err(StoreErr::DuplicateShapeMismatch {
                        name: name.to_string(),
                        existing: param.shape().to_vec(),
                        requested: shape.to_vec(),
                    });
                }

                Ok(param.clone())
            }
            (None, _) => {
                let len: usize = shape.iter().product();
                let values =
                    param_gen
                        .sample(shape)
                        .map_err(|e| StoreErr::Initialization {
                            name: name.to_string(),
                            reason: e.to_string(),
                        })?;

                let param = ParameterHandle::new(name, shape, partition, kind, values)?;
                debug!(name = name, len = len; "registered parameter");

                let idx = registry.params.len();
                registry.params.push(param.clone());
                registry.index.insert(name.to_string(), idx);
                Ok(param)
            }
        }
    }

    /// Looks up a parameter by name.
    pub fn get(&self, name: &str) -> Option<ParameterHandle> {
        let registry = self.registry.read();
        let idx = *registry.index.get(name)?;
        Some(registry.params[idx].clone())
    }

    /// Returns every parameter, in registration order.
    pub fn parameters(&self) -> Vec<ParameterHandle> {
        self.registry.read().params.clone()
    }

    /// Returns the trainable parameters of `partition`, in registration order.
    ///
    /// # Arguments
    /// * `partition` - The partition to list.
    ///
    /// # Returns
    /// The handles of the partition's trainable parameters.
    pub fn trainable(&self, partition: Partition) -> Vec<ParameterHandle> {
        self.registry
            .read()
            .params
            .iter()
            .filter(|p| p.is_trainable() && p.partition() == Some(partition))
            .cloned()
            .collect()
    }

    /// Returns the amount of live parameters.
    pub fn len(&self) -> usize {
        self.registry.read().params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies the values of every parameter while holding the read gate.
    ///
    /// # Returns
    /// A list of names and values, in registration order.
    pub fn snapshot(&self) -> Vec<(String, ArrayD<f32>)> {
        let _gate = self.read_gate();

        self.parameters()
            .iter()
            .map(|p| (p.name().to_string(), p.read().clone()))
            .collect()
    }

    /// Acquires the commit gate in shared mode.
    pub fn read_gate(&self) -> RwLockReadGuard<'_, ()> {
        self.gate.read()
    }

    /// Acquires the commit gate in exclusive mode.
    pub fn write_gate(&self) -> RwLockWriteGuard<'_, ()> {
        self.gate.write()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::initialization::ConstParamGen;

    fn zeros() -> ConstParamGen {
        ConstParamGen::new(0.)
    }

    struct ShortParamGen;

    impl ParamGen for ShortParamGen {
        fn sample(&mut self, shape: &[usize]) -> crate::initialization::Result<Vec<f32>> {
            let len: usize = shape.iter().product();
            Ok(vec![0.; len - 1])
        }
    }

    #[test]
    fn get_or_create_returns_the_same_storage() {
        let store = ParameterStore::new();

        let first = store
            .get_or_create("gen/dense1", &[100, 512], &mut zeros())
            .unwrap();
        let second = store
            .get_or_create("gen/dense1", &[100, 512], &mut zeros())
            .unwrap();

        first.write()[[3, 7]] = 42.;

        assert!(first.same(&second));
        assert_eq!(second.read()[[3, 7]], 42.);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn get_or_create_rejects_a_different_shape() {
        let store = ParameterStore::new();
        store.get_or_create("w", &[2, 3], &mut zeros()).unwrap();

        let err = store.get_or_create("w", &[3, 2], &mut zeros()).unwrap_err();

        assert_eq!(
            err,
            StoreErr::DuplicateShapeMismatch {
                name: "w".into(),
                existing: vec![2, 3],
                requested: vec![3, 2],
            }
        );
    }

    #[test]
    fn create_mode_rejects_redefinitions() {
        let store = ParameterStore::new();
        let create = |store: &ParameterStore| {
            store.request(
                "generator/w",
                &[2],
                Some(Partition::Generator),
                ParamKind::Trainable,
                ReuseMode::Create,
                &mut zeros(),
            )
        };

        create(&store).unwrap();
        let err = create(&store).unwrap_err();

        assert_eq!(
            err,
            StoreErr::ParameterRedefinition {
                name: "generator/w".into()
            }
        );
    }

    #[test]
    fn reuse_mode_requires_an_existing_parameter() {
        let store = ParameterStore::new();

        let err = store
            .request(
                "generator/w",
                &[2],
                Some(Partition::Generator),
                ParamKind::Trainable,
                ReuseMode::Reuse,
                &mut zeros(),
            )
            .unwrap_err();

        assert_eq!(
            err,
            StoreErr::MissingParameter {
                name: "generator/w".into()
            }
        );
        assert!(store.is_empty());
    }

    #[test]
    fn initializer_must_fill_the_parameter() {
        let store = ParameterStore::new();

        let err = store
            .get_or_create("w", &[4], &mut ShortParamGen)
            .unwrap_err();

        assert!(matches!(err, StoreErr::SizeMismatch { got: 3, expected: 4, .. }));
        assert!(store.get("w").is_none());
    }

    #[test]
    fn trainable_lists_one_partition_in_order() {
        let store = ParameterStore::new();
        let declare = |name: &str, kind| {
            store
                .request(
                    name,
                    &[1],
                    Partition::from_name(name),
                    kind,
                    ReuseMode::Create,
                    &mut zeros(),
                )
                .unwrap();
        };

        declare("generator/b", ParamKind::Trainable);
        declare("discriminator/a", ParamKind::Trainable);
        declare("generator/a", ParamKind::Trainable);
        declare("generator/bn/moving_mean", ParamKind::Statistic);

        let names: Vec<_> = store
            .trainable(Partition::Generator)
            .iter()
            .map(|p| p.name().to_string())
            .collect();

        assert_eq!(names, ["generator/b", "generator/a"]);
        assert_eq!(store.len(), 4);
    }

    #[test]
    fn snapshot_copies_values() {
        let store = ParameterStore::new();
        let param = store
            .get_or_create("w", &[2], &mut ConstParamGen::new(1.))
            .unwrap();

        let snapshot = store.snapshot();
        param.write().fill(5.);

        assert_eq!(snapshot[0].0, "w");
        assert_eq!(snapshot[0].1.as_slice().unwrap(), &[1., 1.]);
    }

    #[test]
    fn snapshot_waits_for_the_commit_in_flight() {
        use std::{sync::mpsc, thread, time::Duration};

        let store = ParameterStore::new();
        let a = store
            .get_or_create("generator/a", &[1], &mut ConstParamGen::new(0.))
            .unwrap();
        let b = store
            .get_or_create("generator/b", &[1], &mut ConstParamGen::new(0.))
            .unwrap();

        let gate = store.write_gate();
        a.write().fill(1.);

        let (tx, rx) = mpsc::channel();
        let reader = store.clone();
        let handle = thread::spawn(move || tx.send(reader.snapshot()).unwrap());

        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());

        b.write().fill(1.);
        drop(gate);

        let snapshot = rx.recv().unwrap();
        handle.join().unwrap();

        assert!(snapshot.iter().all(|(_, v)| v[[0]] == 1.));
    }
}
