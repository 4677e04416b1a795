use parameter_server::{
    ParamKind, ParameterHandle, ParameterStore, Partition, ReuseMode,
    initialization::{ConstParamGen, ParamGen},
};

use crate::Result;

/// An explicit variable scope: a name prefix, a reuse mode and an initializer bound to a store.
///
/// Every layer constructor receives one by reference and requests its parameters through it, so
/// the same builder code creates the parameters on the first replica and reuses them on the rest.
pub struct ParameterScope<'a> {
    store: &'a ParameterStore,
    mode: ReuseMode,
    path: String,
    param_gen: &'a mut dyn ParamGen,
}

impl<'a> ParameterScope<'a> {
    /// Creates a new root `ParameterScope`.
    ///
    /// # Arguments
    /// * `store` - The store holding the canonical parameters.
    /// * `mode` - Whether requested parameters must be created or reused.
    /// * `param_gen` - The initializer of every trainable parameter created through this scope.
    ///
    /// # Returns
    /// A new `ParameterScope` instance.
    pub fn root(store: &'a ParameterStore, mode: ReuseMode, param_gen: &'a mut dyn ParamGen) -> Self {
        Self {
            store,
            mode,
            path: String::new(),
            param_gen,
        }
    }

    /// Opens a child scope, names requested through it are prefixed with `name/`.
    pub fn nested(&mut self, name: &str) -> ParameterScope<'_> {
        ParameterScope {
            store: self.store,
            mode: self.mode,
            path: self.qualify(name),
            param_gen: &mut *self.param_gen,
        }
    }

    /// Requests a trainable parameter initialized by the scope's initializer.
    ///
    /// # Arguments
    /// * `name` - The name of the parameter relative to this scope.
    /// * `shape` - The shape of the parameter.
    ///
    /// # Returns
    /// The handle or the store's error if the request violates the reuse mode.
    pub fn trainable(&mut self, name: &str, shape: &[usize]) -> Result<ParameterHandle> {
        let name = self.qualify(name);
        self.request(&name, shape, ParamKind::Trainable, None)
    }

    /// Requests a trainable parameter that starts at a constant `value`.
    pub fn trainable_const(
        &mut self,
        name: &str,
        shape: &[usize],
        value: f32,
    ) -> Result<ParameterHandle> {
        let name = self.qualify(name);
        self.request(&name, shape, ParamKind::Trainable, Some(value))
    }

    /// Requests a normalization statistic that starts at a constant `value`.
    pub fn statistic(&mut self, name: &str, shape: &[usize], value: f32) -> Result<ParameterHandle> {
        let name = self.qualify(name);
        self.request(&name, shape, ParamKind::Statistic, Some(value))
    }

    fn request(
        &mut self,
        name: &str,
        shape: &[usize],
        kind: ParamKind,
        value: Option<f32>,
    ) -> Result<ParameterHandle> {
        let partition = Partition::from_name(name);

        let handle = match value {
            Some(value) => self.store.request(
                name,
                shape,
                partition,
                kind,
                self.mode,
                &mut ConstParamGen::new(value),
            ),
            None => self
                .store
                .request(name, shape, partition, kind, self.mode, &mut *self.param_gen),
        }?;

        Ok(handle)
    }

    fn qualify(&self, name: &str) -> String {
        if self.path.is_empty() {
            name.to_string()
        } else {
            format!("{}/{name}", self.path)
        }
    }
}
