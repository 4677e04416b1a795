use std::fmt::{self, Display};

/// A disjoint subset of the model's parameters, owned by exactly one optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Partition {
    Generator,
    Discriminator,
    Encoder,
    Latent,
    Decoder,
}

impl Partition {
    /// Every partition, in the order their scopes are built.
    pub const ALL: [Partition; 5] = [
        Partition::Encoder,
        Partition::Latent,
        Partition::Decoder,
        Partition::Generator,
        Partition::Discriminator,
    ];

    /// Returns the root scope name under which the parameters of this partition live.
    pub fn scope(self) -> &'static str {
        match self {
            Partition::Generator => "generator",
            Partition::Discriminator => "discriminator",
            Partition::Encoder => "encoder",
            Partition::Latent => "latent",
            Partition::Decoder => "decoder",
        }
    }

    /// Resolves the partition of a parameter from the first segment of its name.
    ///
    /// # Arguments
    /// * `name` - A slash separated parameter name, e.g. `generator/dense_0/w`.
    ///
    /// # Returns
    /// The partition or `None` if the root scope isn't a known one.
    pub fn from_name(name: &str) -> Option<Self> {
        let root = name.split('/').next()?;
        Self::ALL.into_iter().find(|p| p.scope() == root)
    }
}

impl Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scope())
    }
}

/// Whether a parameter is updated by an optimizer or by a normalization-statistic update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Trainable,
    Statistic,
}

/// How a parameter request interacts with the names already registered in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReuseMode {
    /// The name must be new.
    Create,
    /// The name must already exist with the same shape.
    Reuse,
    /// Create on first request, reuse afterwards.
    Auto,
}
