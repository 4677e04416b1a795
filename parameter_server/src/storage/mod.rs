mod error;
mod handle;
mod partition;
mod store;

pub use error::{Result, StoreErr};
pub use handle::ParameterHandle;
pub use partition::{ParamKind, Partition, ReuseMode};
pub use store::ParameterStore;
