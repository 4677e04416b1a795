//! The canonical home of every parameter of a replicated model.
//!
//! Replicas never own parameters: they hold [`ParameterHandle`]s pointing into a single
//! [`ParameterStore`], and only a train step commit mutates them.

pub mod initialization;
pub mod optimization;
pub mod storage;

pub use storage::{
    ParamKind, ParameterHandle, ParameterStore, Partition, ReuseMode, Result, StoreErr,
};
