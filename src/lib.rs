#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

pub mod artifact;
pub mod cache;
mod core;
mod error;
mod run;
pub mod trace;
mod utils;

pub use crate::artifact::{
    ArtifactDeclaration, ArtifactPlan, DependencySymbol, GathererDefinition, Phase,
    ResolvedArtifactDefinition, ResolvedDependency, resolve,
};
pub use crate::cache::{CacheStats, Computation, ComputationKey, ComputedCache, Session};
pub use crate::core::{Hash32, Outcome, Settings, ThrottlingMethod};
pub use crate::error::*;
pub use crate::run::AuditRun;
pub use crate::trace::{
    InteractionBreakdown, NetworkRecord, PhaseBreakdown, TaskForest, TimeWindow, Trace,
    TraceEvent,
};
#[cfg(feature = "logging")]
pub use crate::utils::init_logging;
