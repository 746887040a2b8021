use std::sync::Arc;

use thiserror::Error;

use crate::artifact::Phase;

/// Errors raised while resolving artifact declarations into a plan. All of
/// them are fatal to pipeline setup.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("Artifact '{artifact_id}' depends on '{dependency}', which is not declared before it")]
    DependencyOrder {
        artifact_id: String,
        dependency: String,
    },

    #[error(
        "Artifact '{artifact_id}' ({dependent_phase}) cannot depend on '{dependency}' ({dependency_phase})"
    )]
    DependencyPhase {
        artifact_id: String,
        dependency: String,
        dependent_phase: Phase,
        dependency_phase: Phase,
    },

    #[error("Artifact id '{0}' is declared more than once")]
    DuplicateArtifactId(String),

    #[error("Artifact '{artifact_id}' registers a dependency symbol that is already taken")]
    DuplicateSymbol { artifact_id: String },

    #[error("Gatherer of artifact '{0}' does not support any phase")]
    NoSupportedPhases(String),
}

/// A chain of computed-artifact requests which came back to a computation
/// that is still running.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Cyclic computation: {}", .chain.join(" -> "))]
pub struct CyclicComputation {
    pub chain: Vec<String>,
}

/// Failure of a computed artifact.
///
/// The error is shared by every requester of the same computation, so it is
/// cheap to clone.
#[derive(Debug, Clone)]
pub struct ComputeError(Arc<anyhow::Error>);

impl ComputeError {
    pub fn new(err: impl Into<anyhow::Error>) -> Self {
        Self(Arc::new(err.into()))
    }

    /// Finds the cycle that caused this failure, looking through any number
    /// of computations that failed because of it.
    pub fn cycle(&self) -> Option<&CyclicComputation> {
        self.0.chain().find_map(|err| {
            err.downcast_ref::<CyclicComputation>()
                .or_else(|| err.downcast_ref::<ComputeError>().and_then(ComputeError::cycle))
        })
    }

    pub fn is_cycle(&self) -> bool {
        self.cycle().is_some()
    }
}

impl std::fmt::Display for ComputeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#}", self.0)
    }
}

impl std::error::Error for ComputeError {}

impl From<anyhow::Error> for ComputeError {
    fn from(e: anyhow::Error) -> Self {
        ComputeError(Arc::new(e))
    }
}

impl From<CyclicComputation> for ComputeError {
    fn from(e: CyclicComputation) -> Self {
        ComputeError::new(e)
    }
}

/// A trace event that could not be placed in the task tree. It is dropped
/// together with the subtree it would corrupt; the rest of the tree stays
/// usable.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MalformedTrace {
    #[error("Begin event '{name}' at {ts}µs has no matching end event")]
    UnmatchedBegin { name: String, ts: i64 },

    #[error("End event '{name}' at {ts}µs has no matching begin event")]
    UnmatchedEnd { name: String, ts: i64 },

    #[error("Event '{name}' at {ts}µs has an invalid duration")]
    InvalidDuration { name: String, ts: i64 },

    #[error("Event '{name}' at {ts}µs ends after its parent '{parent}'")]
    Overlap {
        name: String,
        ts: i64,
        parent: String,
    },
}

/// Errors raised while reading a trace before any tree is built.
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("Couldn't find the renderer main thread in the trace")]
    NoMainThread,

    #[error("Couldn't read interaction data of event at {ts}µs.\n{source}")]
    Interaction {
        ts: i64,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
