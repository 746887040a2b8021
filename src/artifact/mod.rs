//! Artifact declarations and their resolution into an ordered plan.
//!
//! A gatherer collects one raw artifact during some phase of the page
//! lifecycle. Gatherers reference each other through opaque
//! [`DependencySymbol`]s rather than names, so two independently written
//! gatherers can never collide by accident. The resolver turns the declared
//! list of artifacts into an [`ArtifactPlan`], in which every dependency is
//! replaced with the id of the artifact that satisfies it.

mod plan;
mod resolve;

use std::borrow::Cow;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

pub use crate::artifact::plan::ArtifactPlan;
pub use crate::artifact::resolve::resolve;

/// The page-lifecycle stage during which a gatherer may run.
///
/// Variants are ordered from the most to the least restrictive, so the
/// effective phase of a gatherer supporting several phases is the minimum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Timespan,
    Snapshot,
    Navigation,
}

impl Phase {
    /// Whether an artifact collected in `self` may consume one collected in
    /// `dependency`.
    ///
    /// Timespan and snapshot collection can each happen without the other,
    /// and without any navigation, so they may only consume artifacts of
    /// their own kind. A navigation covers every stage, so anything produced
    /// earlier is available to it.
    pub fn can_depend_on(self, dependency: Phase) -> bool {
        match self {
            Phase::Navigation => true,
            Phase::Timespan | Phase::Snapshot => self == dependency,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Timespan => "timespan",
            Phase::Snapshot => "snapshot",
            Phase::Navigation => "navigation",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

static NEXT_SYMBOL: AtomicU64 = AtomicU64::new(1);

/// An opaque, process-unique token naming whatever a gatherer produces.
///
/// Two symbols are equal only if one is a copy of the other. The label is
/// carried for diagnostics and plays no part in comparisons.
#[derive(Clone, Copy)]
pub struct DependencySymbol {
    id: u64,
    label: &'static str,
}

impl DependencySymbol {
    pub fn new(label: &'static str) -> Self {
        Self {
            id: NEXT_SYMBOL.fetch_add(1, Ordering::Relaxed),
            label,
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }
}

impl PartialEq for DependencySymbol {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for DependencySymbol {}

impl std::hash::Hash for DependencySymbol {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl std::fmt::Debug for DependencySymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Symbol({}#{})", self.label, self.id)
    }
}

/// Definition of a collector of one raw artifact.
#[derive(Debug, Clone)]
pub struct GathererDefinition {
    name: Cow<'static, str>,
    supported_phases: Vec<Phase>,
    symbol: Option<DependencySymbol>,
    dependencies: Vec<(String, DependencySymbol)>,
}

impl GathererDefinition {
    pub fn new(
        name: impl Into<Cow<'static, str>>,
        supported_phases: impl IntoIterator<Item = Phase>,
    ) -> Self {
        Self {
            name: name.into(),
            supported_phases: supported_phases.into_iter().collect(),
            symbol: None,
            dependencies: Vec::new(),
        }
    }

    /// Registers the symbol other gatherers use to depend on this one.
    pub fn produces(mut self, symbol: DependencySymbol) -> Self {
        self.symbol = Some(symbol);
        self
    }

    /// Declares a named dependency on whatever produces `symbol`.
    pub fn depends_on(mut self, name: impl Into<String>, symbol: DependencySymbol) -> Self {
        self.dependencies.push((name.into(), symbol));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn supported_phases(&self) -> &[Phase] {
        &self.supported_phases
    }

    pub fn supports(&self, phase: Phase) -> bool {
        self.supported_phases.contains(&phase)
    }

    /// The most restrictive phase this gatherer supports.
    pub fn phase(&self) -> Option<Phase> {
        self.supported_phases.iter().copied().min()
    }

    pub fn symbol(&self) -> Option<DependencySymbol> {
        self.symbol
    }

    /// Declared dependencies, in declaration order.
    pub fn dependencies(&self) -> &[(String, DependencySymbol)] {
        &self.dependencies
    }
}

/// One entry of the configured artifact list.
#[derive(Debug, Clone)]
pub struct ArtifactDeclaration {
    pub id: String,
    pub gatherer: Arc<GathererDefinition>,
}

impl ArtifactDeclaration {
    pub fn new(id: impl Into<String>, gatherer: Arc<GathererDefinition>) -> Self {
        Self {
            id: id.into(),
            gatherer,
        }
    }
}

/// A named dependency bound to the artifact that satisfies it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedDependency {
    pub name: String,
    pub artifact_id: String,
}

/// An artifact declaration with every dependency bound to an artifact id.
///
/// Symbols are only a lookup aid while resolving and do not survive into the
/// resolved definition.
#[derive(Debug, Clone)]
pub struct ResolvedArtifactDefinition {
    id: String,
    gatherer: Arc<GathererDefinition>,
    dependencies: Vec<ResolvedDependency>,
}

impl ResolvedArtifactDefinition {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn gatherer(&self) -> &GathererDefinition {
        &self.gatherer
    }

    pub fn dependencies(&self) -> &[ResolvedDependency] {
        &self.dependencies
    }

    /// Id of the artifact bound to the dependency called `name`.
    pub fn dependency(&self, name: &str) -> Option<&str> {
        self.dependencies
            .iter()
            .find(|dep| dep.name == name)
            .map(|dep| dep.artifact_id.as_str())
    }
}
