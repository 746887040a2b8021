use std::collections::{HashMap, HashSet};

use petgraph::Graph;
use petgraph::graph::NodeIndex;

use crate::artifact::{Phase, ResolvedArtifactDefinition};

/// The ordered list of resolved artifact definitions.
///
/// The collection orchestrator runs the gatherers in exactly this order.
#[derive(Debug, Clone, Default)]
pub struct ArtifactPlan {
    definitions: Vec<ResolvedArtifactDefinition>,
}

impl ArtifactPlan {
    pub(crate) fn new(definitions: Vec<ResolvedArtifactDefinition>) -> Self {
        Self { definitions }
    }

    pub fn definitions(&self) -> &[ResolvedArtifactDefinition] {
        &self.definitions
    }

    pub fn into_definitions(self) -> Vec<ResolvedArtifactDefinition> {
        self.definitions
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ResolvedArtifactDefinition> {
        self.definitions.iter()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&ResolvedArtifactDefinition> {
        self.definitions.iter().find(|def| def.id() == id)
    }

    /// Keeps only the artifacts that can be collected in `phase`.
    ///
    /// An artifact whose dependency is dropped is dropped as well, since it
    /// would have nothing to consume.
    pub fn for_phase(&self, phase: Phase) -> ArtifactPlan {
        let mut kept: HashSet<&str> = HashSet::new();
        let mut definitions = Vec::new();

        for definition in &self.definitions {
            let runnable = definition.gatherer().supports(phase)
                && definition
                    .dependencies()
                    .iter()
                    .all(|dep| kept.contains(dep.artifact_id.as_str()));

            if runnable {
                kept.insert(definition.id());
                definitions.push(definition.clone());
            } else {
                tracing::debug!(artifact = definition.id(), %phase, "Skipping artifact");
            }
        }

        ArtifactPlan { definitions }
    }

    /// Builds the dependency graph of the plan. Edges point from a dependency
    /// to its dependent and carry the dependency name.
    pub fn graph(&self) -> Graph<&str, &str> {
        let mut graph = Graph::new();
        let mut indices: HashMap<&str, NodeIndex> = HashMap::new();

        for definition in &self.definitions {
            let index = graph.add_node(definition.id());
            indices.insert(definition.id(), index);

            for dependency in definition.dependencies() {
                if let Some(&source) = indices.get(dependency.artifact_id.as_str()) {
                    graph.add_edge(source, index, dependency.name.as_str());
                }
            }
        }

        graph
    }
}

impl<'a> IntoIterator for &'a ArtifactPlan {
    type Item = &'a ResolvedArtifactDefinition;
    type IntoIter = std::slice::Iter<'a, ResolvedArtifactDefinition>;

    fn into_iter(self) -> Self::IntoIter {
        self.definitions.iter()
    }
}

/// Renders the plan as a Mermaid flowchart.
impl std::fmt::Display for ArtifactPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let graph = self.graph();

        writeln!(f, "graph LR")?;

        for index in graph.node_indices() {
            let definition = &self.definitions[index.index()];
            let name = definition.id().replace('"', "\\\"");
            let phase = definition
                .gatherer()
                .phase()
                .map(Phase::as_str)
                .unwrap_or("?");
            writeln!(f, "    {}[\"{} ({})\"]", index.index(), name, phase)?;
        }

        for edge in graph.edge_indices() {
            if let Some((source, target)) = graph.edge_endpoints(edge) {
                let label = graph[edge].replace('"', "\\\"");
                writeln!(
                    f,
                    "    {} -- \"{}\" --> {}",
                    source.index(),
                    label,
                    target.index()
                )?;
            }
        }

        Ok(())
    }
}
