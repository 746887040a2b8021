use std::collections::{HashMap, HashSet};

use crate::artifact::{
    ArtifactDeclaration, ArtifactPlan, DependencySymbol, ResolvedArtifactDefinition,
    ResolvedDependency,
};
use crate::error::ResolveError;

/// Resolves artifact declarations into an ordered plan.
///
/// The declarations are walked once, left to right. A dependency can only be
/// satisfied by an artifact declared *before* the one requesting it, so a
/// list that is merely out of order is rejected just like one that refers to
/// an artifact which does not exist. This is not a topological sort: the
/// declared order is the execution order, and it is never rearranged.
///
/// # Errors
///
/// Fails on the first declaration that:
/// * repeats an artifact id or a dependency symbol,
/// * has a gatherer supporting no phase,
/// * depends on a symbol no earlier declaration produces,
/// * depends on an artifact collected in an incompatible phase.
pub fn resolve(declarations: &[ArtifactDeclaration]) -> Result<ArtifactPlan, ResolveError> {
    let mut by_symbol: HashMap<DependencySymbol, usize> = HashMap::new();
    let mut ids: HashSet<&str> = HashSet::new();
    let mut resolved: Vec<ResolvedArtifactDefinition> = Vec::with_capacity(declarations.len());

    for declaration in declarations {
        let artifact_id = declaration.id.as_str();
        let gatherer = &declaration.gatherer;

        if !ids.insert(artifact_id) {
            return Err(ResolveError::DuplicateArtifactId(artifact_id.to_string()));
        }

        let dependent_phase = gatherer
            .phase()
            .ok_or_else(|| ResolveError::NoSupportedPhases(artifact_id.to_string()))?;

        let mut dependencies = Vec::with_capacity(gatherer.dependencies().len());

        for (name, symbol) in gatherer.dependencies() {
            let upstream = by_symbol
                .get(symbol)
                .map(|&index| &resolved[index])
                .ok_or_else(|| ResolveError::DependencyOrder {
                    artifact_id: artifact_id.to_string(),
                    dependency: name.clone(),
                })?;

            // An upstream artifact always has a phase, it was resolved already.
            let dependency_phase = upstream
                .gatherer()
                .phase()
                .ok_or_else(|| ResolveError::NoSupportedPhases(upstream.id().to_string()))?;

            if !dependent_phase.can_depend_on(dependency_phase) {
                return Err(ResolveError::DependencyPhase {
                    artifact_id: artifact_id.to_string(),
                    dependency: name.clone(),
                    dependent_phase,
                    dependency_phase,
                });
            }

            dependencies.push(ResolvedDependency {
                name: name.clone(),
                artifact_id: upstream.id().to_string(),
            });
        }

        if let Some(symbol) = gatherer.symbol() {
            if by_symbol.contains_key(&symbol) {
                return Err(ResolveError::DuplicateSymbol {
                    artifact_id: artifact_id.to_string(),
                });
            }

            by_symbol.insert(symbol, resolved.len());
        }

        tracing::debug!(
            artifact = artifact_id,
            phase = %dependent_phase,
            dependencies = dependencies.len(),
            "Resolved artifact"
        );

        resolved.push(ResolvedArtifactDefinition {
            id: artifact_id.to_string(),
            gatherer: gatherer.clone(),
            dependencies,
        });
    }

    Ok(ArtifactPlan::new(resolved))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::artifact::{GathererDefinition, Phase};

    fn declare(id: &str, gatherer: GathererDefinition) -> ArtifactDeclaration {
        ArtifactDeclaration::new(id, Arc::new(gatherer))
    }

    #[test]
    fn test_resolves_in_declaration_order() {
        let a = DependencySymbol::new("A");
        let b = DependencySymbol::new("B");

        let declarations = vec![
            declare("A", GathererDefinition::new("A", [Phase::Navigation]).produces(a)),
            declare(
                "B",
                GathererDefinition::new("B", [Phase::Navigation])
                    .produces(b)
                    .depends_on("A", a),
            ),
            declare(
                "C",
                GathererDefinition::new("C", [Phase::Navigation])
                    .depends_on("first", a)
                    .depends_on("second", b),
            ),
        ];

        let plan = resolve(&declarations).unwrap();
        let ids: Vec<_> = plan.iter().map(|def| def.id()).collect();
        assert_eq!(ids, ["A", "B", "C"]);

        assert!(plan.definitions()[0].dependencies().is_empty());
        assert_eq!(plan.definitions()[1].dependency("A"), Some("A"));
        assert_eq!(plan.definitions()[2].dependency("first"), Some("A"));
        assert_eq!(plan.definitions()[2].dependency("second"), Some("B"));
    }

    #[test]
    fn test_dependency_declared_later_fails() {
        let a = DependencySymbol::new("A");

        let declarations = vec![
            declare(
                "B",
                GathererDefinition::new("B", [Phase::Navigation]).depends_on("A", a),
            ),
            declare("A", GathererDefinition::new("A", [Phase::Navigation]).produces(a)),
        ];

        assert_eq!(
            resolve(&declarations).unwrap_err(),
            ResolveError::DependencyOrder {
                artifact_id: "B".into(),
                dependency: "A".into(),
            }
        );
    }

    #[test]
    fn test_dependency_never_declared_fails() {
        let missing = DependencySymbol::new("Missing");

        let declarations = vec![declare(
            "Lonely",
            GathererDefinition::new("Lonely", [Phase::Snapshot]).depends_on("input", missing),
        )];

        assert!(matches!(
            resolve(&declarations),
            Err(ResolveError::DependencyOrder { artifact_id, dependency })
                if artifact_id == "Lonely" && dependency == "input"
        ));
    }

    #[test]
    fn test_symbols_are_not_names() {
        let one = DependencySymbol::new("Shared");
        let other = DependencySymbol::new("Shared");

        let declarations = vec![
            declare("First", GathererDefinition::new("First", [Phase::Navigation]).produces(one)),
            declare(
                "Second",
                GathererDefinition::new("Second", [Phase::Navigation]).depends_on("dep", other),
            ),
        ];

        assert!(matches!(
            resolve(&declarations),
            Err(ResolveError::DependencyOrder { .. })
        ));
    }

    #[test]
    fn test_phase_mismatch_fails() {
        let trace = DependencySymbol::new("Trace");

        let declarations = vec![
            declare(
                "Trace",
                GathererDefinition::new("Trace", [Phase::Navigation]).produces(trace),
            ),
            declare(
                "Snap",
                GathererDefinition::new("Snap", [Phase::Snapshot, Phase::Navigation])
                    .depends_on("trace", trace),
            ),
        ];

        assert_eq!(
            resolve(&declarations).unwrap_err(),
            ResolveError::DependencyPhase {
                artifact_id: "Snap".into(),
                dependency: "trace".into(),
                dependent_phase: Phase::Snapshot,
                dependency_phase: Phase::Navigation,
            }
        );
    }

    #[test]
    fn test_navigation_may_depend_on_timespan() {
        let log = DependencySymbol::new("Log");

        let declarations = vec![
            declare(
                "Log",
                GathererDefinition::new("Log", [Phase::Timespan, Phase::Navigation]).produces(log),
            ),
            declare(
                "Nav",
                GathererDefinition::new("Nav", [Phase::Navigation]).depends_on("log", log),
            ),
        ];

        assert_eq!(resolve(&declarations).unwrap().len(), 2);
    }

    #[test]
    fn test_duplicate_id_fails() {
        let declarations = vec![
            declare("A", GathererDefinition::new("A", [Phase::Navigation])),
            declare("A", GathererDefinition::new("A2", [Phase::Navigation])),
        ];

        assert_eq!(
            resolve(&declarations).unwrap_err(),
            ResolveError::DuplicateArtifactId("A".into())
        );
    }

    #[test]
    fn test_duplicate_symbol_fails() {
        let symbol = DependencySymbol::new("A");
        let gatherer = Arc::new(GathererDefinition::new("A", [Phase::Navigation]).produces(symbol));

        let declarations = vec![
            ArtifactDeclaration::new("A", gatherer.clone()),
            ArtifactDeclaration::new("AlsoA", gatherer),
        ];

        assert_eq!(
            resolve(&declarations).unwrap_err(),
            ResolveError::DuplicateSymbol {
                artifact_id: "AlsoA".into()
            }
        );
    }

    #[test]
    fn test_no_phases_fails() {
        let declarations = vec![declare("Void", GathererDefinition::new("Void", []))];

        assert_eq!(
            resolve(&declarations).unwrap_err(),
            ResolveError::NoSupportedPhases("Void".into())
        );
    }

    #[test]
    fn test_empty_declarations() {
        assert!(resolve(&[]).unwrap().is_empty());
    }
}
