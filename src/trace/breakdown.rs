use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{Level, span};

use crate::cache::{Computation, Session};
use crate::core::{Outcome, Settings, ThrottlingMethod};
use crate::trace::{
    InteractionEvent, InteractionPhase, NetworkRecord, OriginTotals, TaskForest, ThreadFilter,
    TimeWindow, Trace, attribute_by_origin, get_phase_times, select_interaction,
};

/// The task tree of the renderer main thread.
pub struct MainThreadTasks;

impl Computation for MainThreadTasks {
    const NAME: &'static str = "MainThreadTasks";
    type Input = Trace;
    type Output = TaskForest;

    fn compute(_: &Session<'_>, trace: &Trace) -> anyhow::Result<TaskForest> {
        let filter = ThreadFilter::main_thread(trace)?;
        Ok(TaskForest::build(trace.events(), filter))
    }
}

/// Everything an interaction breakdown depends on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BreakdownRequest {
    pub trace: Trace,
    pub network_records: Vec<NetworkRecord>,
    pub settings: Settings,
}

/// One phase of the interaction and the work that happened during it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseEntry {
    pub window: TimeWindow,
    pub per_origin_totals: Vec<OriginTotals>,
}

/// Main thread work per origin during each phase of the slowest interaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseBreakdown {
    pub interaction: InteractionEvent,
    pub phases: BTreeMap<InteractionPhase, PhaseEntry>,
}

impl PhaseBreakdown {
    pub fn phase(&self, phase: InteractionPhase) -> Option<&PhaseEntry> {
        self.phases.get(&phase)
    }
}

/// Breaks the slowest interaction of a trace down into its three phases.
///
/// Not applicable under simulated throttling, where trace timings don't
/// reflect the reported metrics, nor when the trace holds no interaction.
pub struct InteractionBreakdown;

impl Computation for InteractionBreakdown {
    const NAME: &'static str = "InteractionBreakdown";
    type Input = BreakdownRequest;
    type Output = Outcome<PhaseBreakdown>;

    fn compute(
        session: &Session<'_>,
        request: &BreakdownRequest,
    ) -> anyhow::Result<Outcome<PhaseBreakdown>> {
        if request.settings.throttling_method == ThrottlingMethod::Simulate {
            return Ok(Outcome::not_applicable(
                "Interaction breakdown is unavailable with simulated throttling",
            ));
        }

        let Some(interaction) = select_interaction(&request.trace)? else {
            return Ok(Outcome::not_applicable("No interaction found in the trace"));
        };

        let forest = session.get::<MainThreadTasks>(&request.trace)?;
        let times = get_phase_times(&interaction);

        let parent = span!(Level::DEBUG, "breakdown", interaction = interaction.interaction_id);
        let _enter = parent.enter();

        let phases = times
            .windows()
            .to_vec()
            .into_par_iter()
            .map(|(phase, window)| {
                let _enter = span!(parent: &parent, Level::TRACE, "phase", ?phase).entered();

                let mut forest = TaskForest::clone(&forest);
                let per_origin_totals =
                    attribute_by_origin(&mut forest, window, &request.network_records);

                (
                    phase,
                    PhaseEntry {
                        window,
                        per_origin_totals,
                    },
                )
            })
            .collect();

        Ok(Outcome::Applicable(PhaseBreakdown {
            interaction,
            phases,
        }))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;
    use crate::cache::{CacheStats, ComputedCache};
    use crate::trace::ResourceType;

    const APP: &str = "https://example.com/app.js";

    fn trace() -> Trace {
        let task = |name: &str, ts: i64, dur: i64, args: Value| {
            json!({"pid": 20, "tid": 5, "ts": ts, "dur": dur, "ph": "X", "cat": "devtools.timeline", "name": name, "args": args})
        };

        let events = json!([
            {"pid": 10, "tid": 1, "ts": 0, "ph": "I", "name": "TracingStartedInBrowser", "args": {"data": {"frames": [{"frame": "F", "processId": 20}]}}},
            {"pid": 20, "tid": 5, "ts": 0, "ph": "M", "name": "thread_name", "args": {"name": "CrRendererMain"}},
            {"pid": 20, "tid": 5, "ts": 1_000_000, "ph": "b", "cat": "devtools.timeline", "name": "EventTiming", "args": {"data": {
                "timeStamp": 1000.0, "processingStart": 1010.0, "processingEnd": 1050.0, "duration": 80.0,
                "type": "click", "interactionId": 9
            }}},
            task("RunTask", 990_000, 15_000, json!({})),
            task("RunTask", 1_010_000, 40_000, json!({})),
            task("FunctionCall", 1_012_000, 30_000, json!({"data": {"url": APP}})),
            task("Paint", 1_060_000, 5_000, json!({}))
        ]);

        Trace::from_json(&events.to_string()).unwrap()
    }

    fn request(settings: Settings) -> BreakdownRequest {
        BreakdownRequest {
            trace: trace(),
            network_records: vec![NetworkRecord::new(APP, ResourceType::Script)],
            settings,
        }
    }

    fn devtools() -> Settings {
        Settings {
            throttling_method: ThrottlingMethod::Devtools,
        }
    }

    #[test]
    fn test_breakdown() {
        let cache = ComputedCache::new();
        let outcome = cache.get::<InteractionBreakdown>(&request(devtools())).unwrap();
        let breakdown = outcome.applicable_ref().unwrap();

        let input = breakdown.phase(InteractionPhase::InputDelay).unwrap();
        assert_eq!(input.window, TimeWindow::new(1_000_000.0, 1_010_000.0));
        assert_eq!(input.per_origin_totals.len(), 1);
        assert_eq!(input.per_origin_totals[0].origin, "Unattributable");
        assert_eq!(input.per_origin_totals[0].total, 5.0);

        let processing = breakdown.phase(InteractionPhase::ProcessingDelay).unwrap();
        let origins: Vec<_> = processing
            .per_origin_totals
            .iter()
            .map(|row| (row.origin.as_str(), row.total))
            .collect();
        assert_eq!(origins, [(APP, 30.0), ("Unattributable", 10.0)]);
        assert_eq!(processing.per_origin_totals[0].scripting(), 30.0);

        let presentation = breakdown.phase(InteractionPhase::PresentationDelay).unwrap();
        assert_eq!(presentation.window.end_ts, 1_080_000.0);
        assert_eq!(presentation.per_origin_totals[0].render(), 5.0);
    }

    #[test]
    fn test_task_tree_is_shared() {
        let cache = ComputedCache::new();

        cache.get::<InteractionBreakdown>(&request(devtools())).unwrap();
        cache.get::<InteractionBreakdown>(&request(devtools())).unwrap();

        let forest = cache.get::<MainThreadTasks>(&trace()).unwrap();
        assert_eq!(forest.len(), 4);

        // Breakdown and task tree ran once each; the rest were hits.
        assert_eq!(cache.stats(), CacheStats { hits: 2, misses: 2 });
    }

    #[test]
    fn test_simulated_throttling_is_not_applicable() {
        let cache = ComputedCache::new();
        let outcome = cache.get::<InteractionBreakdown>(&request(Settings::default())).unwrap();

        assert!(!outcome.is_applicable());
        // The task tree was never requested.
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_no_interaction_is_not_applicable() {
        let cache = ComputedCache::new();
        let request = BreakdownRequest {
            trace: Trace::new(Vec::new()),
            network_records: Vec::new(),
            settings: devtools(),
        };

        let outcome = cache.get::<InteractionBreakdown>(&request).unwrap();
        assert!(matches!(&*outcome, Outcome::NotApplicable(reason) if reason.contains("interaction")));
    }

    #[test]
    fn test_missing_main_thread_fails() {
        let events = json!([
            {"pid": 20, "tid": 5, "ts": 1_000_000, "ph": "b", "name": "EventTiming", "args": {"data": {
                "timeStamp": 1000.0, "processingStart": 1010.0, "processingEnd": 1050.0, "duration": 80.0,
                "type": "click", "interactionId": 9
            }}}
        ]);

        let request = BreakdownRequest {
            trace: Trace::from_json(&events.to_string()).unwrap(),
            network_records: Vec::new(),
            settings: devtools(),
        };

        let err = ComputedCache::new()
            .get::<InteractionBreakdown>(&request)
            .unwrap_err();
        assert!(err.to_string().contains("renderer main thread"));
    }
}
