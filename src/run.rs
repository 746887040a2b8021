use std::sync::Arc;

use crate::cache::ComputedCache;
use crate::core::{Outcome, Settings};
use crate::error::ComputeError;
use crate::trace::{
    BreakdownRequest, InteractionBreakdown, MainThreadTasks, NetworkRecord, PhaseBreakdown,
    TaskForest, Trace,
};

/// State of one audit run: its settings and the cache every audit of the run
/// shares. Create one per run and drop it when the run ends.
#[derive(Debug, Default)]
pub struct AuditRun {
    settings: Settings,
    cache: ComputedCache,
}

impl AuditRun {
    pub fn new(settings: Settings) -> Self {
        tracing::debug!(throttling = ?settings.throttling_method, "Starting audit run");

        Self {
            settings,
            cache: ComputedCache::new(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn cache(&self) -> &ComputedCache {
        &self.cache
    }

    /// Task tree of the renderer main thread in `trace`.
    pub fn main_thread_tasks(&self, trace: &Trace) -> Result<Arc<TaskForest>, ComputeError> {
        self.cache.get::<MainThreadTasks>(trace)
    }

    /// Per-origin breakdown of the slowest interaction in `trace`.
    pub fn interaction_breakdown(
        &self,
        trace: &Trace,
        network_records: &[NetworkRecord],
    ) -> Result<Arc<Outcome<PhaseBreakdown>>, ComputeError> {
        let request = BreakdownRequest {
            trace: trace.clone(),
            network_records: network_records.to_vec(),
            settings: self.settings,
        };

        self.cache.get::<InteractionBreakdown>(&request)
    }
}
