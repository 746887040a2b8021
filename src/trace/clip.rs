use serde::Serialize;

use crate::trace::{OriginalSpan, TaskForest};

/// A time range in trace microseconds. Either end may be infinite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeWindow {
    pub start_ts: f64,
    pub end_ts: f64,
}

impl TimeWindow {
    pub fn new(start_ts: f64, end_ts: f64) -> Self {
        Self { start_ts, end_ts }
    }

    pub fn unbounded() -> Self {
        Self::new(f64::NEG_INFINITY, f64::INFINITY)
    }

    /// Length of the window in microseconds.
    pub fn length(&self) -> f64 {
        self.end_ts - self.start_ts
    }

    /// Moves `ts` to the nearest edge if it lies outside the window.
    pub fn clamp(&self, ts: f64) -> f64 {
        ts.max(self.start_ts).min(self.end_ts)
    }

    /// Whether `span` has any part strictly inside the window.
    pub fn overlaps(&self, span: OriginalSpan) -> bool {
        (span.end_ts as f64) > self.start_ts && (span.start_ts as f64) < self.end_ts
    }
}

impl TaskForest {
    /// Recomputes every node's times as seen through `window`.
    ///
    /// Times are always derived from the original spans, never from a
    /// previous clip, so clipping to one window and then another gives the
    /// same result as clipping to the second window directly.
    pub fn clip_to_window(&mut self, window: TimeWindow) {
        for node in &mut self.nodes {
            let OriginalSpan { start_ts, end_ts } = node.original;

            node.start_time = window.clamp(start_ts as f64) / 1000.0;
            node.end_time = window.clamp(end_ts as f64) / 1000.0;
            node.duration = node.end_time - node.start_time;
        }

        for index in 0..self.nodes.len() {
            let children: f64 = self.nodes[index]
                .children
                .iter()
                .map(|child| self.nodes[child.index()].duration)
                .sum();

            let node = &mut self.nodes[index];
            node.self_time = node.duration - children;
        }
    }
}
