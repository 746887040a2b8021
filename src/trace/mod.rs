//! Trace analysis: from a flat list of trace events to per-origin main
//! thread time during each phase of an interaction.
//!
//! The pipeline is:
//! 1. [`ThreadFilter::main_thread`] finds the renderer main thread.
//! 2. [`TaskForest::build`] nests its events into a forest of tasks.
//! 3. [`get_phase_times`] splits the slowest interaction into three windows.
//! 4. [`attribute_by_origin`] clips the forest to a window and sums self time
//!    by origin and [`TaskGroup`].
//!
//! [`InteractionBreakdown`] runs all of it as a cached computation.

mod attribution;
mod breakdown;
mod clip;
mod event;
mod groups;
mod interaction;
mod thread;
mod tree;

pub use crate::trace::attribution::{NOISE_FLOOR_MS, OriginTotals, attribute_by_origin};
pub use crate::trace::breakdown::{
    BreakdownRequest, InteractionBreakdown, MainThreadTasks, PhaseBreakdown, PhaseEntry,
};
pub use crate::trace::clip::TimeWindow;
pub use crate::trace::event::{EventPhase, NetworkRecord, ResourceType, Trace, TraceEvent};
pub use crate::trace::groups::TaskGroup;
pub use crate::trace::interaction::{
    InteractionEvent, InteractionPhase, PhaseTimes, get_phase_times, select_interaction,
};
pub use crate::trace::thread::ThreadFilter;
pub use crate::trace::tree::{NodeId, OriginalSpan, TaskForest, TaskNode};
