use serde_json::Value;

use crate::error::TraceError;
use crate::trace::{EventPhase, Trace, TraceEvent};

/// Selects the events of one thread of one process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadFilter {
    pub pid: u32,
    pub tid: u32,
}

impl ThreadFilter {
    pub fn new(pid: u32, tid: u32) -> Self {
        Self { pid, tid }
    }

    pub fn matches(&self, event: &TraceEvent) -> bool {
        event.pid == self.pid && event.tid == self.tid
    }

    /// Locates the main thread of the renderer that hosted the page.
    ///
    /// Recent traces start with `TracingStartedInBrowser`, which lists the
    /// frames; the process of the main frame is the renderer, and its main
    /// thread is named `CrRendererMain`. Older traces mark the renderer main
    /// thread directly with `TracingStartedInPage`.
    pub fn main_thread(trace: &Trace) -> Result<Self, TraceError> {
        let events = trace.events();

        let started = events.iter().find(|event| {
            event.name == "TracingStartedInBrowser" || event.name == "TracingStartedInPage"
        });

        let Some(started) = started else {
            return Err(TraceError::NoMainThread);
        };

        if started.name == "TracingStartedInPage" {
            return Ok(Self::new(started.pid, started.tid));
        }

        let pid = main_frame_process(started).ok_or(TraceError::NoMainThread)?;

        let renderer = events.iter().find(|event| {
            event.ph == EventPhase::Metadata
                && event.pid == pid
                && event.name == "thread_name"
                && event.args.get("name").and_then(Value::as_str) == Some("CrRendererMain")
        });

        match renderer {
            Some(event) => {
                tracing::debug!(pid, tid = event.tid, "Found renderer main thread");
                Ok(Self::new(pid, event.tid))
            }
            None => Err(TraceError::NoMainThread),
        }
    }
}

fn main_frame_process(started: &TraceEvent) -> Option<u32> {
    started
        .data()?
        .get("frames")?
        .as_array()?
        .iter()
        .find(|frame| frame.get("parent").is_none_or(Value::is_null))?
        .get("processId")?
        .as_u64()
        .and_then(|pid| u32::try_from(pid).ok())
}
