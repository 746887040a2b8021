use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{Blake3Hasher, Hash32};
use crate::error::TraceError;

/// Phase of a trace event, the `ph` field of the trace event format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventPhase {
    #[serde(rename = "B")]
    Begin,
    #[serde(rename = "E")]
    End,
    #[serde(rename = "X")]
    Complete,
    #[serde(rename = "I", alias = "i")]
    Instant,
    #[serde(rename = "M")]
    Metadata,
    #[serde(rename = "b")]
    AsyncBegin,
    #[serde(rename = "e")]
    AsyncEnd,
    #[serde(other)]
    Other,
}

/// A single raw trace event as recorded by the browser.
///
/// Timestamps and durations are in microseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub pid: u32,
    pub tid: u32,
    pub ts: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dur: Option<i64>,
    pub ph: EventPhase,
    #[serde(default)]
    pub cat: String,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

impl TraceEvent {
    /// `args.data`, where most events keep their payload.
    pub fn data(&self) -> Option<&Value> {
        self.args.get("data")
    }
}

// Args are free-form JSON, which has no `Hash` of its own. The compact JSON
// rendering is deterministic since object keys are kept sorted.
impl Hash for TraceEvent {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.pid.hash(state);
        self.tid.hash(state);
        self.ts.hash(state);
        self.dur.hash(state);
        self.ph.hash(state);
        self.cat.hash(state);
        self.name.hash(state);
        self.args.to_string().hash(state);
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TraceFile {
    Array(Vec<TraceEvent>),
    Object {
        #[serde(rename = "traceEvents")]
        trace_events: Vec<TraceEvent>,
    },
}

/// An immutable list of trace events with a precomputed fingerprint.
///
/// Cloning is cheap, and hashing only feeds the fingerprint, so a trace can
/// be used as the input of computed artifacts without rehashing every event.
#[derive(Debug, Clone)]
pub struct Trace {
    events: Arc<[TraceEvent]>,
    fingerprint: Hash32,
}

impl Trace {
    pub fn new(events: Vec<TraceEvent>) -> Self {
        let mut hasher = Blake3Hasher::default();
        events.hash(&mut hasher);

        Self {
            events: events.into(),
            fingerprint: hasher.into(),
        }
    }

    /// Reads a trace in either the JSON array or the JSON object format.
    pub fn from_json(json: &str) -> Result<Self, TraceError> {
        let events = match serde_json::from_str(json)? {
            TraceFile::Array(events) => events,
            TraceFile::Object { trace_events } => trace_events,
        };

        Ok(Trace::new(events))
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    pub fn fingerprint(&self) -> Hash32 {
        self.fingerprint
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl Hash for Trace {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.fingerprint.hash(state);
    }
}

impl PartialEq for Trace {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint == other.fingerprint
    }
}

impl Eq for Trace {}

/// Kind of resource fetched by a network request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    Document,
    Stylesheet,
    Image,
    Media,
    Font,
    Script,
    #[serde(rename = "XHR")]
    Xhr,
    Fetch,
    #[serde(other)]
    Other,
}

/// The part of a network request record needed to attribute execution time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRecord {
    pub url: String,
    pub resource_type: ResourceType,
}

impl NetworkRecord {
    pub fn new(url: impl Into<String>, resource_type: ResourceType) -> Self {
        Self {
            url: url.into(),
            resource_type,
        }
    }
}
