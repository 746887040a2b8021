use std::cmp::Reverse;
use std::ops::Index;

use serde_json::Value;

use crate::error::MalformedTrace;
use crate::trace::clip::TimeWindow;
use crate::trace::{EventPhase, TaskGroup, ThreadFilter, TraceEvent};

/// Index of a node in its [`TaskForest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// The span of a task as recorded in the trace, in microseconds. It never
/// changes after the tree is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OriginalSpan {
    pub start_ts: i64,
    pub end_ts: i64,
}

impl OriginalSpan {
    /// Duration in milliseconds, computed the same way as for a clipped
    /// node so that clipping to an unbounded window is exact.
    pub fn duration_ms(&self) -> f64 {
        self.end_ts as f64 / 1000.0 - self.start_ts as f64 / 1000.0
    }
}

/// A span of work on one thread.
///
/// `start_time`, `end_time`, `duration` and `self_time` are in milliseconds
/// and reflect the last window the forest was clipped to.
#[derive(Debug, Clone)]
pub struct TaskNode {
    pub(crate) event: TraceEvent,
    pub(crate) original: OriginalSpan,
    pub(crate) start_time: f64,
    pub(crate) end_time: f64,
    pub(crate) duration: f64,
    pub(crate) self_time: f64,
    pub(crate) group: TaskGroup,
    pub(crate) attributable_urls: Vec<String>,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
}

impl TaskNode {
    pub fn name(&self) -> &str {
        &self.event.name
    }

    /// The begin or complete event this task was built from.
    pub fn event(&self) -> &TraceEvent {
        &self.event
    }

    pub fn original(&self) -> OriginalSpan {
        self.original
    }

    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    pub fn end_time(&self) -> f64 {
        self.end_time
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn self_time(&self) -> f64 {
        self.self_time
    }

    pub fn group(&self) -> TaskGroup {
        self.group
    }

    pub fn attributable_urls(&self) -> &[String] {
        &self.attributable_urls
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

/// The tasks of one thread, nested by containment.
///
/// Nodes live in an arena in preorder: a parent always comes before its
/// children, and siblings are ordered by start time.
#[derive(Debug, Clone, Default)]
pub struct TaskForest {
    pub(crate) nodes: Vec<TaskNode>,
    roots: Vec<NodeId>,
    warnings: Vec<MalformedTrace>,
}

struct Span<'a> {
    event: &'a TraceEvent,
    start_ts: i64,
    end_ts: i64,
    seq: usize,
}

impl TaskForest {
    /// Builds the task tree of the thread selected by `filter`.
    ///
    /// Events that can't be placed are dropped and reported in
    /// [`warnings`](Self::warnings); the rest of the tree is still built.
    pub fn build(events: &[TraceEvent], filter: ThreadFilter) -> Self {
        let mut events: Vec<&TraceEvent> = events.iter().filter(|e| filter.matches(e)).collect();
        events.sort_by_key(|e| e.ts);

        let mut warnings = Vec::new();
        let mut spans = pair_events(&events, &mut warnings);
        spans.sort_by_key(|span| (span.start_ts, Reverse(span.end_ts), span.seq));

        let mut forest = TaskForest {
            nodes: Vec::with_capacity(spans.len()),
            roots: Vec::new(),
            warnings,
        };

        let mut stack: Vec<NodeId> = Vec::new();

        for span in spans {
            while let Some(&top) = stack.last() {
                if span.start_ts >= forest[top].original.end_ts {
                    stack.pop();
                } else {
                    break;
                }
            }

            let parent = stack.last().copied();

            if let Some(parent) = parent {
                if span.end_ts > forest[parent].original.end_ts {
                    forest.warn(MalformedTrace::Overlap {
                        name: span.event.name.clone(),
                        ts: span.start_ts,
                        parent: forest[parent].name().to_string(),
                    });
                    continue;
                }
            }

            let id = forest.push(span, parent);
            stack.push(id);
        }

        forest.annotate();
        forest.clip_to_window(TimeWindow::unbounded());

        tracing::debug!(
            pid = filter.pid,
            tid = filter.tid,
            nodes = forest.nodes.len(),
            dropped = forest.warnings.len(),
            "Built task tree"
        );

        forest
    }

    fn warn(&mut self, warning: MalformedTrace) {
        tracing::warn!("{warning}");
        self.warnings.push(warning);
    }

    fn push(&mut self, span: Span<'_>, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        let original = OriginalSpan {
            start_ts: span.start_ts,
            end_ts: span.end_ts,
        };

        self.nodes.push(TaskNode {
            event: span.event.clone(),
            original,
            start_time: 0.0,
            end_time: 0.0,
            duration: 0.0,
            self_time: 0.0,
            group: TaskGroup::Other,
            attributable_urls: Vec::new(),
            parent,
            children: Vec::new(),
        });

        match parent {
            Some(parent) => self.nodes[parent.0].children.push(id),
            None => self.roots.push(id),
        }

        id
    }

    /// Fills in groups and attributable URLs, both inherited from parents.
    fn annotate(&mut self) {
        for index in 0..self.nodes.len() {
            let (group, mut urls) = match self.nodes[index].parent {
                Some(parent) => {
                    let parent = &self.nodes[parent.0];
                    (parent.group, parent.attributable_urls.clone())
                }
                None => (TaskGroup::Other, Vec::new()),
            };

            let node = &mut self.nodes[index];

            for url in own_urls(&node.event) {
                if !urls.iter().any(|known| known == url) {
                    urls.push(url.to_string());
                }
            }

            node.group = TaskGroup::from_event_name(node.name()).unwrap_or(group);
            node.attributable_urls = urls;
        }
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn node(&self, id: NodeId) -> Option<&TaskNode> {
        self.nodes.get(id.0)
    }

    pub fn children(&self, id: NodeId) -> impl Iterator<Item = &TaskNode> {
        self[id].children.iter().map(|&child| &self[child])
    }

    pub fn parent(&self, id: NodeId) -> Option<&TaskNode> {
        self[id].parent.map(|parent| &self[parent])
    }

    /// Every node in preorder.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &TaskNode)> {
        self.nodes.iter().enumerate().map(|(i, node)| (NodeId(i), node))
    }

    /// `id` and everything below it, in preorder.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];

        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self[next].children.iter().rev());
        }

        out
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Events that were dropped while building the tree.
    pub fn warnings(&self) -> &[MalformedTrace] {
        &self.warnings
    }
}

impl Index<NodeId> for TaskForest {
    type Output = TaskNode;

    fn index(&self, id: NodeId) -> &TaskNode {
        &self.nodes[id.0]
    }
}

/// Turns begin/end pairs and complete events into spans. Begin events are
/// closed by the latest open begin event of the same name; an end event
/// without a name closes the latest open begin event.
fn pair_events<'a>(events: &[&'a TraceEvent], warnings: &mut Vec<MalformedTrace>) -> Vec<Span<'a>> {
    let mut spans = Vec::new();
    let mut open: Vec<(usize, &TraceEvent)> = Vec::new();

    for (seq, &event) in events.iter().enumerate() {
        match event.ph {
            EventPhase::Begin => open.push((seq, event)),
            EventPhase::End => {
                let position = if event.name.is_empty() {
                    open.len().checked_sub(1)
                } else {
                    open.iter().rposition(|(_, begin)| begin.name == event.name)
                };

                match position {
                    Some(position) => {
                        let (seq, begin) = open.remove(position);
                        spans.push(Span {
                            event: begin,
                            start_ts: begin.ts,
                            end_ts: event.ts,
                            seq,
                        });
                    }
                    None => warnings.push(MalformedTrace::UnmatchedEnd {
                        name: event.name.clone(),
                        ts: event.ts,
                    }),
                }
            }
            EventPhase::Complete => match event.dur {
                Some(dur) if dur >= 0 => spans.push(Span {
                    event,
                    start_ts: event.ts,
                    end_ts: event.ts.saturating_add(dur),
                    seq,
                }),
                _ => warnings.push(MalformedTrace::InvalidDuration {
                    name: event.name.clone(),
                    ts: event.ts,
                }),
            },
            _ => {}
        }
    }

    for (_, begin) in open {
        warnings.push(MalformedTrace::UnmatchedBegin {
            name: begin.name.clone(),
            ts: begin.ts,
        });
    }

    for warning in warnings.iter() {
        tracing::warn!("{warning}");
    }

    spans
}

/// URLs the event itself points at.
fn own_urls(event: &TraceEvent) -> Vec<&str> {
    let mut urls = Vec::new();
    let data = event.data();

    match event.name.as_str() {
        "v8.compile" | "EvaluateScript" | "FunctionCall" => {
            urls.extend(data.and_then(|d| d.get("url")).and_then(Value::as_str));
        }
        "v8.compileModule" => {
            urls.extend(event.args.get("fileName").and_then(Value::as_str));
        }
        _ => {}
    }

    let stack = data
        .and_then(|d| d.get("stackTrace"))
        .and_then(Value::as_array)
        .into_iter()
        .flatten();

    urls.extend(stack.filter_map(|frame| frame.get("url").and_then(Value::as_str)));
    urls.retain(|url| !url.is_empty());
    urls
}
