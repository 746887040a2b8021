use serde::{Deserialize, Serialize};

/// Category of main thread work, used to split execution time by kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskGroup {
    #[serde(rename = "parseHTML")]
    ParseHtml,
    StyleLayout,
    PaintCompositeRender,
    ScriptParseCompile,
    ScriptEvaluation,
    GarbageCollection,
    Other,
}

impl TaskGroup {
    /// Looks up the group of a trace event name. Names not listed here belong
    /// to the group of their parent task.
    pub fn from_event_name(name: &str) -> Option<Self> {
        let group = match name {
            "ParseHTML" | "ParseAuthorStyleSheet" => TaskGroup::ParseHtml,

            "ScheduleStyleRecalculation"
            | "RecalculateStyles"
            | "UpdateLayoutTree"
            | "InvalidateLayout"
            | "Layout" => TaskGroup::StyleLayout,

            "Animation" | "HitTest" | "PaintSetup" | "Paint" | "PaintImage" | "PrePaint"
            | "Layerize" | "RasterTask" | "ScrollLayer" | "UpdateLayer" | "UpdateLayerTree"
            | "CompositeLayers" => TaskGroup::PaintCompositeRender,

            "v8.compile" | "v8.compileModule" | "v8.parseOnBackground" => {
                TaskGroup::ScriptParseCompile
            }

            "EventDispatch" | "EvaluateScript" | "v8.evaluateModule" | "FunctionCall"
            | "TimerFire" | "FireIdleCallback" | "FireAnimationFrame" | "RunMicrotasks"
            | "V8.Execute" => TaskGroup::ScriptEvaluation,

            "MinorGC" | "MajorGC" | "BlinkGC.AtomicPhase" | "ThreadState::performIdleLazySweep"
            | "ThreadState::completeSweep" | "BlinkGCMarking" => TaskGroup::GarbageCollection,

            "MessageLoop::RunTask"
            | "TaskQueueManager::ProcessTaskFromWorkQueue"
            | "ThreadControllerImpl::DoWork" => TaskGroup::Other,

            _ => return None,
        };

        Some(group)
    }

    pub fn id(self) -> &'static str {
        match self {
            TaskGroup::ParseHtml => "parseHTML",
            TaskGroup::StyleLayout => "styleLayout",
            TaskGroup::PaintCompositeRender => "paintCompositeRender",
            TaskGroup::ScriptParseCompile => "scriptParseCompile",
            TaskGroup::ScriptEvaluation => "scriptEvaluation",
            TaskGroup::GarbageCollection => "garbageCollection",
            TaskGroup::Other => "other",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TaskGroup::ParseHtml => "Parse HTML & CSS",
            TaskGroup::StyleLayout => "Style & Layout",
            TaskGroup::PaintCompositeRender => "Rendering",
            TaskGroup::ScriptParseCompile => "Script Parsing & Compilation",
            TaskGroup::ScriptEvaluation => "Script Evaluation",
            TaskGroup::GarbageCollection => "Garbage Collection",
            TaskGroup::Other => "Other",
        }
    }
}

impl std::fmt::Display for TaskGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Work the browser does on its own behalf.
pub(crate) fn is_browser_task(name: &str) -> bool {
    name == "CpuProfiler::StartProfiling"
}

pub(crate) fn is_gc_task(name: &str) -> bool {
    matches!(name, "V8.GCCompactor" | "MajorGC" | "MinorGC")
}
