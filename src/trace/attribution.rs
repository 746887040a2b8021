use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;

use crate::trace::groups::{is_browser_task, is_gc_task};
use crate::trace::{NetworkRecord, ResourceType, TaskForest, TaskGroup, TaskNode, TimeWindow};

/// Rows with less total time than this, in milliseconds, are dropped.
pub const NOISE_FLOOR_MS: f64 = 1.0;

/// Main thread time spent on behalf of one origin, in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginTotals {
    /// A script URL, or one of `Browser`, `Browser GC` and `Unattributable`.
    pub origin: String,
    pub total: f64,
    pub by_category: BTreeMap<TaskGroup, f64>,
}

impl OriginTotals {
    fn category(&self, group: TaskGroup) -> f64 {
        self.by_category.get(&group).copied().unwrap_or_default()
    }

    pub fn scripting(&self) -> f64 {
        self.category(TaskGroup::ScriptEvaluation)
    }

    pub fn layout(&self) -> f64 {
        self.category(TaskGroup::StyleLayout)
    }

    pub fn render(&self) -> f64 {
        self.category(TaskGroup::PaintCompositeRender)
    }
}

/// Clips the forest to `window` and sums the self time of every task by the
/// origin it is attributed to.
///
/// Rows are sorted by descending total, ties broken by origin; rows under
/// [`NOISE_FLOOR_MS`] are left out.
pub fn attribute_by_origin(
    forest: &mut TaskForest,
    window: TimeWindow,
    network_records: &[NetworkRecord],
) -> Vec<OriginTotals> {
    forest.clip_to_window(window);

    let scripts: HashSet<&str> = network_records
        .iter()
        .filter(|record| record.resource_type == ResourceType::Script)
        .map(|record| record.url.as_str())
        .collect();

    let mut by_origin: HashMap<&str, BTreeMap<TaskGroup, f64>> = HashMap::new();

    let roots = forest
        .roots()
        .iter()
        .filter(|&&root| window.overlaps(forest[root].original()));

    for &root in roots {
        for id in forest.descendants(root) {
            let node = &forest[id];
            if node.self_time() == 0.0 {
                continue;
            }

            *by_origin
                .entry(origin_of(node, &scripts))
                .or_default()
                .entry(node.group())
                .or_default() += node.self_time();
        }
    }

    let mut rows: Vec<OriginTotals> = by_origin
        .into_iter()
        .map(|(origin, by_category)| OriginTotals {
            origin: origin.to_string(),
            total: by_category.values().sum(),
            by_category,
        })
        .filter(|row| row.total >= NOISE_FLOOR_MS)
        .collect();

    rows.sort_by(|a, b| b.total.total_cmp(&a.total).then_with(|| a.origin.cmp(&b.origin)));
    rows
}

fn origin_of<'a>(node: &'a TaskNode, scripts: &HashSet<&str>) -> &'a str {
    let urls = node.attributable_urls();

    let url = urls
        .iter()
        .find(|url| scripts.contains(url.as_str()))
        .or_else(|| urls.first())
        .map(String::as_str);

    match url {
        Some(url) if url != "about:blank" => url,
        _ if is_browser_task(node.name()) => "Browser",
        _ if is_gc_task(node.name()) => "Browser GC",
        _ => "Unattributable",
    }
}
