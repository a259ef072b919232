use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use crate::graph::PackGraph;

pub fn auto_selection_reason(required_by: &str) -> String {
    format!("Required by {required_by}")
}

/// Computes which packs must be pulled in to satisfy `selected`.
///
/// Always recomputed from the complete explicit selection, so the reason
/// recorded for a pack depends only on the selection set and the graph, never
/// on the order in which packs were selected. Seeds and neighbours are visited
/// in sorted order; the first pack to reach a dependency names it.
pub fn resolve_auto_selections(
    selected: &BTreeSet<String>,
    graph: &PackGraph,
    installed: &BTreeSet<String>,
) -> BTreeMap<String, String> {
    let mut auto_selected = BTreeMap::new();
    let mut visited: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::new();

    for id in selected {
        if visited.insert(id.as_str()) {
            queue.push_back(id.as_str());
        }
    }

    while let Some(current) = queue.pop_front() {
        for dep in graph.dependencies_of(current) {
            if !visited.insert(dep) {
                continue;
            }
            if selected.contains(dep) || installed.contains(dep) {
                continue;
            }
            auto_selected.insert(dep.to_string(), auto_selection_reason(current));
            queue.push_back(dep);
        }
    }

    auto_selected
}
