use std::collections::{BTreeMap, BTreeSet};

use crate::graph::PackGraph;

/// Packs in `among` that list `pack` as a direct dependency, sorted.
pub fn direct_dependents(graph: &PackGraph, pack: &str, among: &BTreeSet<String>) -> Vec<String> {
    graph
        .dependents_of(pack)
        .filter(|dependent| among.contains(*dependent))
        .map(str::to_string)
        .collect()
}

/// Maps each pack proposed for removal to the remaining packs that still need
/// it. An empty map means every removal is safe.
pub fn validate_removal(
    graph: &PackGraph,
    remove: &BTreeSet<String>,
    remaining_selected: &BTreeSet<String>,
) -> BTreeMap<String, Vec<String>> {
    let mut blocked = BTreeMap::new();
    for pack in remove {
        let dependents: Vec<String> = remaining_selected
            .iter()
            .filter(|candidate| !remove.contains(*candidate))
            .filter(|candidate| graph.depends_on(candidate, pack))
            .cloned()
            .collect();
        if !dependents.is_empty() {
            blocked.insert(pack.clone(), dependents);
        }
    }
    blocked
}
