use std::collections::{BTreeMap, BTreeSet};

use crate::graph::PackGraph;

/// Orders `ids` so every pack comes after the dependencies that are also in
/// `ids`. Packs caught in a cycle cannot be ordered and are appended in sorted
/// order.
pub fn dependency_order(ids: &BTreeSet<String>, graph: &PackGraph) -> Vec<String> {
    let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();
    let mut reverse: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();

    for id in ids {
        in_degree.insert(id.as_str(), 0);
        reverse.entry(id.as_str()).or_default();
    }

    for id in ids {
        for dep in graph.dependencies_of(id) {
            if !ids.contains(dep) {
                continue;
            }
            if let Some(degree) = in_degree.get_mut(id.as_str()) {
                *degree += 1;
            }
            reverse.entry(dep).or_default().insert(id.as_str());
        }
    }

    let mut ready: BTreeSet<&str> = in_degree
        .iter()
        .filter_map(|(id, degree)| (*degree == 0).then_some(*id))
        .collect();
    let mut ordered: Vec<String> = Vec::with_capacity(ids.len());
    let mut placed: BTreeSet<&str> = BTreeSet::new();

    while let Some(next) = ready.pop_first() {
        ordered.push(next.to_string());
        placed.insert(next);
        if let Some(children) = reverse.get(next) {
            for child in children {
                if let Some(degree) = in_degree.get_mut(child) {
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 {
                        ready.insert(*child);
                    }
                }
            }
        }
    }

    ordered.extend(
        ids.iter()
            .filter(|id| !placed.contains(id.as_str()))
            .cloned(),
    );
    ordered
}
