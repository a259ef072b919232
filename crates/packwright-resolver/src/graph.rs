use std::collections::{BTreeMap, BTreeSet};

use packwright_core::PackDefinition;

/// Containment and dependency adjacency for one manifest snapshot.
///
/// Built once per snapshot and never mutated; callers may cache it keyed by
/// whatever identifies the snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackGraph {
    contains: BTreeMap<String, Vec<String>>,
    depends: BTreeMap<String, BTreeSet<String>>,
    dependents: BTreeMap<String, BTreeSet<String>>,
    missing: BTreeMap<String, BTreeSet<String>>,
    self_dependencies: BTreeSet<String>,
    roots: Vec<String>,
    cycle_members: Vec<String>,
}

impl PackGraph {
    pub fn build(packs: &[PackDefinition]) -> Self {
        let mut graph = Self::default();

        for pack in packs {
            graph.contains.insert(
                pack.id.clone(),
                pack.page_keys().map(str::to_string).collect(),
            );
            graph.depends.entry(pack.id.clone()).or_default();
            graph.dependents.entry(pack.id.clone()).or_default();
        }

        for pack in packs {
            for dep in &pack.depends_on {
                if dep == &pack.id {
                    graph.self_dependencies.insert(pack.id.clone());
                    continue;
                }
                if !graph.contains.contains_key(dep) {
                    graph
                        .missing
                        .entry(pack.id.clone())
                        .or_default()
                        .insert(dep.clone());
                    continue;
                }
                graph
                    .depends
                    .entry(pack.id.clone())
                    .or_default()
                    .insert(dep.clone());
                graph
                    .dependents
                    .entry(dep.clone())
                    .or_default()
                    .insert(pack.id.clone());
            }
        }

        graph.roots = graph
            .depends
            .iter()
            .filter_map(|(id, deps)| deps.is_empty().then(|| id.clone()))
            .collect();
        graph.cycle_members = graph.unordered_nodes();
        graph
    }

    /// Kahn's algorithm over the dependency subgraph; whatever is never
    /// released to the ready set sits on or behind a cycle.
    fn unordered_nodes(&self) -> Vec<String> {
        let mut in_degree: BTreeMap<&str, usize> = self
            .depends
            .iter()
            .map(|(id, deps)| (id.as_str(), deps.len()))
            .collect();

        let mut ready: BTreeSet<&str> = in_degree
            .iter()
            .filter_map(|(id, degree)| (*degree == 0).then_some(*id))
            .collect();
        let mut visited: BTreeSet<&str> = BTreeSet::new();

        while let Some(next) = ready.pop_first() {
            visited.insert(next);
            if let Some(children) = self.dependents.get(next) {
                for child in children {
                    if let Some(degree) = in_degree.get_mut(child.as_str()) {
                        *degree = degree.saturating_sub(1);
                        if *degree == 0 {
                            ready.insert(child.as_str());
                        }
                    }
                }
            }
        }

        self.depends
            .keys()
            .filter(|id| !visited.contains(id.as_str()))
            .cloned()
            .collect()
    }

    pub fn contains_pack(&self, id: &str) -> bool {
        self.contains.contains_key(id)
    }

    pub fn pack_ids(&self) -> impl Iterator<Item = &str> {
        self.contains.keys().map(String::as_str)
    }

    pub fn node_count(&self) -> usize {
        self.contains.len()
    }

    /// Page keys owned by a pack, in manifest order.
    pub fn pages_of(&self, id: &str) -> &[String] {
        self.contains.get(id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Known direct dependencies of a pack, self-edges and unknown ids removed.
    pub fn dependencies_of(&self, id: &str) -> impl Iterator<Item = &str> {
        self.depends
            .get(id)
            .into_iter()
            .flat_map(|deps| deps.iter().map(String::as_str))
    }

    pub fn dependents_of(&self, id: &str) -> impl Iterator<Item = &str> {
        self.dependents
            .get(id)
            .into_iter()
            .flat_map(|deps| deps.iter().map(String::as_str))
    }

    pub fn depends_on(&self, id: &str, dependency: &str) -> bool {
        self.depends
            .get(id)
            .map(|deps| deps.contains(dependency))
            .unwrap_or(false)
    }

    pub fn contains_edges(&self) -> &BTreeMap<String, Vec<String>> {
        &self.contains
    }

    pub fn depends_edges(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.depends
    }

    pub fn roots(&self) -> &[String] {
        &self.roots
    }

    pub fn has_cycle(&self) -> bool {
        !self.cycle_members.is_empty()
    }

    pub fn cycle_members(&self) -> &[String] {
        &self.cycle_members
    }

    pub fn missing_dependencies(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.missing
    }

    pub fn self_dependencies(&self) -> &BTreeSet<String> {
        &self.self_dependencies
    }

    /// Human-readable notes about manifest defects that do not stop resolution.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.has_cycle() {
            warnings.push(format!(
                "dependency cycle detected involving: {}",
                self.cycle_members.join(", ")
            ));
        }
        for (pack, missing) in &self.missing {
            for dep in missing {
                warnings.push(format!(
                    "pack '{pack}' depends on '{dep}', which the source does not provide"
                ));
            }
        }
        for pack in &self.self_dependencies {
            warnings.push(format!("pack '{pack}' lists itself as a dependency; ignored"));
        }
        warnings
    }
}
