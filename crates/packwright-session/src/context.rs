use std::collections::BTreeMap;

use packwright_core::{InstalledPack, PackDefinition, TargetLookup};
use packwright_resolver::PackGraph;

/// Everything a transition needs besides the state itself: the manifest
/// snapshot, its graph, the installed snapshot and the target store view.
pub struct ResolveContext<'a> {
    packs: BTreeMap<&'a str, &'a PackDefinition>,
    installed: BTreeMap<&'a str, &'a str>,
    graph: PackGraph,
    target: &'a dyn TargetLookup,
}

impl<'a> ResolveContext<'a> {
    pub fn new(
        packs: &'a [PackDefinition],
        installed: &'a [InstalledPack],
        target: &'a dyn TargetLookup,
    ) -> Self {
        Self {
            packs: packs.iter().map(|pack| (pack.id.as_str(), pack)).collect(),
            installed: installed
                .iter()
                .map(|pack| (pack.name.as_str(), pack.version.as_str()))
                .collect(),
            graph: PackGraph::build(packs),
            target,
        }
    }

    pub fn graph(&self) -> &PackGraph {
        &self.graph
    }

    pub fn target(&self) -> &dyn TargetLookup {
        self.target
    }

    pub fn pack(&self, id: &str) -> Option<&'a PackDefinition> {
        self.packs.get(id).copied()
    }

    pub fn packs(&self) -> impl Iterator<Item = &'a PackDefinition> + '_ {
        self.packs.values().copied()
    }

    pub fn installed_version(&self, id: &str) -> Option<&'a str> {
        self.installed.get(id).copied()
    }

    pub fn installed(&self) -> impl Iterator<Item = (&'a str, &'a str)> + '_ {
        self.installed
            .iter()
            .map(|(name, version)| (*name, *version))
    }
}
