use std::collections::BTreeSet;

use packwright_resolver::{dependency_order, PackGraph};
use serde::{Deserialize, Serialize};

use crate::state::{PackAction, PackSelection, SelectionState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationAction {
    Install,
    Update,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationPage {
    pub name: String,
    pub final_title: String,
}

/// One unit of work for the execution pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub action: OperationAction,
    pub pack_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_version: Option<String>,
    pub pages: Vec<OperationPage>,
}

fn operation_action(pack: &PackSelection) -> Option<OperationAction> {
    match pack.action {
        PackAction::Install if pack.is_wanted() => Some(OperationAction::Install),
        PackAction::Update if pack.is_wanted() => Some(OperationAction::Update),
        PackAction::Remove if !pack.is_wanted() && pack.is_installed() => {
            Some(OperationAction::Remove)
        }
        _ => None,
    }
}

/// Installs and updates come first, dependencies before dependents; removals
/// follow with dependents before their dependencies.
pub(crate) fn build_operations(state: &SelectionState, graph: &PackGraph) -> Vec<Operation> {
    let mut writes = BTreeSet::new();
    let mut removals = BTreeSet::new();
    for (id, pack) in &state.packs {
        match operation_action(pack) {
            Some(OperationAction::Remove) => {
                removals.insert(id.clone());
            }
            Some(_) => {
                writes.insert(id.clone());
            }
            None => {}
        }
    }

    let ordered = dependency_order(&writes, graph)
        .into_iter()
        .chain(dependency_order(&removals, graph).into_iter().rev());

    ordered
        .filter_map(|id| {
            let pack = state.packs.get(&id)?;
            let action = operation_action(pack)?;
            Some(Operation {
                action,
                target_version: match action {
                    OperationAction::Remove => None,
                    _ => pack.target_version.clone(),
                },
                pages: pack
                    .pages
                    .values()
                    .map(|page| OperationPage {
                        name: page.name.clone(),
                        final_title: page.final_title.clone(),
                    })
                    .collect(),
                pack_id: id,
            })
        })
        .collect()
}
