mod graph;
mod order;
mod policy;
mod removal;
mod resolve;

pub use graph::PackGraph;
pub use order::dependency_order;
pub use policy::{check_update, UpdateCandidate, VersionIssue};
pub use removal::{direct_dependents, validate_removal};
pub use resolve::{auto_selection_reason, resolve_auto_selections};
