//! Filesystem-backed implementations of the session engine's collaborators.

mod installed_ledger;
mod layout;
mod pack_index;
mod session_files;
mod target_dir;

pub use installed_ledger::InstalledLedger;
pub use layout::{default_state_root, StateLayout};
pub use pack_index::PackIndex;
pub use session_files::FileSessionStore;
pub use target_dir::TargetDirectory;
