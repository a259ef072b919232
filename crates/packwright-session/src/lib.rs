//! Per-user pack selection sessions.
//!
//! A session is a [`SelectionState`] snapshot keyed by [`SessionKey`]. Commands
//! are pure transitions over a loaded snapshot (see [`commands`]); the
//! [`CommandProcessor`] wraps them with the load/save round trip against a
//! [`SessionStore`] and shapes the caller-facing [`CommandResponse`].

mod apply;
pub mod commands;
mod conflicts;
mod context;
mod diff;
mod error;
mod hash;
mod preflight;
mod processor;
mod state;
mod store;

pub use apply::{Operation, OperationAction, OperationPage};
pub use commands::{Command, CommandRequest};
pub use context::ResolveContext;
pub use diff::{apply_diff, compute_diff, PackDiff, PageDiff, StateDiff};
pub use error::{EntityKind, SessionError};
pub use hash::sha256_hex;
pub use preflight::{
    classify, classify_title, planned_titles, PreflightBucket, PreflightCounts, PreflightReport,
};
pub use processor::{CommandProcessor, CommandResponse};
pub use state::{
    ConflictType, PackAction, PackSelection, PageSelection, SelectionState, SessionKey,
};
pub use store::{MemorySessionStore, SessionStore};

#[cfg(test)]
mod tests;
