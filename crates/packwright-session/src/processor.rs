use packwright_core::{InstalledContent, ManifestProvider, TargetLookup};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::apply::Operation;
use crate::commands::{self, Command, CommandRequest};
use crate::context::ResolveContext;
use crate::diff::{compute_diff, StateDiff};
use crate::error::{EntityKind, SessionError};
use crate::preflight::{classify, planned_titles, PreflightReport};
use crate::state::{SelectionState, SessionKey};
use crate::store::SessionStore;

/// What a command hands back to the caller. `init` and `refresh` carry the
/// full state, mutations carry a diff, `apply` carries the operation list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommandResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<SelectionState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<StateDiff>,
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cascade: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operations: Option<Vec<Operation>>,
}

pub struct CommandProcessor<'a> {
    manifests: &'a dyn ManifestProvider,
    installed: &'a dyn InstalledContent,
    target: &'a dyn TargetLookup,
    store: &'a dyn SessionStore,
}

impl<'a> CommandProcessor<'a> {
    pub fn new(
        manifests: &'a dyn ManifestProvider,
        installed: &'a dyn InstalledContent,
        target: &'a dyn TargetLookup,
        store: &'a dyn SessionStore,
    ) -> Self {
        Self {
            manifests,
            installed,
            target,
            store,
        }
    }

    /// Entry point for an outer API layer.
    pub fn execute(
        &self,
        user_id: &str,
        request: &CommandRequest,
    ) -> Result<CommandResponse, SessionError> {
        let command = Command::from_request(request)?;
        let key = SessionKey::new(user_id, request.reference.clone());
        self.run(&key, &request.source, command)
    }

    pub fn run(
        &self,
        key: &SessionKey,
        source: &str,
        command: Command,
    ) -> Result<CommandResponse, SessionError> {
        debug!(session = %key, source, command = command.name(), "running session command");

        if command == Command::Clear {
            self.store.clear(key)?;
            info!(session = %key, "session cleared");
            return Ok(CommandResponse::default());
        }

        let packs = self.manifests.list_packs(source, &key.ref_id)?;
        let installed = self.installed.list_installed(source, &key.ref_id)?;
        let ctx = ResolveContext::new(&packs, &installed, self.target);

        if command == Command::Init {
            let (state, warnings) = commands::init(key, source, &ctx)?;
            log_warnings(key, &warnings);
            self.store.save(&state)?;
            info!(session = %key, packs = state.packs.len(), "session initialised");
            return full_state_response(state, warnings);
        }

        let mut state = self.load(key, source)?;
        let before = state.clone();
        let mut cascade = None;

        let warnings = match command {
            Command::Init | Command::Clear => Vec::new(),
            Command::Select { pack_id } => commands::select(&mut state, &ctx, &pack_id)?,
            Command::Deselect { pack_id, cascade: confirm } => {
                let (warnings, cascaded) =
                    commands::deselect(&mut state, &ctx, &pack_id, confirm)?;
                cascade = Some(cascaded);
                warnings
            }
            Command::SetPageTitle {
                pack_id,
                page_key,
                title,
            } => {
                commands::set_page_title(&mut state, &ctx, &pack_id, &page_key, &title)?;
                Vec::new()
            }
            Command::SetPackPrefix { pack_id, prefix } => {
                commands::set_pack_prefix(&mut state, &ctx, &pack_id, &prefix)?;
                Vec::new()
            }
            Command::Refresh => {
                let warnings = commands::refresh(&mut state, &ctx)?;
                log_warnings(key, &warnings);
                self.store.save(&state)?;
                return full_state_response(state, warnings);
            }
            Command::Apply => {
                let (operations, warnings) = commands::apply(&state, &ctx)?;
                log_warnings(key, &warnings);
                let hash = state.content_hash()?;
                self.store.clear(key)?;
                info!(
                    session = %key,
                    operations = operations.len(),
                    "session applied and cleared"
                );
                return Ok(CommandResponse {
                    warnings,
                    hash: Some(hash),
                    operations: Some(operations),
                    ..CommandResponse::default()
                });
            }
        };

        log_warnings(key, &warnings);
        let diff = compute_diff(&before, &state);
        self.store.save(&state)?;
        Ok(CommandResponse {
            hash: Some(state.content_hash()?),
            diff: Some(diff),
            warnings,
            cascade,
            ..CommandResponse::default()
        })
    }

    /// Classifies every page the session would write against the target.
    pub fn preflight(
        &self,
        key: &SessionKey,
        source: &str,
    ) -> Result<PreflightReport, SessionError> {
        let state = self.load(key, source)?;
        let report = classify(planned_titles(&state), self.target, source)?;
        debug!(session = %key, counts = ?report.counts(), "preflight classified");
        Ok(report)
    }

    pub fn session(&self, key: &SessionKey) -> Result<Option<SelectionState>, SessionError> {
        Ok(self.store.get(key)?)
    }

    fn load(&self, key: &SessionKey, source: &str) -> Result<SelectionState, SessionError> {
        let state = self.store.get(key)?.ok_or_else(|| SessionError::NotFound {
            kind: EntityKind::Session,
            id: key.to_string(),
        })?;
        if state.source_id != source {
            return Err(SessionError::invalid(format!(
                "session {key} was initialised for source '{}', not '{source}'",
                state.source_id
            )));
        }
        Ok(state)
    }
}

fn full_state_response(
    state: SelectionState,
    warnings: Vec<String>,
) -> Result<CommandResponse, SessionError> {
    Ok(CommandResponse {
        hash: Some(state.content_hash()?),
        state: Some(state),
        warnings,
        ..CommandResponse::default()
    })
}

fn log_warnings(key: &SessionKey, warnings: &[String]) {
    for message in warnings {
        warn!(session = %key, "{message}");
    }
}
