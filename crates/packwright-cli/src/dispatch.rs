use std::collections::BTreeSet;
use std::io::{self, Read};

use anyhow::{anyhow, Context, Result};
use packwright_core::ManifestProvider;
use packwright_registry::{
    default_state_root, FileSessionStore, InstalledLedger, PackIndex, StateLayout,
    TargetDirectory,
};
use packwright_resolver::{dependency_order, PackGraph};
use packwright_session::{
    Command, CommandProcessor, CommandRequest, CommandResponse, EntityKind, Operation,
    OperationAction, SessionError, SessionKey,
};
use serde::Serialize;
use tracing::{debug, info};

use crate::completion::write_completions_script;
use crate::config::{login_user, resolve_config, ConfigFile, ConfigOverrides, ResolvedConfig};
use crate::render::{
    current_output_style, error_payload, format_graph_lines, format_preflight_lines,
    format_response_lines, graph_json, print_lines,
};
use crate::{Cli, Commands};

pub(crate) fn run_cli(cli: Cli) -> Result<()> {
    if let Commands::Completions { shell } = cli.command {
        let mut stdout = io::stdout().lock();
        return write_completions_script(shell, &mut stdout);
    }

    let config = load_config(&cli)?;
    debug!(
        state_root = %config.state_root.display(),
        registry_root = %config.registry_root.display(),
        target_root = %config.target_root.display(),
        user = %config.user,
        "resolved configuration"
    );

    let layout = StateLayout::new(&config.state_root);
    let index = PackIndex::open(&config.registry_root);
    let ledger = InstalledLedger::new(layout.clone());
    let sessions = FileSessionStore::new(layout);
    let target = TargetDirectory::open(&config.target_root);
    let processor = CommandProcessor::new(&index, &ledger, &target, &sessions);

    match cli.command {
        Commands::Exec { request } => run_exec(&processor, &config.user, &request),
        Commands::Graph => {
            let source = config.require_source()?;
            let packs = index.list_packs(source, &cli.reference)?;
            let graph = PackGraph::build(&packs);
            let all: BTreeSet<String> = graph.pack_ids().map(str::to_string).collect();
            let order = dependency_order(&all, &graph);
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&graph_json(&graph, &order))?);
            } else {
                print_lines(current_output_style(), &format_graph_lines(&graph, &order));
            }
            Ok(())
        }
        Commands::Preflight => {
            let source = config.require_source()?;
            let key = SessionKey::new(config.user.clone(), cli.reference.clone());
            let report = processor.preflight(&key, source).map_err(explain)?;
            if cli.json {
                print_json(&report)
            } else {
                print_lines(current_output_style(), &format_preflight_lines(&report));
                Ok(())
            }
        }
        Commands::Apply { record } => {
            let source = config.require_source()?;
            let key = SessionKey::new(config.user.clone(), cli.reference.clone());
            let response = processor
                .run(&key, source, Command::Apply)
                .map_err(explain)?;
            if record {
                let operations = response.operations.as_deref().unwrap_or_default();
                record_operations(&ledger, source, &cli.reference, operations)?;
            }
            print_response(&response, cli.json)
        }
        other => {
            let command = session_command(other)
                .ok_or_else(|| anyhow!("command is not a session command"))?;
            let source = config.require_source()?;
            let key = SessionKey::new(config.user.clone(), cli.reference.clone());
            let response = processor.run(&key, source, command).map_err(explain)?;
            print_response(&response, cli.json)
        }
    }
}

fn load_config(cli: &Cli) -> Result<ResolvedConfig> {
    let state_root = match &cli.state_root {
        Some(root) => root.clone(),
        None => default_state_root()?,
    };
    let file = ConfigFile::load(&StateLayout::new(&state_root).config_path())?;
    let overrides = ConfigOverrides {
        registry_root: cli.registry_root.clone(),
        target_root: cli.target_root.clone(),
        source: cli.source.clone(),
        user: cli.user.clone(),
    };
    Ok(resolve_config(state_root, file, overrides, login_user()))
}

pub(crate) fn session_command(command: Commands) -> Option<Command> {
    Some(match command {
        Commands::Init => Command::Init,
        Commands::Select { pack } => Command::Select { pack_id: pack },
        Commands::Deselect { pack, cascade } => Command::Deselect {
            pack_id: pack,
            cascade,
        },
        Commands::SetTitle { pack, page, title } => Command::SetPageTitle {
            pack_id: pack,
            page_key: page,
            title,
        },
        Commands::SetPrefix { pack, prefix } => Command::SetPackPrefix {
            pack_id: pack,
            prefix,
        },
        Commands::Refresh => Command::Refresh,
        Commands::Clear => Command::Clear,
        Commands::Apply { .. } => Command::Apply,
        Commands::Exec { .. }
        | Commands::Preflight
        | Commands::Graph
        | Commands::Completions { .. } => return None,
    })
}

fn run_exec(processor: &CommandProcessor<'_>, user: &str, request: &str) -> Result<()> {
    let raw = if request == "-" {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("failed reading command request from stdin")?;
        buffer
    } else {
        request.to_string()
    };
    let request = parse_request(&raw)?;

    match processor.execute(user, &request) {
        Ok(response) => print_json(&response),
        Err(err) => {
            println!("{}", serde_json::to_string_pretty(&error_payload(&err))?);
            Err(anyhow::Error::new(err).context(format!("command '{}' failed", request.command)))
        }
    }
}

pub(crate) fn parse_request(raw: &str) -> Result<CommandRequest> {
    serde_json::from_str(raw).context("failed parsing command request JSON")
}

/// Mirrors emitted operations into the installed ledger for callers that run
/// the operations themselves.
fn record_operations(
    ledger: &InstalledLedger,
    source: &str,
    reference: &str,
    operations: &[Operation],
) -> Result<()> {
    for operation in operations {
        match (operation.action, operation.target_version.as_deref()) {
            (OperationAction::Install | OperationAction::Update, Some(version)) => {
                ledger.record_installed(source, reference, &operation.pack_id, version)?;
            }
            (OperationAction::Remove, _) => {
                ledger.record_removed(source, reference, &operation.pack_id)?;
            }
            (_, None) => continue,
        }
    }
    info!(
        source,
        reference,
        operations = operations.len(),
        "recorded operations in installed ledger"
    );
    Ok(())
}

fn print_response(response: &CommandResponse, json: bool) -> Result<()> {
    if json {
        return print_json(response);
    }
    print_lines(current_output_style(), &format_response_lines(response));
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Adds the next step a user can take for recoverable errors.
pub(crate) fn explain(err: SessionError) -> anyhow::Error {
    match &err {
        SessionError::CascadeRequired { .. } => {
            anyhow!("{err}; rerun with --cascade to deselect them as well")
        }
        SessionError::NotFound {
            kind: EntityKind::Session,
            ..
        } => anyhow!("{err}; run `packwright init` first"),
        _ => anyhow::Error::new(err),
    }
}
