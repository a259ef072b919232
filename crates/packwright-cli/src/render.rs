use std::io::IsTerminal;

use anstyle::{AnsiColor, Effects, Style};
use packwright_resolver::PackGraph;
use packwright_session::{
    CommandResponse, Operation, OperationAction, PackDiff, PreflightReport,
    SelectionState, SessionError,
};
use serde_json::{json, Value};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum OutputStyle {
    Plain,
    Rich,
}

pub(crate) fn current_output_style() -> OutputStyle {
    let no_color = std::env::var_os("NO_COLOR").is_some_and(|value| !value.is_empty());
    if !no_color && std::io::stdout().is_terminal() {
        OutputStyle::Rich
    } else {
        OutputStyle::Plain
    }
}

fn status_badge(status: &str) -> &'static str {
    match status {
        "ok" => "[OK]",
        "warn" => "[WARN]",
        "err" => "[ERR]",
        _ => "[..]",
    }
}

fn status_style(status: &str) -> Style {
    let color = match status {
        "ok" => AnsiColor::BrightGreen,
        "warn" => AnsiColor::BrightYellow,
        "err" => AnsiColor::BrightRed,
        _ => AnsiColor::BrightBlue,
    };
    Style::new().fg_color(Some(color.into())).effects(Effects::BOLD)
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}

/// Plain lines stay unadorned except warnings, which keep a `warning:` tag so
/// they survive piping.
pub(crate) fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain if status == "warn" => format!("warning: {message}"),
        OutputStyle::Plain => message.to_string(),
        OutputStyle::Rich => format!("{} {message}", status_badge(status)),
    }
}

pub(crate) fn print_lines(style: OutputStyle, lines: &[(&'static str, String)]) {
    for (status, message) in lines {
        match style {
            OutputStyle::Rich => println!(
                "{} {message}",
                colorize(status_style(status), status_badge(status))
            ),
            OutputStyle::Plain => println!("{}", render_status_line(style, status, message)),
        }
    }
}

fn pack_state_line(id: &str, state: &SelectionState) -> Option<String> {
    let pack = state.pack(id)?;
    let choice = if pack.selected {
        "selected".to_string()
    } else if let Some(reason) = &pack.auto_selected_reason {
        format!("auto ({reason})")
    } else {
        "not selected".to_string()
    };
    let versions = match (&pack.current_version, &pack.target_version) {
        (Some(current), Some(target)) if current != target => format!("{current} -> {target}"),
        (Some(current), _) => current.clone(),
        (None, Some(target)) => target.clone(),
        (None, None) => "-".to_string(),
    };
    Some(format!(
        "{id} {versions}: {choice}, {}",
        pack.action.as_str()
    ))
}

fn conflict_lines(state: &SelectionState) -> Vec<(&'static str, String)> {
    let mut lines = Vec::new();
    for (id, pack) in &state.packs {
        for page in pack.pages.values().filter(|page| page.has_conflict) {
            let kind = page
                .conflict_type
                .map(|kind| format!("{kind:?}"))
                .unwrap_or_default();
            lines.push((
                "warn",
                format!("{id}/{} -> '{}' conflicts ({kind})", page.name, page.final_title),
            ));
        }
    }
    lines
}

fn pack_diff_line(id: &str, diff: &PackDiff) -> String {
    let mut changes = Vec::new();
    if let Some(selected) = diff.selected {
        changes.push(format!("selected={selected}"));
    }
    if let Some(auto) = diff.auto_selected {
        changes.push(format!("auto_selected={auto}"));
    }
    if let Some(action) = diff.action {
        changes.push(format!("action={}", action.as_str()));
    }
    if let Some(prefix) = &diff.prefix {
        changes.push(format!("prefix={}", prefix.as_deref().unwrap_or("<none>")));
    }
    for (key, page) in &diff.pages {
        if let Some(title) = &page.final_title {
            changes.push(format!("{key}='{title}'"));
        }
        if let Some(conflict) = page.has_conflict {
            changes.push(format!("{key}.conflict={conflict}"));
        }
    }
    if changes.is_empty() {
        changes.push("updated".to_string());
    }
    format!("{id}: {}", changes.join(", "))
}

fn operation_line(operation: &Operation) -> String {
    let verb = match operation.action {
        OperationAction::Install => "install",
        OperationAction::Update => "update",
        OperationAction::Remove => "remove",
    };
    let version = operation
        .target_version
        .as_deref()
        .map(|version| format!(" {version}"))
        .unwrap_or_default();
    format!(
        "{verb} {}{version} ({} pages)",
        operation.pack_id,
        operation.pages.len()
    )
}

pub(crate) fn format_response_lines(response: &CommandResponse) -> Vec<(&'static str, String)> {
    let mut lines: Vec<(&'static str, String)> = response
        .warnings
        .iter()
        .map(|warning| ("warn", warning.clone()))
        .collect();

    if let Some(state) = &response.state {
        for id in state.packs.keys() {
            if let Some(line) = pack_state_line(id, state) {
                lines.push(("info", line));
            }
        }
        lines.extend(conflict_lines(state));
    }

    if let Some(diff) = &response.diff {
        if diff.is_empty() {
            lines.push(("ok", "no changes".to_string()));
        }
        for (id, pack) in &diff.packs {
            lines.push(("ok", pack_diff_line(id, pack)));
        }
        for id in &diff.removed {
            lines.push(("ok", format!("{id}: removed from session")));
        }
    }

    if let Some(cascade) = response.cascade.as_ref().filter(|cascade| !cascade.is_empty()) {
        lines.push(("warn", format!("also deselected: {}", cascade.join(", "))));
    }

    if let Some(operations) = &response.operations {
        for operation in operations {
            lines.push(("ok", operation_line(operation)));
        }
    }

    if let Some(hash) = &response.hash {
        lines.push(("info", format!("state hash {hash}")));
    }
    lines
}

pub(crate) fn format_preflight_lines(report: &PreflightReport) -> Vec<(&'static str, String)> {
    let counts = report.counts();
    let mut lines = vec![(
        if report.is_clean() { "ok" } else { "warn" },
        format!(
            "create={} update_unchanged={} update_modified={} pack_pack_conflict={} external_collision={}",
            counts.create,
            counts.update_unchanged,
            counts.update_modified,
            counts.pack_pack_conflict,
            counts.external_collision
        ),
    )];

    let buckets: [(&'static str, &str, &[String]); 5] = [
        ("info", "create", &report.create),
        ("info", "update_unchanged", &report.update_unchanged),
        ("warn", "update_modified", &report.update_modified),
        ("warn", "pack_pack_conflict", &report.pack_pack_conflict),
        ("warn", "external_collision", &report.external_collision),
    ];
    for (status, name, titles) in buckets {
        for title in titles {
            lines.push((status, format!("{name}: {title}")));
        }
    }
    lines
}

pub(crate) fn format_graph_lines(graph: &PackGraph, order: &[String]) -> Vec<(&'static str, String)> {
    let mut lines: Vec<(&'static str, String)> = graph
        .warnings()
        .into_iter()
        .map(|warning| ("warn", warning))
        .collect();
    lines.push(("info", format!("roots: {}", graph.roots().join(", "))));
    for id in order {
        let deps: Vec<&str> = graph.dependencies_of(id).collect();
        let line = if deps.is_empty() {
            id.clone()
        } else {
            format!("{id} -> {}", deps.join(", "))
        };
        lines.push(("info", line));
    }
    lines
}

pub(crate) fn graph_json(graph: &PackGraph, order: &[String]) -> Value {
    let packs: Vec<Value> = order
        .iter()
        .map(|id| {
            json!({
                "id": id,
                "pages": graph.pages_of(id),
                "depends_on": graph.dependencies_of(id).collect::<Vec<_>>(),
                "dependents": graph.dependents_of(id).collect::<Vec<_>>(),
            })
        })
        .collect();
    json!({
        "packs": packs,
        "roots": graph.roots(),
        "has_cycle": graph.has_cycle(),
        "cycle_members": graph.cycle_members(),
        "warnings": graph.warnings(),
    })
}

/// Structured error body for `exec` callers.
pub(crate) fn error_payload(err: &SessionError) -> Value {
    let mut body = json!({
        "code": err.code(),
        "message": err.to_string(),
    });
    match err {
        SessionError::CascadeRequired { dependents, .. } => {
            body["dependents"] = json!(dependents);
        }
        SessionError::DependencyConflict(issue) => {
            body["issue"] = json!(issue);
        }
        _ => {}
    }
    json!({ "error": body })
}
