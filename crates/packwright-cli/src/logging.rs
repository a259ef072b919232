use std::io;

use anyhow::{anyhow, Context, Result};
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "PACKWRIGHT_LOG";

/// Installs the global subscriber, writing to stderr so stdout stays
/// machine-readable. `--log-level` wins over `PACKWRIGHT_LOG`, which wins over
/// `RUST_LOG`.
pub(crate) fn init_logging(level: Option<&str>) -> Result<()> {
    let filter = build_env_filter(level, std::env::var(LOG_ENV).ok().as_deref())?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .without_time()
        .try_init()
        .map_err(|err| anyhow!("failed to initialise logging: {err}"))
}

pub(crate) fn build_env_filter(flag: Option<&str>, env_value: Option<&str>) -> Result<EnvFilter> {
    if let Some(level) = flag {
        return EnvFilter::try_new(filter_directives(level))
            .with_context(|| format!("invalid --log-level '{level}'"));
    }
    if let Some(value) = env_value.filter(|value| !value.trim().is_empty()) {
        return EnvFilter::try_new(value).with_context(|| format!("invalid {LOG_ENV} '{value}'"));
    }
    Ok(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
}

/// A bare level applies to the packwright crates only; anything else is
/// passed through as a filter directive.
pub(crate) fn filter_directives(input: &str) -> String {
    let input = input.trim();
    let level = input.to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" | "off" => format!(
            "warn,packwright_cli={level},packwright_session={level},\
             packwright_registry={level},packwright_resolver={level}"
        ),
        _ => input.to_string(),
    }
}
