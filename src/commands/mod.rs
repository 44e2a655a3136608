pub mod apply;
pub mod facts;
pub mod providers;
pub mod resource;

use crate::config::Settings;
use anyhow::{Context, Result};
use provider::{HostFacts, Session, SessionOptions, SystemExecutor};
use std::sync::Arc;

/// Build the session every command works through: settings, detected
/// facts with overrides, and the built-in providers.
pub fn session(settings: &Settings, noop: bool) -> Result<Session> {
    let registry = hostkit::registry(&settings.hostkit_options())
        .context("Failed to register built-in providers")?;

    let mut facts = HostFacts::detect();
    facts.apply_overrides(&settings.facts);

    Ok(Session::with_options(
        registry,
        facts,
        Arc::new(SystemExecutor),
        SessionOptions {
            noop: noop || settings.noop,
            search_path: settings.search_path(),
            ..SessionOptions::default()
        },
    ))
}
