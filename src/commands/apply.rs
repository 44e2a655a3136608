use crate::Context;
use crate::catalog::Catalog;
use crate::cli::ApplyArgs;
use crate::config::Settings;
use crate::ui;
use anyhow::{Result, bail};
use provider::{ApplyResult, ErrorCategory, RunReport};

pub fn run(ctx: &Context, settings: &Settings, args: &ApplyArgs) -> Result<()> {
    let path = settings.catalog_path(args.catalog.as_deref())?;
    let catalog = Catalog::load(&path)?;
    if catalog.is_empty() && !args.json {
        ui::info(&format!("{} declares no resources", path.display()));
        return Ok(());
    }
    let session = super::session(settings, args.noop)?;
    let grouped = catalog.resources(session.registry())?;

    let show_progress = !args.json && !ctx.quiet;
    if show_progress {
        let mode = if session.is_noop() { " (noop)" } else { "" };
        ui::header(&format!("Applying {}{mode}", path.display()));
    }

    // Types converge one after another, in registration order
    let mut report = RunReport::start(session.is_noop());
    let mut progress = ui::TerminalProgress::new(!show_progress);
    for (type_name, resources) in grouped {
        log::info!("Converging {} {type_name} resources", resources.len());
        report.absorb(session.converge_with_progress(resources, &mut progress));
    }
    report.finish();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if !ctx.quiet {
        println!();
        let line = format!("{} in {} ms", ui::summary_line(&report.summary), report.duration_ms());
        if report.summary.is_success() {
            ui::success(&line);
        } else {
            ui::warn(&line);
            for category in failed_categories(&report) {
                ui::dim(&format!("{}: {}", category.description(), category.advice()));
            }
        }
    }

    if !report.summary.is_success() {
        bail!("{} of {} resources failed", report.summary.failed, report.summary.total());
    }
    Ok(())
}

/// Distinct failure categories, in order of first appearance.
fn failed_categories(report: &RunReport) -> Vec<ErrorCategory> {
    let mut seen = Vec::new();
    for resource in &report.resources {
        if let ApplyResult::Failed { category, .. } = &resource.result
            && !seen.contains(category)
        {
            seen.push(*category);
        }
    }
    seen
}
