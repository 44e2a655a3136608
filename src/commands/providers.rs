use crate::Context;
use crate::config::Settings;
use crate::ui;
use anyhow::Result;
use colored::Colorize;
use provider::specificity;

pub fn run(ctx: &Context, settings: &Settings, resource_type: &str) -> Result<()> {
    let session = super::session(settings, false)?;
    let providers = session.registry().providers(resource_type)?;
    let default = session.default_provider(resource_type, "").ok();

    ui::header(&format!("Providers for {resource_type}"));
    for spec in providers {
        let reasons = session.unsuitable_reasons(spec);
        let is_default = default.as_ref().is_some_and(|d| d.name() == spec.name());

        let marker = if is_default {
            "●".green().to_string()
        } else if reasons.is_empty() {
            "○".to_string()
        } else {
            "✗".dimmed().to_string()
        };
        let mut line = format!("{marker} {}", spec.name().bold());
        if let Some(parent) = spec.parent() {
            line.push_str(&format!(" {}", format!("(child of {})", parent.name()).dimmed()));
        }
        if is_default {
            line.push_str(&format!(" {}", "default".green()));
        }
        println!("{line}");

        if !spec.description().is_empty() {
            ui::dim(spec.description());
        }
        if !reasons.is_empty() {
            ui::kv("unsuitable", &reasons.join("; "));
        }
        if ctx.verbose > 0 {
            let features: Vec<String> = spec.effective_features().iter().map(ToString::to_string).collect();
            ui::kv("features", &features.join(", "));
            if let Some(score) = specificity(spec, session.facts()) {
                ui::kv("specificity", &score.to_string());
            }
        }
    }

    if default.is_none() {
        println!();
        ui::warn(&format!("No default {resource_type} provider on this host"));
    }
    Ok(())
}
