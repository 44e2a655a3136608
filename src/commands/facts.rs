use crate::Context;
use crate::config::Settings;
use crate::ui;
use anyhow::Result;

pub fn run(_ctx: &Context, settings: &Settings) -> Result<()> {
    let session = super::session(settings, false)?;
    let facts = session.facts();

    ui::header("Facts");
    for (name, value) in facts.iter() {
        let overridden = settings.facts.contains_key(name);
        if overridden {
            ui::kv(name, &format!("{value} (override)"));
        } else {
            ui::kv(name, value);
        }
    }

    ui::header("Features");
    let features: Vec<&str> = facts.features().collect();
    if features.is_empty() {
        ui::dim("none");
    } else {
        ui::dim(&features.join(", "));
    }
    Ok(())
}
