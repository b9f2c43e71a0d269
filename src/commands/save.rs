use anyhow::{Context as AnyhowContext, Result};
use tagkit::{ChangeFilter, Resolution, TagSelection};

use crate::Context;
use crate::cli::SaveArgs;
use crate::ui;

pub fn run(ctx: &Context, args: SaveArgs) -> Result<()> {
    let input = &args.input;
    let settings = super::load_settings(ctx, input, None)?;
    let declarations = super::load_declarations(input)?;
    let inventory = super::load_inventory(input, &declarations, &settings)?;

    let changes = if declarations.is_empty() {
        None
    } else {
        let resolution = Resolution::resolve(&declarations, &inventory);
        Some(tagkit::diff::compute(
            &resolution,
            &inventory,
            &settings.run.change_types,
        )?)
    };
    let filter = changes.as_ref().map(|changes| ChangeFilter {
        changes,
        types: &settings.run.change_types,
    });

    let delimiter = super::separator(input)?;
    let written = tagkit::save_existing_tags(
        &inventory,
        &selection(&args.tags),
        &args.output,
        delimiter,
        filter,
    )
    .with_context(|| format!("Failed to save tags to {}", args.output.display()))?;

    if written.is_empty() {
        ui::warn("No existing tags to save");
    } else if !ctx.quiet {
        for path in &written {
            ui::success(&format!("Wrote {}", path.display()));
        }
    }
    Ok(())
}

fn selection(tags: &[String]) -> TagSelection {
    match tags {
        [] => TagSelection::PerTag,
        [only] if only == "all" => TagSelection::All,
        names => TagSelection::Named(names.to_vec()),
    }
}
