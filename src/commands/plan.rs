use anyhow::Result;

use crate::Context;
use crate::cli::PlanArgs;
use crate::ui;

pub fn run(ctx: &Context, args: PlanArgs) -> Result<()> {
    let prepared = super::prepare(ctx, &args.input, None)?;
    super::print_report(&prepared);

    if prepared.plan.changes.is_empty() && !ctx.quiet {
        ui::success("Tags already match the declarations");
    }
    Ok(())
}
