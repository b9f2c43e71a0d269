use anyhow::{Result, bail};
use dialoguer::Input;
use std::io::{self, Write};
use tagkit::{
    ApplyOptions, ApplySummary, AutoConfirm, ConfirmCallback, Plan, ProgressCallback, ResourceId,
    ResourceOutcome, TagBackend,
};

use crate::Context;
use crate::az::AzCli;
use crate::cli::ApplyArgs;
use crate::ui;

pub fn run(ctx: &Context, args: ApplyArgs) -> Result<()> {
    let prepared = super::prepare(ctx, &args.input, args.max_errors)?;
    super::print_report(&prepared);

    if prepared.plan.changes.is_empty() {
        if !ctx.quiet {
            ui::success("Nothing to apply");
        }
        return Ok(());
    }

    let options = ApplyOptions {
        dry_run: args.dry_run,
        max_failures: prepared.settings.max_errors,
        full: prepared.settings.run.change_types.is_full(),
        ..Default::default()
    };
    let mut backend = AzCli::new(prepared.settings.timeout);
    let mut stdout = io::stdout();

    if args.yes {
        apply_plan(&prepared.plan, &options, &mut backend, &mut AutoConfirm, &mut stdout)?;
    } else {
        apply_plan(&prepared.plan, &options, &mut backend, &mut PromptConfirm, &mut stdout)?;
    }
    if args.dry_run && !ctx.quiet {
        ui::dim("Dry run; nothing was changed");
    }
    Ok(())
}

/// Apply the plan and write the final counts to `out`. The counts are
/// written even when the run ends early, which is then reported as an error.
fn apply_plan<B, C>(
    plan: &Plan,
    options: &ApplyOptions,
    backend: &mut B,
    confirm: &mut C,
    out: &mut impl Write,
) -> Result<ApplySummary>
where
    B: TagBackend,
    C: ConfirmCallback,
{
    let mut progress = LogProgress {
        dry_run: options.dry_run,
    };
    let mut summary = tagkit::apply(plan, options, backend, &mut progress, confirm)?;

    write_summary(out, &summary)?;
    if let Some(err) = summary.fatal.take() {
        let label = err.category().description();
        return Err(anyhow::Error::new(err).context(label));
    }
    if summary.budget_exceeded() {
        bail!("Aborted after {} failed update(s)", summary.failed.len());
    }
    Ok(summary)
}

fn write_summary(out: &mut impl Write, summary: &ApplySummary) -> io::Result<()> {
    writeln!(out)?;
    writeln!(
        out,
        "ADD {}, UPDATE {}, DEL {}, SWAP {}, FAILED {}",
        summary.added,
        summary.updated,
        summary.deleted,
        summary.swapped,
        summary.failed.len()
    )?;
    for (id, error) in &summary.failed {
        writeln!(out, "FAILED {id}: {error}")?;
    }
    if summary.is_incomplete() {
        writeln!(out, "{} update(s) not attempted", summary.remaining())?;
    }
    out.flush()
}

/// Logs each resource; prints the commands of a dry run to stdout.
struct LogProgress {
    dry_run: bool,
}

impl ProgressCallback for LogProgress {
    fn on_resource_start(&mut self, index: usize, total: usize, id: &ResourceId) {
        log::info!("[{}/{}] {id}", index + 1, total);
    }

    fn on_command(&mut self, description: &str) {
        if self.dry_run {
            println!("{description}");
        } else {
            log::info!("{description}");
        }
    }

    fn on_resource_complete(&mut self, id: &ResourceId, outcome: &ResourceOutcome) {
        if outcome.is_success() {
            log::debug!("Done {id}");
        }
    }
}

/// Asks on the terminal; only the word `yes` confirms.
struct PromptConfirm;

impl ConfirmCallback for PromptConfirm {
    fn confirm(&mut self, prompt: &str) -> tagkit::Result<bool> {
        let answer: String = Input::new()
            .with_prompt(format!("{prompt} Type 'yes' to continue"))
            .allow_empty(true)
            .interact_text()
            .map_err(|e| tagkit::Error::Invocation(format!("confirmation failed: {e}")))?;
        Ok(is_yes(&answer))
    }
}

fn is_yes(answer: &str) -> bool {
    answer.trim().eq_ignore_ascii_case("yes")
}
