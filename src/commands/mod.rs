// Reconciliation commands
pub mod apply;
pub mod plan;
pub mod save;

use anyhow::{Context as AnyhowContext, Result, bail};
use std::collections::BTreeSet;
use std::path::Path;
use tagkit::{Declarations, ExcludeSet, Inventory, Plan, sibling_exclude_file};

use crate::Context;
use crate::az::AzCli;
use crate::cli::InputArgs;
use crate::config::{FileConfig, Settings};
use crate::support;

/// Everything a run computed before touching anything
pub struct Prepared {
    pub settings: Settings,
    pub inventory: Inventory,
    pub plan: Plan,
}

/// Merge the config file and flags into effective settings.
pub fn load_settings(
    ctx: &Context,
    input: &InputArgs,
    max_errors: Option<usize>,
) -> Result<Settings> {
    let file = FileConfig::load_optional(ctx.config.as_deref())?;
    Settings::resolve(input, max_errors, &file, ctx.verbose)
}

/// Read every input and compute the pruned plan.
pub fn prepare(ctx: &Context, input: &InputArgs, max_errors: Option<usize>) -> Result<Prepared> {
    if input.tag_files.is_empty() {
        bail!("No tag files given");
    }
    let settings = load_settings(ctx, input, max_errors)?;
    let declarations = load_declarations(input)?;
    let exclude = load_exclusions(input, &settings)?;
    let support = support::load(settings.tag_support.as_deref())?;
    let inventory = load_inventory(input, &declarations, &settings)?;

    let plan = tagkit::plan(
        &declarations,
        &inventory,
        Some(&support),
        &exclude,
        &settings.run,
    )?;
    Ok(Prepared {
        settings,
        inventory,
        plan,
    })
}

/// Print the existing-tag overview and the diff report to stdout.
pub fn print_report(prepared: &Prepared) {
    let verbose = prepared.settings.run.verbose;
    print!("{}", tagkit::render_existing(&prepared.inventory, verbose));
    print!("{}", tagkit::render_plan(&prepared.plan, verbose));
}

/// Parse the declaration files named on the command line.
pub fn load_declarations(input: &InputArgs) -> Result<Declarations> {
    let delimiter = separator(input)?;

    log::info!("Parsing {} tag file(s)", input.tag_files.len());
    let mut declarations = Declarations::new();
    for path in &input.tag_files {
        declarations
            .add_file(path, delimiter)
            .with_context(|| format!("Failed to parse tag file {}", path.display()))?;
    }
    Ok(declarations)
}

/// Exclude files from settings plus any `excludeids.csv` beside a tag file.
pub fn load_exclusions(input: &InputArgs, settings: &Settings) -> Result<ExcludeSet> {
    let mut paths: BTreeSet<&Path> = settings.exclude_ids.iter().map(|p| p.as_path()).collect();
    let siblings: Vec<_> = input
        .tag_files
        .iter()
        .filter_map(|p| sibling_exclude_file(p))
        .collect();
    paths.extend(siblings.iter().map(|p| p.as_path()));

    let mut exclude = ExcludeSet::new();
    for path in paths {
        let added = exclude
            .load(path)
            .with_context(|| format!("Failed to load exclude file {}", path.display()))?;
        log::debug!("{added} id(s) excluded by {}", path.display());
    }
    Ok(exclude)
}

/// Existing state: the snapshot documents if any were given, otherwise a
/// live query of every declared (or explicitly named) subscription.
pub fn load_inventory(
    input: &InputArgs,
    declarations: &Declarations,
    settings: &Settings,
) -> Result<Inventory> {
    if input.uses_snapshot() {
        log::info!("Loading existing tags from snapshot files");
        return Inventory::load_snapshot(
            input.az_resources.as_deref(),
            input.az_rgs.as_deref(),
            input.az_subs.as_deref(),
        )
        .context("Failed to load snapshot");
    }

    let mut subscriptions: BTreeSet<&str> = declarations.subscriptions();
    subscriptions.extend(input.subscriptions.iter().map(String::as_str));
    if subscriptions.is_empty() {
        bail!("No subscriptions to query; declare ids or pass --subscription");
    }

    let mut az = AzCli::new(settings.timeout);
    let inventory = Inventory::load_live(&mut az, subscriptions)
        .context("Failed to retrieve azure resources")?;
    log::info!("Retrieved {} resource(s)", inventory.len());
    Ok(inventory)
}

/// Explicit `--separator`, if any.
pub fn separator(input: &InputArgs) -> Result<Option<u8>> {
    input.separator.as_deref().map(parse_separator).transpose()
}

fn parse_separator(value: &str) -> Result<u8> {
    match value {
        "tab" | "\\t" | "\t" => Ok(b'\t'),
        s if s.len() == 1 => Ok(s.as_bytes()[0]),
        other => bail!("Separator must be a single character or 'tab', got '{other}'"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FileConfig;

    const SUB: &str = "00000000-0000-0000-0000-000000000001";

    #[test]
    fn test_parse_separator() {
        assert_eq!(parse_separator("|").unwrap(), b'|');
        assert_eq!(parse_separator("tab").unwrap(), b'\t');
        assert!(parse_separator("||").is_err());
    }

    #[test]
    fn test_sibling_exclude_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let tags = dir.path().join("tags.txt");
        std::fs::write(&tags, format!("id|tags.a\n/subscriptions/{SUB}/resourceGroups/rg|x\n"))
            .unwrap();
        std::fs::write(
            dir.path().join("excludeids.csv"),
            format!("id\n/subscriptions/{SUB}/resourceGroups/rg\n"),
        )
        .unwrap();

        let input = InputArgs {
            tag_files: vec![tags],
            ..Default::default()
        };
        let settings = Settings::resolve(&input, None, &FileConfig::default(), 0).unwrap();
        let exclude = load_exclusions(&input, &settings).unwrap();
        assert_eq!(exclude.len(), 1);
    }

    #[test]
    fn test_snapshot_inventory() {
        let dir = tempfile::tempdir().unwrap();
        let groups = dir.path().join("groups.json");
        std::fs::write(
            &groups,
            format!(
                r#"[{{"id": "/subscriptions/{SUB}/resourceGroups/rg", "type": "Microsoft.Resources/resourceGroups", "tags": {{"a": "x"}}}}]"#
            ),
        )
        .unwrap();
        let input = InputArgs {
            az_rgs: Some(groups),
            ..Default::default()
        };
        let settings = Settings::resolve(&input, None, &FileConfig::default(), 0).unwrap();
        let inventory = load_inventory(&input, &Declarations::new(), &settings).unwrap();
        assert_eq!(inventory.len(), 1);
    }

    #[test]
    fn test_live_query_needs_subscriptions() {
        let input = InputArgs::default();
        let settings = Settings::resolve(&input, None, &FileConfig::default(), 0).unwrap();
        assert!(load_inventory(&input, &Declarations::new(), &settings).is_err());
    }
}
