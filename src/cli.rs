use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tagsync")]
#[command(version)]
#[command(about = "Reconcile declared Azure resource tags with live state", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v keeps, -vv skip details and existing tags, ...)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// TOML file with default settings
    #[arg(long, global = true, env = "TAGSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show the tag changes needed to match the declarations
    Plan(PlanArgs),

    /// Apply the tag changes (after confirmation)
    Apply(ApplyArgs),

    /// Write existing tags to declaration-style report files
    Save(SaveArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Shared input flags
// ============================================================================

#[derive(Args, Debug, Default, Clone)]
pub struct InputArgs {
    /// Tag declaration files, applied in order (later files win)
    #[arg(value_name = "TAG_FILE")]
    pub tag_files: Vec<PathBuf>,

    /// Field separator for tag files: '|', ',', or 'tab' (default: by extension)
    #[arg(long)]
    pub separator: Option<String>,

    /// Snapshot of `az resource list` instead of a live query
    #[arg(long, value_name = "JSON")]
    pub az_resources: Option<PathBuf>,

    /// Snapshot of `az group list` instead of a live query
    #[arg(long, value_name = "JSON")]
    pub az_rgs: Option<PathBuf>,

    /// Snapshot of `az account show` / `az account list`
    #[arg(long, value_name = "JSON")]
    pub az_subs: Option<PathBuf>,

    /// Subscriptions to query in addition to those declared
    #[arg(long = "subscription", value_name = "ID")]
    pub subscriptions: Vec<String>,

    /// Tag support CSV (default: download the published list)
    #[arg(long, value_name = "CSV")]
    pub tag_support: Option<PathBuf>,

    /// CSV files of resource ids never to touch
    #[arg(long, value_name = "CSV")]
    pub exclude_ids: Vec<PathBuf>,

    /// Only touch resources whose id matches every regex
    #[arg(long, value_name = "REGEX")]
    pub limit: Vec<String>,

    /// Skip resources that carry any of these tags
    #[arg(long, value_delimiter = ',')]
    pub skip_tags: Vec<String>,

    /// inc, all, or a list such as ADD,UPDATE
    #[arg(long)]
    pub change_types: Option<String>,

    /// Minimum id depth to change (2 = subscription, 4 = resource group)
    #[arg(long)]
    pub min_scope: Option<usize>,

    /// Maximum id depth to change
    #[arg(long)]
    pub max_scope: Option<usize>,
}

impl InputArgs {
    /// Whether any snapshot document was given.
    pub fn uses_snapshot(&self) -> bool {
        self.az_resources.is_some() || self.az_rgs.is_some() || self.az_subs.is_some()
    }
}

#[derive(Args)]
pub struct PlanArgs {
    #[command(flatten)]
    pub input: InputArgs,
}

#[derive(Args)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Print the update commands instead of running them
    #[arg(long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Abort once more than this many resources failed to update [default: 10]
    #[arg(long)]
    pub max_errors: Option<usize>,
}

#[derive(Args)]
pub struct SaveArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Output file (or file prefix when saving one file per tag)
    #[arg(short, long)]
    pub output: PathBuf,

    /// Tags to save: `all`, or a list of names (default: one file per tag)
    #[arg(long, value_delimiter = ',')]
    pub tags: Vec<String>,
}
