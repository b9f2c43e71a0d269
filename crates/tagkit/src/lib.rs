//! # tagkit
//!
//! Declarative tag reconciliation for hierarchical cloud resources
//! (subscription → resource group → resource).
//!
//! The pipeline:
//!
//! - **Declarations**: delimited files of `id` + `tags.<name>` columns,
//!   optionally inheriting down the hierarchy ([`Declarations`])
//! - **Inventory**: the resources that exist and their current tags
//!   ([`Inventory`]), from a snapshot or a live [`StateSource`]
//! - **Resolution**: the effective desired value of every tag on every
//!   resource ([`Resolution`])
//! - **Diff**: one classified [`ChangeRecord`] per (resource, tag)
//! - **Prune**: scope bounds, exclusions, id filters and tag support
//!   ([`Pruner`]) yield a [`Plan`]
//! - **Apply**: sequential updates through a [`TagBackend`] with a failure
//!   budget ([`apply()`])
//!
//! ## Example
//!
//! ```ignore
//! use tagkit::{AutoConfirm, ApplyOptions, Declarations, ExcludeSet, Inventory, NoProgress, RunOptions};
//!
//! let declarations = Declarations::load(&["inherit.subscriptions.txt"], None)?;
//! let inventory = Inventory::load_snapshot(Some("resources.json".as_ref()), None, None)?;
//! let plan = tagkit::plan(&declarations, &inventory, None, &ExcludeSet::new(), &RunOptions::default())?;
//! print!("{}", tagkit::render_plan(&plan, 0));
//!
//! let summary = tagkit::apply(&plan, &ApplyOptions::default(), &mut backend, &mut NoProgress, &mut AutoConfirm)?;
//! ```
//!
//! Nothing in this crate talks to a terminal or spawns processes; the
//! [`TagBackend`], [`StateSource`], [`ProgressCallback`] and
//! [`ConfirmCallback`] traits are the seams for that.

pub mod apply;
pub mod context;
pub mod declaration;
pub mod diff;
pub mod error;
pub mod export;
pub mod filters;
pub mod inventory;
pub mod prune;
pub mod report;
pub mod resolver;
pub mod types;

pub use apply::{ApplySummary, ResourceOutcome, TagBackend, TagUpdate, UpdateMode, apply, updates_for};
pub use context::{AutoConfirm, AutoDecline, ConfirmCallback, NoProgress, ProgressCallback};
pub use declaration::{Declarations, TagEntry, delimiter_for_path, is_inheriting};
pub use diff::{ChangeRecord, ChangeSet, ResourceChanges};
pub use error::{Error, ErrorCategory, Result};
pub use export::{ChangeFilter, TagSelection, save_existing_tags};
pub use filters::{DEFAULT_SUPPORT_URL, ExcludeSet, SupportTable, sibling_exclude_file};
pub use inventory::{Inventory, RecordKind, ResourceInfo, StateSource};
pub use prune::{Plan, Pruner, SkipReason, Skipped};
pub use report::{render_existing, render_plan};
pub use resolver::{Resolution, ResolvedTag};
pub use types::{
    ApplyOptions, ChangeType, ChangeTypes, Level, NO_VALUE, ResourceId, RunOptions, ScopeBounds,
    TagValue,
};

/// Resolve, diff and prune in one go.
pub fn plan(
    declarations: &Declarations,
    inventory: &Inventory,
    support: Option<&SupportTable>,
    exclude: &ExcludeSet,
    options: &RunOptions,
) -> Result<Plan> {
    let resolution = Resolution::resolve(declarations, inventory);
    log::info!(
        "Resolved tags for {} resource(s); {} declared id(s) missing",
        resolution.len(),
        resolution.missing().len()
    );
    let changes = diff::compute(&resolution, inventory, &options.change_types)?;
    Ok(Pruner::new(options, support, exclude).prune(changes, resolution.missing()))
}
