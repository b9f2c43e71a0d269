//! Plain-text console reports.
//!
//! The plan report is the artifact operators review before applying, and it
//! is compared verbatim in tests, so every column width here is fixed.

use crate::diff::{ChangeRecord, ResourceChanges};
use crate::inventory::Inventory;
use crate::prune::Plan;
use crate::types::{ChangeType, Level, TagValue, scope_label};
use std::collections::BTreeMap;
use std::fmt::Write;

/// Tag names at least this long do not widen the tag column.
const MAX_ALIGNED_TAG: usize = 30;

/// Render skip reasons, the per-subscription diff and the totals.
pub fn render_plan(plan: &Plan, verbose: u8) -> String {
    let mut out = String::new();

    for skipped in &plan.skipped {
        if skipped.reason.verbosity() <= verbose {
            writeln!(out, "{}: {}", skipped.reason, skipped.id).unwrap();
        }
    }

    // Only declared tags size the column; left or deleted names may overflow.
    let width = aligned_width(
        plan.changes
            .iter()
            .flat_map(|c| &c.records)
            .filter(|r| r.desired.is_some())
            .map(|r| r.tag.as_str()),
    );

    let mut totals = Counts::default();
    let mut current: Option<(&str, Counts)> = None;

    for resource in plan.changes.iter() {
        let subscription = resource.id.subscription_id();
        match &mut current {
            Some((sub, counts)) if *sub == subscription => counts.add(resource),
            _ => {
                if let Some((_, counts)) = current.take() {
                    write_summary(&mut out, "  SUMMARY ", &counts);
                }
                writeln!(out, "SUB /subscriptions/{subscription}").unwrap();
                let mut counts = Counts::default();
                counts.add(resource);
                current = Some((subscription, counts));
            }
        }
        totals.add(resource);
        write_resource(&mut out, resource, width, verbose);
    }
    if let Some((_, counts)) = current {
        write_summary(&mut out, "  SUMMARY ", &counts);
    }

    write!(out, "TOTAL: {} id(s) skipped; ", plan.skipped.len()).unwrap();
    write_summary(&mut out, "", &totals);
    out
}

fn aligned_width<'a>(tags: impl Iterator<Item = &'a str>) -> usize {
    tags.map(|tag| tag.chars().count())
        .filter(|len| *len < MAX_ALIGNED_TAG)
        .max()
        .unwrap_or(0)
}

#[derive(Debug, Default)]
struct Counts {
    ids: usize,
    tags: [usize; 6],
}

impl Counts {
    fn add(&mut self, resource: &ResourceChanges) {
        self.ids += 1;
        for record in &resource.records {
            self.tags[record.change.index()] += 1;
        }
    }
}

fn write_summary(out: &mut String, prefix: &str, counts: &Counts) {
    if prefix.is_empty() {
        write!(out, "{} id(s) to update", counts.ids).unwrap();
    } else {
        write!(out, "{prefix}{:>4} id(s) to update", counts.ids).unwrap();
    }
    for change in ChangeType::ALL {
        let n = counts.tags[change.index()];
        if n > 0 {
            write!(out, "; {n} tag(s) to {}", change.label().to_lowercase()).unwrap();
        }
    }
    out.push('\n');
}

fn write_resource(out: &mut String, resource: &ResourceChanges, width: usize, verbose: u8) {
    writeln!(out, "  ID {}", resource.id.display_suffix()).unwrap();
    for record in &resource.records {
        if record.change == ChangeType::Keep && verbose == 0 {
            continue;
        }
        let scope = record
            .source_depth
            .map(|depth| format!("[{}]", scope_label(depth)))
            .unwrap_or_default();
        let from = match (&record.change, record.existing.as_deref()) {
            (ChangeType::Update, Some(old)) if !old.is_empty() => format!(" [from {old}]"),
            _ => String::new(),
        };
        writeln!(
            out,
            "    {:<6} {:<5} tags.{:<width$}: {}{}",
            record.change.label(),
            scope,
            record.tag,
            display_value(record),
            from,
        )
        .unwrap();
    }
}

/// The value a report line shows: the desired one for changes that write,
/// the current one for tags that are left, deleted or renamed. A blank
/// value shows as nothing.
fn display_value(record: &ChangeRecord) -> &str {
    let desired = record.desired.as_ref().map(TagValue::as_str);
    let existing = record.existing.as_deref();
    match record.change {
        ChangeType::Add | ChangeType::Update | ChangeType::Keep => desired.or(existing),
        ChangeType::Leave | ChangeType::Del | ChangeType::Swap => existing.or(desired),
    }
    .unwrap_or_default()
}

/// Existing-tag overview: per-resource listing from `-vv`, per-tag counts
/// from `-v`. Subscriptions are left out. Empty when not verbose.
pub fn render_existing(inventory: &Inventory, verbose: u8) -> String {
    let mut out = String::new();
    if verbose == 0 {
        return out;
    }

    let resources: Vec<_> = inventory
        .iter()
        .filter(|info| info.id.level() != Level::Subscription)
        .collect();
    let width = aligned_width(
        resources
            .iter()
            .flat_map(|info| info.tags.keys())
            .map(String::as_str),
    );

    out.push_str("EXISTING TAGS\n");
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for info in &resources {
        if verbose >= 2 {
            writeln!(out, "  RESOURCE {}", info.id).unwrap();
        }
        for (tag, value) in &info.tags {
            *counts.entry(tag.as_str()).or_insert(0) += 1;
            if verbose >= 2 {
                writeln!(out, "  {tag:>width$}: {value}").unwrap();
            }
        }
    }
    for (tag, count) in counts {
        writeln!(out, "  TAG tags.{tag:<width$}: {count} id(s)").unwrap();
    }
    out
}
