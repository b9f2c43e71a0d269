//! Applier - turns a pruned plan into tag updates, one resource at a time

use crate::context::{ConfirmCallback, ProgressCallback};
use crate::diff::ResourceChanges;
use crate::error::{Error, Result};
use crate::prune::Plan;
use crate::types::{ApplyOptions, ChangeType, ResourceId};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// How a tag set is written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// Add or overwrite the given tags, keep the rest
    Merge,
    /// The given tags become the whole tag set
    Replace,
}

impl fmt::Display for UpdateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateMode::Merge => write!(f, "Merge"),
            UpdateMode::Replace => write!(f, "Replace"),
        }
    }
}

/// A single call against the live system
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagUpdate {
    pub id: ResourceId,
    pub tags: BTreeMap<String, String>,
    pub mode: UpdateMode,
}

/// Backend that writes tags to the live system.
///
/// Updates are idempotent so a failed run can simply be repeated.
pub trait TagBackend {
    /// Human-readable form of the update, printed in dry runs.
    fn describe(&self, update: &TagUpdate) -> String;

    /// Issue the update. Non-fatal errors are counted against the failure
    /// budget; fatal ones (timeouts) end the run.
    fn update(&mut self, update: &TagUpdate) -> Result<()>;
}

/// Result of reconciling one resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceOutcome {
    /// Every update succeeded
    Applied,
    /// Dry run; updates were only described
    Described,
    /// An update failed
    Failed { error: String },
}

impl ResourceOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }
}

/// Summary of an apply run
#[derive(Debug, Default)]
pub struct ApplySummary {
    /// Resources in the plan
    pub total: usize,
    /// Resources processed before the run ended
    pub attempted: usize,
    pub added: usize,
    pub updated: usize,
    pub deleted: usize,
    pub swapped: usize,
    /// Failed resources with the underlying cause
    pub failed: Vec<(ResourceId, String)>,
    /// The failure budget was exceeded
    pub aborted: bool,
    /// Error that ended the run early; updates before it are still counted
    pub fatal: Option<Error>,
    pub dry_run: bool,
}

impl ApplySummary {
    /// Resources never tried because the run was aborted.
    pub fn remaining(&self) -> usize {
        self.total - self.attempted
    }

    pub fn budget_exceeded(&self) -> bool {
        self.aborted
    }

    /// Some resources were never tried.
    pub fn is_incomplete(&self) -> bool {
        self.aborted || self.fatal.is_some()
    }

    fn count(&mut self, resource: &ResourceChanges) {
        self.added += resource.count(ChangeType::Add);
        self.updated += resource.count(ChangeType::Update);
        self.deleted += resource.count(ChangeType::Del);
        self.swapped += resource.count(ChangeType::Swap);
    }
}

/// Updates needed to reconcile one resource, in issue order.
///
/// A resource with case swaps first has its tag set replaced by the tags
/// whose name is unambiguous, which drops both spellings of a swapped name;
/// the regular update then writes the declared spelling.
pub fn updates_for(resource: &ResourceChanges, full: bool) -> Vec<TagUpdate> {
    let mut updates = Vec::new();

    if resource.has_swap() {
        let mut spellings: HashMap<String, usize> = HashMap::new();
        for record in &resource.records {
            *spellings.entry(record.tag.to_lowercase()).or_insert(0) += 1;
        }
        let tags = resource
            .records
            .iter()
            .filter(|r| spellings.get(&r.tag.to_lowercase()) == Some(&1))
            .filter_map(|r| r.target_value().map(|v| (r.tag.clone(), v.to_string())))
            .collect();
        updates.push(TagUpdate {
            id: resource.id.clone(),
            tags,
            mode: UpdateMode::Replace,
        });
    }

    if full {
        let tags = resource
            .records
            .iter()
            .filter_map(|r| r.target_value().map(|v| (r.tag.clone(), v.to_string())))
            .collect();
        updates.push(TagUpdate {
            id: resource.id.clone(),
            tags,
            mode: UpdateMode::Replace,
        });
    } else {
        let tags: BTreeMap<String, String> = resource
            .records
            .iter()
            .filter(|r| matches!(r.change, ChangeType::Add | ChangeType::Update))
            .filter_map(|r| r.target_value().map(|v| (r.tag.clone(), v.to_string())))
            .collect();
        if !tags.is_empty() {
            updates.push(TagUpdate {
                id: resource.id.clone(),
                tags,
                mode: UpdateMode::Merge,
            });
        }
    }

    updates
}

/// Apply a plan.
///
/// Resources are processed sequentially. A failed resource is recorded and
/// the run moves on; once more than `max_failures` resources have failed the
/// remaining ones are left untried. A fatal backend error (timeout) also
/// ends the run; it is stored in [`ApplySummary::fatal`] so the counts of
/// what was already applied survive. Outside a dry run the caller must
/// confirm first, otherwise nothing is done and an invocation error is
/// returned.
pub fn apply<B, P, C>(
    plan: &Plan,
    options: &ApplyOptions,
    backend: &mut B,
    progress: &mut P,
    confirm: &mut C,
) -> Result<ApplySummary>
where
    B: TagBackend,
    P: ProgressCallback,
    C: ConfirmCallback,
{
    let mut summary = ApplySummary {
        total: plan.changes.len(),
        dry_run: options.dry_run,
        ..Default::default()
    };
    if plan.changes.is_empty() {
        return Ok(summary);
    }

    if !options.dry_run
        && !confirm.confirm(&format!("Update {} resource(s)?", summary.total))?
    {
        return Err(Error::Invocation(
            "apply was not confirmed; nothing was changed".to_string(),
        ));
    }

    for (index, resource) in plan.changes.iter().enumerate() {
        progress.on_resource_start(index, summary.total, &resource.id);
        summary.attempted += 1;

        let outcome = match apply_resource(resource, options, backend, progress) {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("{e}; {} resource(s) left untried", summary.remaining());
                summary.fatal = Some(e);
                break;
            }
        };
        progress.on_resource_complete(&resource.id, &outcome);

        match outcome {
            ResourceOutcome::Failed { error } => {
                log::warn!("Update failed for {}: {error}", resource.id);
                summary.failed.push((resource.id.clone(), error));
                if summary.failed.len() > options.max_failures {
                    log::error!(
                        "More than {} failure(s); {} resource(s) left untried",
                        options.max_failures,
                        summary.remaining()
                    );
                    summary.aborted = true;
                    break;
                }
            }
            ResourceOutcome::Applied | ResourceOutcome::Described => summary.count(resource),
        }
    }

    Ok(summary)
}

fn apply_resource<B, P>(
    resource: &ResourceChanges,
    options: &ApplyOptions,
    backend: &mut B,
    progress: &mut P,
) -> Result<ResourceOutcome>
where
    B: TagBackend,
    P: ProgressCallback,
{
    let updates = updates_for(resource, options.full);
    for (step, update) in updates.iter().enumerate() {
        progress.on_command(&backend.describe(update));
        if options.dry_run {
            continue;
        }
        if step > 0 && !options.swap_settle.is_zero() {
            std::thread::sleep(options.swap_settle);
        }
        match backend.update(update) {
            Ok(()) => {}
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                return Ok(ResourceOutcome::Failed {
                    error: e.to_string(),
                });
            }
        }
    }

    Ok(if options.dry_run {
        ResourceOutcome::Described
    } else {
        ResourceOutcome::Applied
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{AutoConfirm, AutoDecline, NoProgress};
    use crate::diff::{ChangeRecord, ChangeSet};
    use crate::types::TagValue;
    use std::time::Duration;

    const SUB: &str = "00000000-0000-0000-0000-000000000001";

    fn rid(suffix: &str) -> ResourceId {
        ResourceId::parse(&format!("/subscriptions/{SUB}{suffix}")).unwrap()
    }

    fn record(
        tag: &str,
        existing: Option<&str>,
        desired: Option<&str>,
        change: ChangeType,
    ) -> ChangeRecord {
        ChangeRecord {
            tag: tag.into(),
            existing: existing.map(str::to_string),
            desired: desired.map(|v| TagValue::Value(v.into())),
            change,
            source_depth: desired.map(|_| 4),
        }
    }

    /// Records every update; fails ids listed in `failing`.
    #[derive(Default)]
    struct RecordingBackend {
        calls: Vec<TagUpdate>,
        failing: Vec<ResourceId>,
        timing_out: Vec<ResourceId>,
    }

    impl TagBackend for RecordingBackend {
        fn describe(&self, update: &TagUpdate) -> String {
            format!("{} {} {:?}", update.mode, update.id, update.tags)
        }

        fn update(&mut self, update: &TagUpdate) -> Result<()> {
            self.calls.push(update.clone());
            if self.timing_out.contains(&update.id) {
                return Err(Error::Timeout {
                    command: "az tag update".into(),
                    secs: 300,
                });
            }
            if self.failing.contains(&update.id) {
                return Err(Error::Update {
                    resource: update.id.to_string(),
                    message: "exit status 1".into(),
                });
            }
            Ok(())
        }
    }

    fn options() -> ApplyOptions {
        ApplyOptions {
            swap_settle: Duration::ZERO,
            ..Default::default()
        }
    }

    fn plan_of(n: usize) -> Plan {
        let mut changes = ChangeSet::new();
        for i in 0..n {
            changes.insert(ResourceChanges {
                id: rid(&format!("/resourceGroups/rg{i}")),
                resource_type: Some("Microsoft.Resources/resourceGroups".into()),
                records: vec![
                    record("env", None, Some("prod"), ChangeType::Add),
                    record("owner", Some("me"), None, ChangeType::Leave),
                ],
            });
        }
        Plan {
            changes,
            skipped: Vec::new(),
        }
    }

    #[test]
    fn test_incremental_update_merges_changed_tags_only() {
        let resource = ResourceChanges {
            id: rid("/resourceGroups/rg"),
            resource_type: None,
            records: vec![
                record("a", None, Some("1"), ChangeType::Add),
                record("b", Some("0"), Some("2"), ChangeType::Update),
                record("c", Some("3"), Some("3"), ChangeType::Keep),
                record("d", Some("x"), None, ChangeType::Leave),
            ],
        };
        let updates = updates_for(&resource, false);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].mode, UpdateMode::Merge);
        assert_eq!(
            updates[0].tags,
            BTreeMap::from([("a".into(), "1".into()), ("b".into(), "2".into())])
        );
    }

    #[test]
    fn test_full_update_replaces_and_drops_deleted() {
        let resource = ResourceChanges {
            id: rid("/resourceGroups/rg"),
            resource_type: None,
            records: vec![
                record("a", None, Some("1"), ChangeType::Add),
                record("c", Some("3"), Some("3"), ChangeType::Keep),
                record("gone", Some("x"), None, ChangeType::Del),
            ],
        };
        let updates = updates_for(&resource, true);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].mode, UpdateMode::Replace);
        assert_eq!(
            updates[0].tags,
            BTreeMap::from([("a".into(), "1".into()), ("c".into(), "3".into())])
        );
    }

    #[test]
    fn test_swap_is_two_phase() {
        let resource = ResourceChanges {
            id: rid("/resourceGroups/rg"),
            resource_type: None,
            records: vec![
                record("Service", None, Some("portal"), ChangeType::Add),
                record("service", Some("portal"), None, ChangeType::Swap),
                record("owner", Some("me"), None, ChangeType::Leave),
            ],
        };
        let updates = updates_for(&resource, false);
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].mode, UpdateMode::Replace);
        assert_eq!(
            updates[0].tags,
            BTreeMap::from([("owner".into(), "me".into())])
        );
        assert_eq!(
            updates[1].tags,
            BTreeMap::from([("Service".into(), "portal".into())])
        );
    }

    #[test]
    fn test_apply_requires_confirmation() {
        let mut backend = RecordingBackend::default();
        let err = apply(&plan_of(1), &options(), &mut backend, &mut NoProgress, &mut AutoDecline)
            .unwrap_err();
        assert!(matches!(err, Error::Invocation(_)));
        assert!(backend.calls.is_empty());
    }

    #[test]
    fn test_dry_run_issues_no_calls() {
        let mut backend = RecordingBackend::default();
        let opts = ApplyOptions {
            dry_run: true,
            ..options()
        };
        let summary =
            apply(&plan_of(2), &opts, &mut backend, &mut NoProgress, &mut AutoDecline).unwrap();
        assert!(backend.calls.is_empty());
        assert_eq!(summary.added, 2);
        assert!(summary.dry_run);
        assert!(!summary.budget_exceeded());
    }

    #[test]
    fn test_failures_are_counted_and_skipped() {
        let mut backend = RecordingBackend {
            failing: vec![rid("/resourceGroups/rg1")],
            ..Default::default()
        };
        let summary =
            apply(&plan_of(3), &options(), &mut backend, &mut NoProgress, &mut AutoConfirm)
                .unwrap();
        assert_eq!(backend.calls.len(), 3);
        assert_eq!(summary.added, 2);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, rid("/resourceGroups/rg1"));
        assert!(!summary.aborted);
    }

    #[test]
    fn test_failure_budget_aborts_run() {
        let plan = plan_of(5);
        let mut backend = RecordingBackend {
            failing: plan.changes.iter().map(|c| c.id.clone()).collect(),
            ..Default::default()
        };
        let opts = ApplyOptions {
            max_failures: 2,
            ..options()
        };
        let summary = apply(&plan, &opts, &mut backend, &mut NoProgress, &mut AutoConfirm).unwrap();
        assert_eq!(backend.calls.len(), 3);
        assert_eq!(summary.failed.len(), 3);
        assert_eq!(summary.remaining(), 2);
        assert!(summary.budget_exceeded());
    }

    #[test]
    fn test_timeout_ends_the_run_and_keeps_counts() {
        let mut backend = RecordingBackend {
            timing_out: vec![rid("/resourceGroups/rg1")],
            ..Default::default()
        };
        let summary =
            apply(&plan_of(3), &options(), &mut backend, &mut NoProgress, &mut AutoConfirm)
                .unwrap();
        assert_eq!(backend.calls.len(), 2);
        assert_eq!(summary.added, 1);
        assert_eq!(summary.attempted, 2);
        assert_eq!(summary.remaining(), 1);
        assert!(summary.failed.is_empty());
        assert!(!summary.budget_exceeded());
        assert!(summary.is_incomplete());
        assert!(summary.fatal.as_ref().is_some_and(Error::is_fatal));
    }
}
