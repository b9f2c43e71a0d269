//! Change-set pruning: scope bounds, exclusions, id filters, skip-tags and
//! tag support.

use crate::diff::{ChangeSet, ResourceChanges};
use crate::filters::{ExcludeSet, SupportTable};
use crate::types::{ChangeType, Level, ResourceId, RunOptions};
use std::fmt;

/// Why a resource was removed from the change-set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    BelowMinScope,
    AboveMaxScope,
    Excluded,
    FilteredOut,
    Subscription,
    /// Carries one of the skip-tags
    SkipTag,
    UnknownType,
    /// Empty resource type
    BadType,
    UnsupportedType(String),
    Untaggable,
    /// Declared but absent from the inventory
    Missing,
}

impl SkipReason {
    /// Verbosity level from which the reason is printed; 0 means always.
    pub fn verbosity(&self) -> u8 {
        match self {
            Self::BelowMinScope | Self::AboveMaxScope => 4,
            Self::FilteredOut => 3,
            Self::Excluded | Self::Subscription | Self::SkipTag | Self::Untaggable => 2,
            Self::UnknownType | Self::BadType | Self::UnsupportedType(_) | Self::Missing => 0,
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BelowMinScope => write!(f, "SKIPPING resource less than minscope"),
            Self::AboveMaxScope => write!(f, "SKIPPING resource exceeds maxscope"),
            Self::Excluded => write!(f, "SKIPPING excluded resource"),
            Self::FilteredOut => write!(f, "SKIPPING filtered out resource"),
            Self::Subscription => write!(f, "SKIPPING subscription resource ID"),
            Self::SkipTag => write!(f, "SKIPPING resource has one or more skipped tags"),
            Self::UnknownType => write!(f, "WARNING ignoring resource with unknown type"),
            Self::BadType => write!(f, "WARNING ignoring resource with bad type"),
            Self::UnsupportedType(kind) => write!(
                f,
                "WARNING ignoring resource as type not found in supported tag CSV [{kind}]"
            ),
            Self::Untaggable => write!(f, "SKIPPING untaggable resource"),
            Self::Missing => write!(f, "WARNING: Resource does not exist"),
        }
    }
}

/// A resource removed from the change-set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skipped {
    pub id: ResourceId,
    pub reason: SkipReason,
}

/// Pruned change-set ready for reporting and applying
#[derive(Debug, Clone, Default)]
pub struct Plan {
    /// Resources with at least one actionable record
    pub changes: ChangeSet,
    /// Resources removed by a filter, in encounter order
    pub skipped: Vec<Skipped>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Decides which resources may be changed in a run
pub struct Pruner<'a> {
    options: &'a RunOptions,
    support: Option<&'a SupportTable>,
    exclude: &'a ExcludeSet,
}

impl<'a> Pruner<'a> {
    /// Without a support table no resource type is rejected.
    pub fn new(
        options: &'a RunOptions,
        support: Option<&'a SupportTable>,
        exclude: &'a ExcludeSet,
    ) -> Self {
        Self {
            options,
            support,
            exclude,
        }
    }

    /// First reason the resource must be left alone, if any.
    pub fn check(&self, changes: &ResourceChanges) -> Option<SkipReason> {
        let id = &changes.id;
        let depth = id.depth();

        if self.options.scope.below_min(depth) {
            return Some(SkipReason::BelowMinScope);
        }
        if self.options.scope.above_max(depth) {
            return Some(SkipReason::AboveMaxScope);
        }
        if self.exclude.contains(id) {
            return Some(SkipReason::Excluded);
        }
        if !self.options.id_filters.iter().all(|re| re.is_match(id.key())) {
            return Some(SkipReason::FilteredOut);
        }
        if id.level() == Level::Subscription {
            return Some(SkipReason::Subscription);
        }
        if self
            .options
            .skip_tags
            .iter()
            .any(|tag| changes.has_existing(tag))
        {
            return Some(SkipReason::SkipTag);
        }

        let kind = match changes.resource_type.as_deref() {
            None => return Some(SkipReason::UnknownType),
            Some("") => return Some(SkipReason::BadType),
            Some(kind) => kind,
        };
        match self.support.map(|table| table.lookup(kind)) {
            Some(None) => Some(SkipReason::UnsupportedType(kind.to_string())),
            Some(Some(false)) => Some(SkipReason::Untaggable),
            Some(Some(true)) | None => None,
        }
    }

    /// Filter a change-set. `missing` lists declared ids absent from the
    /// inventory; they are reported as skipped.
    pub fn prune(&self, changes: ChangeSet, missing: &[ResourceId]) -> Plan {
        let mut plan = Plan {
            changes: ChangeSet::new(),
            skipped: missing
                .iter()
                .map(|id| Skipped {
                    id: id.clone(),
                    reason: SkipReason::Missing,
                })
                .collect(),
        };

        for mut resource in changes {
            if let Some(reason) = self.check(&resource) {
                log::debug!("{reason}: {}", resource.id);
                plan.skipped.push(Skipped {
                    id: resource.id,
                    reason,
                });
                continue;
            }

            normalize(&mut resource);
            if resource.has_actionable() {
                plan.changes.insert(resource);
            }
        }
        plan
    }
}

/// Downgrade updates whose old and new values already agree.
fn normalize(resource: &mut ResourceChanges) {
    for record in &mut resource.records {
        if record.change == ChangeType::Update
            && let (Some(existing), Some(desired)) = (&record.existing, &record.desired)
            && existing == desired.as_str()
        {
            record.change = ChangeType::Keep;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::ChangeRecord;
    use crate::types::{ScopeBounds, TagValue};

    const SUB: &str = "00000000-0000-0000-0000-000000000001";
    const VM_TYPE: &str = "Microsoft.Compute/virtualMachines";

    fn rid(suffix: &str) -> ResourceId {
        ResourceId::parse(&format!("/subscriptions/{SUB}{suffix}")).unwrap()
    }

    fn add(tag: &str, value: &str) -> ChangeRecord {
        ChangeRecord {
            tag: tag.into(),
            existing: None,
            desired: Some(TagValue::Value(value.into())),
            change: ChangeType::Add,
            source_depth: Some(2),
        }
    }

    fn resource(suffix: &str, kind: Option<&str>, records: Vec<ChangeRecord>) -> ResourceChanges {
        ResourceChanges {
            id: rid(suffix),
            resource_type: kind.map(str::to_string),
            records,
        }
    }

    fn sample() -> ChangeSet {
        let mut set = ChangeSet::new();
        set.insert(resource("", None, vec![add("env", "prod")]));
        set.insert(resource(
            "/resourceGroups/rg",
            Some("Microsoft.Resources/resourceGroups"),
            vec![add("env", "prod")],
        ));
        set.insert(resource(
            "/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines/vm",
            Some(VM_TYPE),
            vec![add("env", "prod")],
        ));
        set
    }

    fn support() -> SupportTable {
        let mut table = SupportTable::new();
        table.insert(VM_TYPE, true);
        table.insert("Microsoft.Resources/resourceGroups", true);
        table
    }

    #[test]
    fn test_subscriptions_are_never_targets() {
        let options = RunOptions::default();
        let exclude = ExcludeSet::new();
        let plan = Pruner::new(&options, None, &exclude).prune(sample(), &[]);
        assert_eq!(plan.changes.len(), 2);
        assert_eq!(plan.skipped.len(), 1);
        assert_eq!(plan.skipped[0].reason, SkipReason::Subscription);
    }

    #[test]
    fn test_min_scope_protects_groups() {
        let options = RunOptions {
            scope: ScopeBounds::new(Some(5), None).unwrap(),
            ..Default::default()
        };
        let exclude = ExcludeSet::new();
        let plan = Pruner::new(&options, Some(&support()), &exclude).prune(sample(), &[]);
        assert_eq!(plan.changes.len(), 1);
        assert!(plan.changes.iter().all(|c| c.id.depth() > 4));
    }

    #[test]
    fn test_exclusion_wins() {
        let options = RunOptions::default();
        let mut exclude = ExcludeSet::new();
        exclude.insert(rid("/resourceGroups/RG"));
        let plan = Pruner::new(&options, Some(&support()), &exclude).prune(sample(), &[]);
        assert!(plan.changes.get(&rid("/resourceGroups/rg")).is_none());
        assert!(plan
            .skipped
            .iter()
            .any(|s| s.reason == SkipReason::Excluded && s.reason.verbosity() == 2));
    }

    #[test]
    fn test_support_table() {
        let options = RunOptions::default();
        let exclude = ExcludeSet::new();
        let mut table = SupportTable::new();
        table.insert(VM_TYPE, false);
        let plan = Pruner::new(&options, Some(&table), &exclude).prune(sample(), &[]);
        let reasons: Vec<_> = plan.skipped.iter().map(|s| s.reason.clone()).collect();
        assert!(reasons.contains(&SkipReason::Untaggable));
        assert!(reasons.contains(&SkipReason::UnsupportedType(
            "Microsoft.Resources/resourceGroups".into()
        )));
        assert!(plan.changes.is_empty());
    }

    #[test]
    fn test_missing_or_empty_type_is_ignored() {
        let options = RunOptions::default();
        let exclude = ExcludeSet::new();
        let mut set = ChangeSet::new();
        set.insert(resource("/resourceGroups/a", None, vec![add("env", "prod")]));
        set.insert(resource("/resourceGroups/b", Some(""), vec![add("env", "prod")]));
        let plan = Pruner::new(&options, None, &exclude).prune(set, &[]);
        let reasons: Vec<_> = plan.skipped.iter().map(|s| s.reason.clone()).collect();
        assert_eq!(reasons, vec![SkipReason::UnknownType, SkipReason::BadType]);
        assert!(reasons.iter().all(|r| r.verbosity() == 0));
    }

    #[test]
    fn test_skip_reason_text() {
        assert_eq!(
            SkipReason::SkipTag.to_string(),
            "SKIPPING resource has one or more skipped tags"
        );
        assert_eq!(
            SkipReason::UnknownType.to_string(),
            "WARNING ignoring resource with unknown type"
        );
        assert_eq!(
            SkipReason::UnsupportedType("microsoft.foo/bars".into()).to_string(),
            "WARNING ignoring resource as type not found in supported tag CSV [microsoft.foo/bars]"
        );
    }

    #[test]
    fn test_id_filters_and_skip_tags() {
        let options = RunOptions::default().with_id_filters(&["virtualmachines"]).unwrap();
        let exclude = ExcludeSet::new();
        let plan = Pruner::new(&options, None, &exclude).prune(sample(), &[]);
        // Keys keep resource-type case, so the lower-case pattern misses.
        assert!(plan.changes.is_empty());

        let options = RunOptions {
            skip_tags: vec!["frozen".into()],
            ..Default::default()
        };
        let mut set = sample();
        set.insert(resource(
            "/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines/vm",
            Some(VM_TYPE),
            vec![
                add("env", "prod"),
                ChangeRecord {
                    tag: "frozen".into(),
                    existing: Some("yes".into()),
                    desired: None,
                    change: ChangeType::Leave,
                    source_depth: None,
                },
            ],
        ));
        let plan = Pruner::new(&options, None, &exclude).prune(set, &[]);
        assert!(plan
            .skipped
            .iter()
            .any(|s| s.reason == SkipReason::SkipTag));
    }

    #[test]
    fn test_quiet_resources_and_equal_updates_are_dropped() {
        let mut set = ChangeSet::new();
        set.insert(resource(
            "/resourceGroups/rg",
            Some("Microsoft.Resources/resourceGroups"),
            vec![ChangeRecord {
                tag: "env".into(),
                existing: Some("prod".into()),
                desired: Some(TagValue::Value("prod".into())),
                change: ChangeType::Update,
                source_depth: Some(4),
            }],
        ));
        let options = RunOptions::default();
        let exclude = ExcludeSet::new();
        let plan = Pruner::new(&options, None, &exclude).prune(set, &[rid("/resourceGroups/gone")]);
        assert!(plan.is_empty());
        assert_eq!(plan.skipped[0].reason, SkipReason::Missing);
        assert_eq!(plan.skipped[0].reason.verbosity(), 0);
    }
}
