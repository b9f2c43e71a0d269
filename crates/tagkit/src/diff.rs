//! Diff computation between desired and existing tags

use crate::error::{Error, Result};
use crate::inventory::Inventory;
use crate::resolver::Resolution;
use crate::types::{ChangeType, ChangeTypes, ResourceId, TagValue};
use std::collections::{BTreeMap, HashMap};

/// One classified (resource, tag) comparison
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    pub tag: String,
    /// Current value, `None` if the tag is absent
    pub existing: Option<String>,
    /// Desired value, `None` if the tag is undeclared
    pub desired: Option<TagValue>,
    pub change: ChangeType,
    /// Depth of the level the desired value was declared on
    pub source_depth: Option<usize>,
}

impl ChangeRecord {
    /// Value the tag should carry once the resource is reconciled, if any.
    pub fn target_value(&self) -> Option<&str> {
        match self.change {
            ChangeType::Add | ChangeType::Update | ChangeType::Keep => {
                self.desired.as_ref().map(TagValue::as_str)
            }
            ChangeType::Leave => self.existing.as_deref(),
            ChangeType::Del | ChangeType::Swap => None,
        }
    }
}

/// All records for one resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceChanges {
    pub id: ResourceId,
    pub resource_type: Option<String>,
    /// Sorted by case-folded tag name so case swaps sit together
    pub records: Vec<ChangeRecord>,
}

impl ResourceChanges {
    pub fn count(&self, change: ChangeType) -> usize {
        self.records.iter().filter(|r| r.change == change).count()
    }

    /// Whether any record needs a call to the live system.
    pub fn has_actionable(&self) -> bool {
        self.records.iter().any(|r| r.change.is_actionable())
    }

    pub fn has_swap(&self) -> bool {
        self.records.iter().any(|r| r.change == ChangeType::Swap)
    }

    pub fn record(&self, tag: &str) -> Option<&ChangeRecord> {
        self.records.iter().find(|r| r.tag == tag)
    }

    /// Whether the resource currently carries `tag`.
    pub fn has_existing(&self, tag: &str) -> bool {
        self.records
            .iter()
            .any(|r| r.tag == tag && r.existing.is_some())
    }
}

/// Change records for a run, ordered by resource id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    resources: BTreeMap<ResourceId, ResourceChanges>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, changes: ResourceChanges) {
        self.resources.insert(changes.id.clone(), changes);
    }

    pub fn get(&self, id: &ResourceId) -> Option<&ResourceChanges> {
        self.resources.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceChanges> {
        self.resources.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ResourceChanges> {
        self.resources.values_mut()
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&ResourceChanges) -> bool) {
        self.resources.retain(|_, changes| keep(changes));
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Record counts indexed by [`ChangeType::index`].
    pub fn counts(&self) -> [usize; 6] {
        let mut counts = [0; 6];
        for record in self.resources.values().flat_map(|c| &c.records) {
            counts[record.change.index()] += 1;
        }
        counts
    }

    pub fn count(&self, change: ChangeType) -> usize {
        self.counts()[change.index()]
    }
}

impl IntoIterator for ChangeSet {
    type Item = ResourceChanges;
    type IntoIter = std::collections::btree_map::IntoValues<ResourceId, ResourceChanges>;

    fn into_iter(self) -> Self::IntoIter {
        self.resources.into_values()
    }
}

/// Compare resolved desired tags against the inventory.
///
/// Only resources with at least one resolved tag get records; every other
/// resource is unconstrained and never touched.
pub fn compute(
    resolution: &Resolution,
    inventory: &Inventory,
    change_types: &ChangeTypes,
) -> Result<ChangeSet> {
    let mut set = ChangeSet::new();

    for (id, desired) in resolution.iter() {
        let Some(info) = inventory.get(id) else {
            continue;
        };

        let mut folded: HashMap<String, &str> = HashMap::new();
        for tag in desired.keys() {
            if let Some(first) = folded.insert(tag.to_lowercase(), tag) {
                return Err(Error::DuplicateTag {
                    resource: id.to_string(),
                    first: first.to_string(),
                    second: tag.clone(),
                });
            }
        }

        let mut records = Vec::new();

        for (tag, resolved) in desired {
            let existing = info.tags.get(tag);
            let change = match existing {
                None => ChangeType::Add,
                Some(value) if value == resolved.value.as_str() => ChangeType::Keep,
                Some(_) => ChangeType::Update,
            };
            records.push(ChangeRecord {
                tag: tag.clone(),
                existing: existing.cloned(),
                desired: Some(resolved.value.clone()),
                change: select(change, change_types),
                source_depth: Some(resolved.source_depth()),
            });
        }

        for (tag, value) in &info.tags {
            if desired.contains_key(tag) {
                continue;
            }
            let change = if folded.contains_key(&tag.to_lowercase()) {
                ChangeType::Swap
            } else if change_types.is_full() {
                ChangeType::Del
            } else {
                ChangeType::Leave
            };
            records.push(ChangeRecord {
                tag: tag.clone(),
                existing: Some(value.clone()),
                desired: None,
                change: select(change, change_types),
                source_depth: None,
            });
        }

        records.sort_by(|a, b| {
            a.tag
                .to_lowercase()
                .cmp(&b.tag.to_lowercase())
                .then_with(|| a.tag.cmp(&b.tag))
        });

        set.insert(ResourceChanges {
            id: info.id.clone(),
            resource_type: info.resource_type.clone(),
            records,
        });
    }

    Ok(set)
}

/// Unselected change types degrade to LEAVE: the existing value stays.
fn select(change: ChangeType, change_types: &ChangeTypes) -> ChangeType {
    if change_types.contains(change) {
        change
    } else {
        ChangeType::Leave
    }
}
