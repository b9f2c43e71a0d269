//! Inheritance resolution.
//!
//! For every resource in the inventory and every declared tag name, the
//! effective desired value is the most specific declaration that applies:
//!
//! - an entry on the resource itself always applies;
//! - an entry on an ancestor applies only if it inherits, otherwise the walk
//!   continues upward past it.
//!
//! Declarations of the same (id, tag) in several files collapse to the last
//! loaded one, inherits flag included.

use crate::declaration::{Declarations, TagEntry};
use crate::inventory::Inventory;
use crate::types::{ResourceId, TagValue};
use std::collections::{BTreeMap, HashMap};

/// Effective desired value of one tag on one resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTag {
    pub value: TagValue,
    /// Id the winning declaration was made on
    pub declared_on: ResourceId,
}

impl ResolvedTag {
    /// Depth of the declaring level, used for the scope column of reports.
    pub fn source_depth(&self) -> usize {
        self.declared_on.depth()
    }
}

/// Desired tags for every constrained resource
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    resources: BTreeMap<ResourceId, BTreeMap<String, ResolvedTag>>,
    missing: Vec<ResourceId>,
}

/// Winning entry per id key, then per tag name.
type EntryIndex<'a> = HashMap<&'a str, HashMap<&'a str, &'a TagEntry>>;

fn index_entries(declarations: &Declarations) -> EntryIndex<'_> {
    let mut index: EntryIndex<'_> = HashMap::new();
    for entry in declarations.entries() {
        let per_tag = index.entry(entry.id.key()).or_default();
        if let Some(previous) = per_tag.insert(entry.tag.as_str(), entry) {
            log::debug!(
                "tags.{} for {} from file #{} replaced by file #{}",
                entry.tag,
                entry.id,
                previous.source,
                entry.source
            );
        }
    }
    index
}

impl Resolution {
    /// Resolve every declared tag against the inventory's hierarchy.
    pub fn resolve(declarations: &Declarations, inventory: &Inventory) -> Self {
        let index = index_entries(declarations);
        let tag_names = declarations.tag_names();

        let mut resources = BTreeMap::new();
        for info in inventory.iter() {
            let mut tags = BTreeMap::new();
            for tag in &tag_names {
                if let Some(entry) = applicable_entry(&index, &info.id, tag) {
                    tags.insert(
                        (*tag).to_string(),
                        ResolvedTag {
                            value: entry.value.clone(),
                            declared_on: entry.id.clone(),
                        },
                    );
                }
            }
            if !tags.is_empty() {
                resources.insert(info.id.clone(), tags);
            }
        }

        let missing = declarations
            .ids()
            .into_iter()
            .filter(|id| !inventory.contains(id))
            .cloned()
            .collect();

        Self { resources, missing }
    }

    /// Desired tags of a resource; `None` when nothing constrains it.
    pub fn get(&self, id: &ResourceId) -> Option<&BTreeMap<String, ResolvedTag>> {
        self.resources.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ResourceId, &BTreeMap<String, ResolvedTag>)> {
        self.resources.iter()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Declared ids that do not exist in the inventory.
    pub fn missing(&self) -> &[ResourceId] {
        &self.missing
    }
}

fn applicable_entry<'a>(
    index: &EntryIndex<'a>,
    id: &ResourceId,
    tag: &str,
) -> Option<&'a TagEntry> {
    let lookup = |key: &str| index.get(key).and_then(|per_tag| per_tag.get(tag)).copied();

    if let Some(own) = lookup(id.key()) {
        return Some(own);
    }
    id.ancestor_keys()
        .filter_map(lookup)
        .find(|entry| entry.inherits)
}
