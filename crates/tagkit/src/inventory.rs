//! Existing resource and tag state.
//!
//! The inventory is built from documents in the platform's native list
//! format: resources (`az resource list`), resource groups (`az group list`)
//! and subscriptions (`az account show` / `az account list`). They can come
//! from a previously captured snapshot or from a live [`StateSource`].
//! Either way the inventory must be complete before resolution starts, so
//! any failure aborts loading.

use crate::error::{Error, Result};
use crate::types::ResourceId;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Tag name prefixes the platform manages itself.
const INTERNAL_TAG_PREFIXES: [&str; 2] = ["hidden-", "link:"];

/// Which list document a record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Resource,
    ResourceGroup,
    Subscription,
}

impl RecordKind {
    pub const ALL: [RecordKind; 3] = [
        RecordKind::Resource,
        RecordKind::ResourceGroup,
        RecordKind::Subscription,
    ];
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Resource => write!(f, "resources"),
            RecordKind::ResourceGroup => write!(f, "resource groups"),
            RecordKind::Subscription => write!(f, "subscriptions"),
        }
    }
}

/// Source of live state, one document per (subscription, kind).
pub trait StateSource {
    /// Return the raw JSON list document.
    fn fetch(&mut self, subscription_id: &str, kind: RecordKind) -> Result<String>;
}

/// A resource as it currently exists
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceInfo {
    pub id: ResourceId,
    /// `provider/type`; `None` for subscriptions
    pub resource_type: Option<String>,
    /// Current tags; empty when the resource has none
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ListRecord {
    id: Option<String>,
    #[serde(rename = "type")]
    resource_type: Option<String>,
    #[serde(default)]
    tags: Option<BTreeMap<String, serde_json::Value>>,
}

/// Every known resource with its current tags
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    resources: BTreeMap<ResourceId, ResourceInfo>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the three snapshot documents; any of them may be omitted.
    pub fn load_snapshot(
        resources: Option<&Path>,
        resource_groups: Option<&Path>,
        subscriptions: Option<&Path>,
    ) -> Result<Self> {
        let mut inventory = Self::new();
        let documents = [
            (resources, RecordKind::Resource),
            (resource_groups, RecordKind::ResourceGroup),
            (subscriptions, RecordKind::Subscription),
        ];
        for (path, kind) in documents {
            let Some(path) = path else { continue };
            let content = std::fs::read_to_string(path)?;
            let count = inventory.ingest(&content, kind, &path.display().to_string())?;
            log::debug!("Loaded {count} {kind} from {}", path.display());
        }
        Ok(inventory)
    }

    /// Query a live source for every subscription.
    ///
    /// Malformed documents become query errors: a live response that cannot
    /// be read is a broken query, not bad user input.
    pub fn load_live<'a, S: StateSource>(
        source: &mut S,
        subscriptions: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self> {
        let mut inventory = Self::new();
        for subscription in subscriptions {
            for kind in RecordKind::ALL {
                let json = source.fetch(subscription, kind)?;
                let origin = format!("{kind} of subscription {subscription}");
                inventory
                    .ingest(&json, kind, &origin)
                    .map_err(|e| Error::Query {
                        message: e.to_string(),
                    })?;
            }
        }
        Ok(inventory)
    }

    /// Add every record of a list document. Accepts a JSON array or a single
    /// object (as printed by `az account show`).
    pub fn ingest(&mut self, json: &str, kind: RecordKind, origin: &str) -> Result<usize> {
        let malformed = |message: String| Error::Snapshot {
            origin: origin.to_string(),
            message,
        };

        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| malformed(e.to_string()))?;
        let items = match value {
            serde_json::Value::Array(items) => items,
            object @ serde_json::Value::Object(_) => vec![object],
            serde_json::Value::Null => Vec::new(),
            other => return Err(malformed(format!("expected a list, found {other}"))),
        };

        let count = items.len();
        for item in items {
            let record: ListRecord =
                serde_json::from_value(item).map_err(|e| malformed(e.to_string()))?;
            let raw_id = record
                .id
                .ok_or_else(|| malformed("record has no \"id\"".to_string()))?;

            let id = match kind {
                RecordKind::Subscription if !raw_id.starts_with('/') => {
                    ResourceId::for_subscription(&raw_id)
                }
                _ => ResourceId::parse(&raw_id),
            }
            .map_err(|e| malformed(e.to_string()))?;

            let resource_type = match kind {
                RecordKind::Subscription => None,
                _ => Some(
                    record
                        .resource_type
                        .ok_or_else(|| malformed(format!("record {raw_id} has no \"type\"")))?,
                ),
            };

            let tags = record
                .tags
                .unwrap_or_default()
                .into_iter()
                .filter(|(name, _)| !is_internal_tag(name))
                .map(|(name, value)| (name, tag_value_string(value)))
                .collect();

            self.insert(ResourceInfo {
                id,
                resource_type,
                tags,
            });
        }
        Ok(count)
    }

    /// Add a resource, merging tags into an existing entry. The first
    /// spelling of an id is kept.
    pub fn insert(&mut self, info: ResourceInfo) {
        match self.resources.get_mut(&info.id) {
            Some(existing) => {
                if info.resource_type.is_some() {
                    existing.resource_type = info.resource_type;
                }
                existing.tags.extend(info.tags);
            }
            None => {
                self.resources.insert(info.id.clone(), info);
            }
        }
    }

    pub fn get(&self, id: &ResourceId) -> Option<&ResourceInfo> {
        self.resources.get(id)
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        self.resources.contains_key(id)
    }

    /// Resources ordered by comparison key; subscriptions group together.
    pub fn iter(&self) -> impl Iterator<Item = &ResourceInfo> {
        self.resources.values()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Number of resources carrying each tag name.
    pub fn tag_counts(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for info in self.resources.values() {
            for tag in info.tags.keys() {
                *counts.entry(tag.as_str()).or_insert(0) += 1;
            }
        }
        counts
    }
}

fn is_internal_tag(name: &str) -> bool {
    INTERNAL_TAG_PREFIXES
        .iter()
        .any(|prefix| name.starts_with(prefix))
}

fn tag_value_string(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SUB: &str = "00000000-0000-0000-0000-000000000001";

    fn resources_json() -> String {
        format!(
            r#"[
  {{"id": "/subscriptions/{SUB}/resourceGroups/Web/providers/Microsoft.Web/sites/portal",
    "type": "Microsoft.Web/sites",
    "tags": {{"service": "portal", "hidden-link": "x", "empty": null}}}},
  {{"id": "/subscriptions/{SUB}/resourceGroups/Web/providers/Microsoft.Web/serverFarms/plan",
    "type": "Microsoft.Web/serverFarms",
    "tags": null}}
]"#
        )
    }

    #[test]
    fn test_ingest_resources() {
        let mut inventory = Inventory::new();
        let count = inventory
            .ingest(&resources_json(), RecordKind::Resource, "resources.json")
            .unwrap();
        assert_eq!(count, 2);

        let site = ResourceId::parse(&format!(
            "/subscriptions/{SUB}/resourceGroups/web/providers/Microsoft.Web/sites/portal"
        ))
        .unwrap();
        let info = inventory.get(&site).unwrap();
        assert_eq!(info.resource_type.as_deref(), Some("Microsoft.Web/sites"));
        assert_eq!(info.tags.get("service").map(String::as_str), Some("portal"));
        assert_eq!(info.tags.get("empty").map(String::as_str), Some(""));
        assert!(!info.tags.contains_key("hidden-link"));
        // Original spelling survives for display.
        assert!(info.id.as_str().contains("/resourceGroups/Web/"));
    }

    #[test]
    fn test_resource_without_tags_is_not_an_error() {
        let mut inventory = Inventory::new();
        inventory
            .ingest(&resources_json(), RecordKind::Resource, "resources.json")
            .unwrap();
        let plan = inventory
            .iter()
            .find(|r| r.id.as_str().ends_with("/plan"))
            .unwrap();
        assert!(plan.tags.is_empty());
    }

    #[test]
    fn test_subscription_object() {
        let mut inventory = Inventory::new();
        let json = format!(r#"{{"id": "{SUB}", "name": "prod", "tags": {{"owner": "ops"}}}}"#);
        inventory
            .ingest(&json, RecordKind::Subscription, "account show")
            .unwrap();
        let sub = ResourceId::for_subscription(SUB).unwrap();
        assert_eq!(inventory.get(&sub).unwrap().resource_type, None);
        assert_eq!(inventory.tag_counts().get("owner"), Some(&1));
    }

    #[test]
    fn test_missing_type_is_malformed() {
        let mut inventory = Inventory::new();
        let json = format!(r#"[{{"id": "/subscriptions/{SUB}/resourceGroups/rg"}}]"#);
        let err = inventory
            .ingest(&json, RecordKind::ResourceGroup, "groups.json")
            .unwrap_err();
        assert!(matches!(err, Error::Snapshot { .. }));
        assert!(inventory.ingest("{not json", RecordKind::Resource, "x").is_err());
    }

    struct FakeSource {
        documents: HashMap<String, String>,
    }

    impl StateSource for FakeSource {
        fn fetch(&mut self, _subscription_id: &str, kind: RecordKind) -> Result<String> {
            self.documents
                .get(&kind.to_string())
                .cloned()
                .ok_or_else(|| Error::Timeout {
                    command: format!("list {kind}"),
                    secs: 300,
                })
        }
    }

    #[test]
    fn test_load_live() {
        let mut source = FakeSource {
            documents: HashMap::from([
                ("resources".to_string(), resources_json()),
                (
                    "resource groups".to_string(),
                    format!(
                        r#"[{{"id": "/subscriptions/{SUB}/resourceGroups/Web", "type": "Microsoft.Resources/resourceGroups", "tags": {{}}}}]"#
                    ),
                ),
                ("subscriptions".to_string(), format!(r#"{{"id": "{SUB}"}}"#)),
            ]),
        };
        let inventory = Inventory::load_live(&mut source, [SUB]).unwrap();
        assert_eq!(inventory.len(), 4);
    }

    #[test]
    fn test_load_live_aborts_on_timeout() {
        let mut source = FakeSource {
            documents: HashMap::from([("resources".to_string(), resources_json())]),
        };
        let err = Inventory::load_live(&mut source, [SUB]).unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
    }

    #[test]
    fn test_load_live_malformed_is_query_error() {
        let mut source = FakeSource {
            documents: HashMap::from([("resources".to_string(), "oops".to_string())]),
        };
        let err = Inventory::load_live(&mut source, [SUB]).unwrap_err();
        assert!(matches!(err, Error::Query { .. }));
    }

    #[test]
    fn test_load_snapshot_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resources.json");
        std::fs::write(&path, resources_json()).unwrap();
        let inventory = Inventory::load_snapshot(Some(&path), None, None).unwrap();
        assert_eq!(inventory.len(), 2);
    }
}
