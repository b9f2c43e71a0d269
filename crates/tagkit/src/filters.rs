//! Tag support table and exclude list.

use crate::error::{Error, Result};
use crate::types::ResourceId;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Published list of resource types and whether they accept tags.
pub const DEFAULT_SUPPORT_URL: &str =
    "https://raw.githubusercontent.com/tfitzmac/resource-capabilities/master/tag-support.csv";

/// Exclude list picked up automatically next to declaration files.
pub const EXCLUDE_FILE_NAME: &str = "excludeids.csv";

const SUPPORT_HEADER: [&str; 3] = ["providerName", "resourceType", "supportsTags"];

/// Which resource types accept tags, keyed by lower-cased `provider/type`
#[derive(Debug, Clone, Default)]
pub struct SupportTable {
    types: HashMap<String, bool>,
}

impl SupportTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the support CSV from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_csv(path, &content)
    }

    /// Parse `providerName,resourceType,supportsTags` rows.
    pub fn from_csv(origin: &Path, content: &str) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(content.as_bytes());

        let headers = reader
            .headers()
            .map_err(|e| Error::format(origin, 1, e.to_string()))?
            .clone();
        if headers.len() < SUPPORT_HEADER.len()
            || SUPPORT_HEADER
                .iter()
                .zip(headers.iter())
                .any(|(want, got)| *want != got.trim())
        {
            return Err(Error::format(
                origin,
                1,
                format!(
                    "unexpected columns in tag support file [{}]",
                    headers.iter().collect::<Vec<_>>().join(", ")
                ),
            ));
        }

        let mut table = Self::new();
        for (idx, result) in reader.records().enumerate() {
            let record = result.map_err(|e| Error::format(origin, idx + 2, e.to_string()))?;
            if record.len() < SUPPORT_HEADER.len() {
                continue;
            }
            let key = format!("{}/{}", &record[0], &record[1]);
            table.insert(&key, record[2].trim().eq_ignore_ascii_case("true"));
        }
        log::debug!("Loaded {} resource type(s) from {}", table.len(), origin.display());
        Ok(table)
    }

    pub fn insert(&mut self, resource_type: &str, supported: bool) {
        self.types.insert(resource_type.to_lowercase(), supported);
    }

    /// `None` when the type is not listed at all.
    pub fn lookup(&self, resource_type: &str) -> Option<bool> {
        self.types.get(&resource_type.to_lowercase()).copied()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Resource ids that must never be touched
#[derive(Debug, Clone, Default)]
pub struct ExcludeSet {
    ids: HashSet<ResourceId>,
}

impl ExcludeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add every id from a single-column `id` CSV file.
    pub fn load(&mut self, path: &Path) -> Result<usize> {
        log::info!("Parsing exclude file {}", path.display());
        let content = std::fs::read_to_string(path)?;
        self.add_csv(path, &content)
    }

    pub fn add_csv(&mut self, origin: &Path, content: &str) -> Result<usize> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(content.as_bytes());

        let headers = reader
            .headers()
            .map_err(|e| Error::format(origin, 1, e.to_string()))?;
        if headers.get(0).map(str::trim) != Some("id") {
            return Err(Error::format(origin, 1, "expected an id column"));
        }

        let mut added = 0;
        for (idx, result) in reader.records().enumerate() {
            let line = idx + 2;
            let record = result.map_err(|e| Error::format(origin, line, e.to_string()))?;
            let raw = record.get(0).unwrap_or_default().trim();
            if raw.is_empty() {
                continue;
            }
            let id =
                ResourceId::parse(raw).map_err(|e| Error::format(origin, line, e.to_string()))?;
            if self.ids.insert(id) {
                added += 1;
            }
        }
        Ok(added)
    }

    pub fn insert(&mut self, id: ResourceId) {
        self.ids.insert(id);
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Exclude list sitting in the same directory as a declaration file.
pub fn sibling_exclude_file(declaration: &Path) -> Option<PathBuf> {
    let dir = match declaration.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let candidate = dir.join(EXCLUDE_FILE_NAME);
    candidate.is_file().then_some(candidate)
}
