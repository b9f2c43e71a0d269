//! Parser for tag declaration files.
//!
//! A declaration file is a delimited table with an `id` column and one
//! `tags.<name>` column per tag:
//!
//! ```text
//! id|tags.service|tags.environment_name
//! /subscriptions/<sub>/resourceGroups/web|portal|prod
//! /subscriptions/<sub>/resourceGroups/db||:novalue:
//! ```
//!
//! A blank cell declares nothing for that tag; `:novalue:` declares an empty
//! value. Files whose name starts with `inherit` propagate their values to
//! every resource underneath each declared id.

use crate::error::{Error, Result};
use crate::types::{ResourceId, TagValue};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

/// Header of the id column.
pub const ID_COLUMN: &str = "id";
/// Prefix of tag column headers.
pub const TAG_COLUMN_PREFIX: &str = "tags.";
/// File name prefix that marks a declaration file as inheriting.
pub const INHERIT_PREFIX: &str = "inherit";

/// One declared (resource, tag) value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagEntry {
    pub id: ResourceId,
    pub tag: String,
    pub value: TagValue,
    /// Whether the value propagates to descendants
    pub inherits: bool,
    /// Index of the file it came from, in load order
    pub source: usize,
    /// Line in that file
    pub line: usize,
}

/// Metadata for a parsed declaration file
#[derive(Debug, Clone)]
pub struct DeclarationFile {
    pub path: PathBuf,
    pub inherits: bool,
    pub delimiter: u8,
    /// Number of data rows
    pub rows: usize,
    /// Tag names from the header, in column order
    pub tags: Vec<String>,
}

/// All declarations of a run, in load order.
///
/// Later files win over earlier ones for the same (id, tag); the resolver
/// relies on [`Declarations::entries`] preserving load order.
#[derive(Debug, Clone, Default)]
pub struct Declarations {
    files: Vec<DeclarationFile>,
    entries: Vec<TagEntry>,
}

impl Declarations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a list of files in order.
    pub fn load<P: AsRef<Path>>(paths: &[P], delimiter: Option<u8>) -> Result<Self> {
        let mut declarations = Self::new();
        for path in paths {
            declarations.add_file(path.as_ref(), delimiter)?;
        }
        Ok(declarations)
    }

    /// Parse one file and append its entries.
    pub fn add_file(&mut self, path: &Path, delimiter: Option<u8>) -> Result<()> {
        let content = std::fs::read_to_string(path)?;
        self.add_str(path, &content, delimiter)
    }

    /// Parse declaration text; `path` decides inheritance and the default
    /// delimiter exactly as it would for a file.
    pub fn add_str(&mut self, path: &Path, content: &str, delimiter: Option<u8>) -> Result<()> {
        let source = self.files.len();
        let (file, entries) = parse(path, content, delimiter, source)?;
        log::info!(
            "Parsed {}; inherit={}; {} id(s); {} tag type(s)",
            path.display(),
            file.inherits,
            file.rows,
            file.tags.len()
        );
        self.files.push(file);
        self.entries.extend(entries);
        Ok(())
    }

    pub fn entries(&self) -> &[TagEntry] {
        &self.entries
    }

    pub fn files(&self) -> &[DeclarationFile] {
        &self.files
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every tag name declared anywhere.
    pub fn tag_names(&self) -> BTreeSet<&str> {
        self.entries.iter().map(|e| e.tag.as_str()).collect()
    }

    /// Every declared id, deduplicated.
    pub fn ids(&self) -> BTreeSet<&ResourceId> {
        self.entries.iter().map(|e| &e.id).collect()
    }

    /// Subscriptions referenced by any declaration.
    pub fn subscriptions(&self) -> BTreeSet<&str> {
        self.entries.iter().map(|e| e.id.subscription_id()).collect()
    }
}

/// Whether a file's name marks it as inheriting.
pub fn is_inheriting(path: &Path) -> bool {
    path.file_name()
        .map(|name| {
            name.to_string_lossy()
                .to_lowercase()
                .starts_with(INHERIT_PREFIX)
        })
        .unwrap_or(false)
}

/// Delimiter implied by a file extension.
pub fn delimiter_for_path(path: &Path) -> Option<u8> {
    match path.extension()?.to_str()?.to_lowercase().as_str() {
        "txt" => Some(b'|'),
        "tsv" => Some(b'\t'),
        "csv" => Some(b','),
        _ => None,
    }
}

/// Pick a delimiter: extension first, then whatever the header contains.
pub fn detect_delimiter(path: &Path, header: &str) -> u8 {
    delimiter_for_path(path)
        .or_else(|| {
            [b'|', b'\t', b',']
                .into_iter()
                .find(|d| header.as_bytes().contains(d))
        })
        .unwrap_or(b'|')
}

fn parse(
    path: &Path,
    content: &str,
    delimiter: Option<u8>,
    source: usize,
) -> Result<(DeclarationFile, Vec<TagEntry>)> {
    let header_line = content.lines().next().unwrap_or_default();
    let delimiter = delimiter.unwrap_or_else(|| detect_delimiter(path, header_line));
    let inherits = is_inheriting(path);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| Error::format(path, 1, e.to_string()))?
        .clone();

    let id_column = headers
        .iter()
        .position(|h| h.trim() == ID_COLUMN)
        .ok_or_else(|| {
            Error::format(
                path,
                1,
                format!(
                    "could not find {ID_COLUMN} in header [{}]",
                    headers.iter().collect::<Vec<_>>().join(", ")
                ),
            )
        })?;

    let tag_columns: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter_map(|(idx, h)| {
            h.trim()
                .strip_prefix(TAG_COLUMN_PREFIX)
                .filter(|name| !name.is_empty())
                .map(|name| (idx, name.to_string()))
        })
        .collect();

    let mut entries = Vec::new();
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut rows = 0;

    for (idx, result) in reader.records().enumerate() {
        let record = result.map_err(|e| {
            let line = e.position().map_or(idx + 2, |p| p.line() as usize);
            Error::format(path, line, e.to_string())
        })?;
        let line = record.position().map_or(idx + 2, |p| p.line() as usize);

        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }

        if record.len() != headers.len() {
            return Err(Error::format(
                path,
                line,
                format!(
                    "expected {} fields, found {} (wrong delimiter?)",
                    headers.len(),
                    record.len()
                ),
            ));
        }

        let raw_id = record.get(id_column).unwrap_or_default().trim();
        if raw_id.is_empty() {
            return Err(Error::format(path, line, "missing id"));
        }
        let id = ResourceId::parse(raw_id).map_err(|e| Error::format(path, line, e.to_string()))?;
        rows += 1;

        for (column, tag) in &tag_columns {
            let cell = record.get(*column).unwrap_or_default();
            let Some(value) = TagValue::from_cell(cell) else {
                continue;
            };
            if !seen.insert((id.key().to_string(), tag.clone())) {
                return Err(Error::format(
                    path,
                    line,
                    format!("tags.{tag} for {id} declared more than once"),
                ));
            }
            entries.push(TagEntry {
                id: id.clone(),
                tag: tag.clone(),
                value,
                inherits,
                source,
                line,
            });
        }
    }

    let file = DeclarationFile {
        path: path.to_path_buf(),
        inherits,
        delimiter,
        rows,
        tags: tag_columns.into_iter().map(|(_, name)| name).collect(),
    };
    Ok((file, entries))
}
