//! Saved tag reports.
//!
//! Existing tags are written back out in declaration-file layout so they can
//! be edited and fed to a later run.

use crate::declaration::{ID_COLUMN, TAG_COLUMN_PREFIX, delimiter_for_path};
use crate::diff::ChangeSet;
use crate::error::Result;
use crate::inventory::{Inventory, ResourceInfo};
use crate::types::{ChangeTypes, NO_VALUE};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Which tag columns go into which report file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagSelection {
    /// Every existing tag name, one file
    All,
    /// The given tag names, one file
    Named(Vec<String>),
    /// One file per existing tag name
    PerTag,
}

/// Restricts cells to tags whose computed change type is selected.
#[derive(Debug, Clone, Copy)]
pub struct ChangeFilter<'a> {
    pub changes: &'a ChangeSet,
    pub types: &'a ChangeTypes,
}

/// Write existing tags to report files and return the files written.
///
/// Rows without any cell are left out, and a file with no rows is not
/// created at all.
pub fn save_existing_tags(
    inventory: &Inventory,
    selection: &TagSelection,
    output: &Path,
    delimiter: Option<u8>,
    filter: Option<ChangeFilter<'_>>,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    match selection {
        TagSelection::All => {
            let tags: Vec<&str> = inventory.tag_counts().into_keys().collect();
            if write_table(inventory, &tags, output, delimiter, filter)? {
                written.push(output.to_path_buf());
            }
        }
        TagSelection::Named(names) => {
            let tags: Vec<&str> = names.iter().map(String::as_str).collect();
            if write_table(inventory, &tags, output, delimiter, filter)? {
                written.push(output.to_path_buf());
            }
        }
        TagSelection::PerTag => {
            let mut seen: HashMap<String, usize> = HashMap::new();
            for tag in inventory.tag_counts().into_keys() {
                let uses = seen.entry(tag.to_lowercase()).or_insert(0);
                *uses += 1;
                let path = per_tag_path(output, tag, *uses);
                if write_table(inventory, &[tag], &path, delimiter, filter)? {
                    written.push(path);
                }
            }
        }
    }
    Ok(written)
}

/// `<output>.<tag>.txt`; later tags whose name only differs by case are
/// numbered from 1.
fn per_tag_path(output: &Path, tag: &str, occurrence: usize) -> PathBuf {
    let safe: String = tag
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect();
    let name = if occurrence > 1 {
        format!("{}.{safe}.{}.txt", output.display(), occurrence - 1)
    } else {
        format!("{}.{safe}.txt", output.display())
    };
    PathBuf::from(name)
}

fn write_table(
    inventory: &Inventory,
    tags: &[&str],
    path: &Path,
    delimiter: Option<u8>,
    filter: Option<ChangeFilter<'_>>,
) -> Result<bool> {
    let mut rows = Vec::new();
    for info in inventory.iter() {
        let cells: Vec<&str> = tags
            .iter()
            .map(|tag| match info.tags.get(*tag) {
                Some(value) if selected(filter, info, tag) => cell(value),
                _ => "",
            })
            .collect();
        if cells.iter().any(|c| !c.is_empty()) {
            rows.push((info.id.as_str(), cells));
        }
    }
    if rows.is_empty() {
        log::info!("No existing values for {}; {} not written", tags.join(", "), path.display());
        return Ok(false);
    }

    let delimiter = delimiter
        .or_else(|| delimiter_for_path(path))
        .unwrap_or(b'|');
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_path(path)?;

    let mut header = vec![ID_COLUMN.to_string()];
    header.extend(tags.iter().map(|tag| format!("{TAG_COLUMN_PREFIX}{tag}")));
    writer.write_record(&header)?;
    for (id, cells) in &rows {
        writer.write_record(std::iter::once(*id).chain(cells.iter().copied()))?;
    }
    writer.flush()?;

    log::info!("Wrote {} row(s) to {}", rows.len(), path.display());
    Ok(true)
}

fn cell(value: &str) -> &str {
    if value.is_empty() {
        NO_VALUE
    } else {
        value
    }
}

/// Tags with no record are always written; recorded tags only when their
/// change type is selected.
fn selected(
    filter: Option<ChangeFilter<'_>>,
    info: &ResourceInfo,
    tag: &str,
) -> bool {
    let Some(filter) = filter else {
        return true;
    };
    filter
        .changes
        .get(&info.id)
        .and_then(|changes| changes.record(tag))
        .is_none_or(|record| filter.types.contains(record.change))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::{ChangeRecord, ResourceChanges};
    use crate::types::{ChangeType, ResourceId};
    use std::collections::BTreeMap;

    const SUB: &str = "00000000-0000-0000-0000-000000000001";

    fn rid(suffix: &str) -> ResourceId {
        ResourceId::parse(&format!("/subscriptions/{SUB}{suffix}")).unwrap()
    }

    fn inventory() -> Inventory {
        let mut inventory = Inventory::new();
        inventory.insert(ResourceInfo {
            id: rid("/resourceGroups/web"),
            resource_type: Some("Microsoft.Resources/resourceGroups".into()),
            tags: BTreeMap::from([
                ("Env".to_string(), "prod".to_string()),
                ("env".to_string(), String::new()),
            ]),
        });
        inventory.insert(ResourceInfo {
            id: rid("/resourceGroups/db"),
            resource_type: Some("Microsoft.Resources/resourceGroups".into()),
            tags: BTreeMap::from([("owner".to_string(), "dba".to_string())]),
        });
        inventory
    }

    #[test]
    fn test_save_all_tags_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("existing.txt");
        let written =
            save_existing_tags(&inventory(), &TagSelection::All, &out, None, None).unwrap();
        assert_eq!(written, vec![out.clone()]);

        let text = std::fs::read_to_string(&out).unwrap();
        assert_eq!(
            text,
            format!(
                "id|tags.Env|tags.env|tags.owner\n\
                 /subscriptions/{SUB}/resourceGroups/db|||dba\n\
                 /subscriptions/{SUB}/resourceGroups/web|prod|:novalue:|\n"
            )
        );
    }

    #[test]
    fn test_named_tag_with_no_rows_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("none.txt");
        let selection = TagSelection::Named(vec!["missing".into()]);
        let written = save_existing_tags(&inventory(), &selection, &out, None, None).unwrap();
        assert!(written.is_empty());
        assert!(!out.exists());
    }

    #[test]
    fn test_per_tag_files_with_case_collisions() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("tags");
        let written =
            save_existing_tags(&inventory(), &TagSelection::PerTag, &out, None, None).unwrap();
        let names: Vec<String> = written
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["tags.Env.txt", "tags.env.1.txt", "tags.owner.txt"]);
    }

    #[test]
    fn test_per_tag_path_numbering() {
        let out = Path::new("saved");
        assert_eq!(per_tag_path(out, "env", 1), PathBuf::from("saved.env.txt"));
        assert_eq!(per_tag_path(out, "ENV", 2), PathBuf::from("saved.ENV.1.txt"));
        assert_eq!(per_tag_path(out, "Env", 3), PathBuf::from("saved.Env.2.txt"));
    }

    #[test]
    fn test_change_filter_drops_unselected_records() {
        let mut changes = ChangeSet::new();
        changes.insert(ResourceChanges {
            id: rid("/resourceGroups/db"),
            resource_type: None,
            records: vec![ChangeRecord {
                tag: "owner".into(),
                existing: Some("dba".into()),
                desired: None,
                change: ChangeType::Del,
                source_depth: None,
            }],
        });
        let types = ChangeTypes::incremental();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("owner.txt");
        let written = save_existing_tags(
            &inventory(),
            &TagSelection::Named(vec!["owner".into()]),
            &out,
            None,
            Some(ChangeFilter {
                changes: &changes,
                types: &types,
            }),
        )
        .unwrap();
        assert!(written.is_empty());
    }
}
