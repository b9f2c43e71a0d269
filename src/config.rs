use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tagkit::{ChangeTypes, RunOptions, ScopeBounds};

use crate::cli::InputArgs;

/// Default number of failed resources tolerated by `apply`.
pub const DEFAULT_MAX_ERRORS: usize = 10;

// ============================================================================
// Config file
// ============================================================================

/// Defaults read from `--config <file>.toml`; flags override every key.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub change_types: Option<String>,
    pub min_scope: Option<usize>,
    pub max_scope: Option<usize>,
    pub max_errors: Option<usize>,
    pub tag_support: Option<PathBuf>,
    pub exclude_ids: Vec<PathBuf>,
    pub skip_tags: Vec<String>,
    pub limit: Vec<String>,
    pub timeout_secs: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Load the file if one was given, otherwise use defaults.
    pub fn load_optional(path: Option<&Path>) -> Result<Self> {
        path.map_or_else(|| Ok(Self::default()), Self::load)
    }
}

// ============================================================================
// Effective settings
// ============================================================================

/// Run parameters after merging flags over the config file
#[derive(Debug, Clone)]
pub struct Settings {
    pub run: RunOptions,
    pub tag_support: Option<PathBuf>,
    pub exclude_ids: Vec<PathBuf>,
    pub timeout: Duration,
    pub max_errors: usize,
}

impl Settings {
    /// Merge flags over file values. Contradictory scope bounds and bad
    /// change types or filters fail here, before any input is read.
    pub fn resolve(
        input: &InputArgs,
        max_errors: Option<usize>,
        file: &FileConfig,
        verbose: u8,
    ) -> Result<Self> {
        let change_types = match input.change_types.as_ref().or(file.change_types.as_ref()) {
            Some(spec) => spec.parse::<ChangeTypes>()?,
            None => ChangeTypes::default(),
        };
        let scope = ScopeBounds::new(
            input.min_scope.or(file.min_scope),
            input.max_scope.or(file.max_scope),
        )?;
        let limit = prefer(&input.limit, &file.limit);

        let run = RunOptions {
            change_types,
            scope,
            skip_tags: prefer(&input.skip_tags, &file.skip_tags).to_vec(),
            verbose,
            ..Default::default()
        }
        .with_id_filters(limit)?;

        let mut exclude_ids = file.exclude_ids.clone();
        exclude_ids.extend(input.exclude_ids.iter().cloned());

        Ok(Self {
            run,
            tag_support: input.tag_support.clone().or_else(|| file.tag_support.clone()),
            exclude_ids,
            timeout: file
                .timeout_secs
                .map_or(crate::az::DEFAULT_TIMEOUT, Duration::from_secs),
            max_errors: max_errors.or(file.max_errors).unwrap_or(DEFAULT_MAX_ERRORS),
        })
    }
}

/// Flag values when any were given, otherwise the file's.
fn prefer<'a, T>(flags: &'a [T], file: &'a [T]) -> &'a [T] {
    if flags.is_empty() { file } else { flags }
}
