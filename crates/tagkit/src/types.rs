//! Core types for tag reconciliation

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::time::Duration;

/// Cell value meaning "set this tag to an empty value".
pub const NO_VALUE: &str = ":novalue:";

const SUBSCRIPTIONS_PREFIX: &str = "/subscriptions/";
const SUBSCRIPTION_ID_LEN: usize = 36;
const RESOURCE_GROUP_SEGMENT: usize = 4;

/// Depth of a subscription id (`/subscriptions/<id>`).
pub const SUBSCRIPTION_DEPTH: usize = 2;
/// Depth of a resource group id (`/subscriptions/<id>/resourceGroups/<name>`).
pub const RESOURCE_GROUP_DEPTH: usize = 4;

// ============================================================================
// Resource ids
// ============================================================================

/// Hierarchical resource id.
///
/// Comparison uses a key in which the resource-group name is lower-cased,
/// because the platform treats resource-group names case-insensitively. The
/// original spelling is kept for display and for update calls.
#[derive(Debug, Clone)]
pub struct ResourceId {
    raw: String,
    key: String,
}

/// Level of a resource id in the subscription hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Subscription,
    ResourceGroup,
    Resource,
}

impl ResourceId {
    /// Parse and validate a subscription-rooted id.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let rest = raw
            .strip_prefix(SUBSCRIPTIONS_PREFIX)
            .ok_or_else(|| Error::InvalidId {
                id: raw.to_string(),
                reason: "should start with /subscriptions/".to_string(),
            })?;

        let subscription = rest.split('/').next().unwrap_or_default();
        if subscription.len() != SUBSCRIPTION_ID_LEN {
            return Err(Error::InvalidId {
                id: raw.to_string(),
                reason: "invalid subscription id".to_string(),
            });
        }

        Ok(Self {
            key: fold_case(raw),
            raw: raw.to_string(),
        })
    }

    /// Id of a subscription given its bare GUID.
    pub fn for_subscription(subscription_id: &str) -> Result<Self> {
        Self::parse(&format!("{SUBSCRIPTIONS_PREFIX}{subscription_id}"))
    }

    /// Original spelling.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Comparison key (resource-group segment lower-cased).
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Number of `/` separators; 2 for a subscription, 4 for a resource group.
    pub fn depth(&self) -> usize {
        self.raw.matches('/').count()
    }

    pub fn level(&self) -> Level {
        match self.depth() {
            SUBSCRIPTION_DEPTH => Level::Subscription,
            RESOURCE_GROUP_DEPTH => Level::ResourceGroup,
            _ => Level::Resource,
        }
    }

    /// Bare subscription GUID.
    pub fn subscription_id(&self) -> &str {
        let start = SUBSCRIPTIONS_PREFIX.len();
        &self.raw[start..start + SUBSCRIPTION_ID_LEN]
    }

    /// The id with its `/subscriptions/<id>` prefix removed.
    pub fn display_suffix(&self) -> &str {
        &self.raw[SUBSCRIPTIONS_PREFIX.len() + SUBSCRIPTION_ID_LEN..]
    }

    /// Keys of every ancestor path, most specific first.
    pub fn ancestor_keys(&self) -> impl Iterator<Item = &str> {
        self.key
            .char_indices()
            .rev()
            .filter(|&(idx, c)| c == '/' && idx > 0)
            .map(|(idx, _)| &self.key[..idx])
    }
}

/// Lower-case the resource-group segment of an id.
fn fold_case(raw: &str) -> String {
    let mut segments: Vec<String> = raw.split('/').map(str::to_string).collect();
    if let Some(segment) = segments.get_mut(RESOURCE_GROUP_SEGMENT) {
        *segment = segment.to_lowercase();
    }
    segments.join("/")
}

/// Display label for the hierarchy depth a tag was declared at.
pub fn scope_label(depth: usize) -> String {
    match depth {
        SUBSCRIPTION_DEPTH => "sub".to_string(),
        RESOURCE_GROUP_DEPTH => "rg".to_string(),
        other => other.to_string(),
    }
}

impl PartialEq for ResourceId {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for ResourceId {}

impl Hash for ResourceId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl PartialOrd for ResourceId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ResourceId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

// ============================================================================
// Tag values
// ============================================================================

/// A declared tag value.
///
/// `Blank` is the explicit empty value written as `:novalue:`; an absent
/// declaration is represented by not having a `TagValue` at all.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TagValue {
    Value(String),
    Blank,
}

impl TagValue {
    /// Interpret a declaration cell. An empty cell declares nothing.
    pub fn from_cell(cell: &str) -> Option<Self> {
        match cell {
            "" => None,
            NO_VALUE => Some(Self::Blank),
            value => Some(Self::Value(value.to_string())),
        }
    }

    /// Wrap a value read from the live system.
    pub fn from_existing(value: &str) -> Self {
        if value.is_empty() {
            Self::Blank
        } else {
            Self::Value(value.to_string())
        }
    }

    /// The value the platform should hold.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Value(v) => v,
            Self::Blank => "",
        }
    }

    /// The value as written into a declaration or report file.
    pub fn to_cell(&self) -> &str {
        match self {
            Self::Value(v) => v,
            Self::Blank => NO_VALUE,
        }
    }
}

// ============================================================================
// Change types
// ============================================================================

/// Classification of a single (resource, tag) comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChangeType {
    /// Tag absent, now desired
    Add,
    /// Tag present with a different value
    Update,
    /// Tag present with the desired value
    Keep,
    /// Tag present, nothing declared (or change not selected); preserved
    Leave,
    /// Tag present, nothing declared, full mode: removed
    Del,
    /// Tag name differs only by case from a declared tag
    Swap,
}

impl ChangeType {
    /// Every change type in display order.
    pub const ALL: [ChangeType; 6] = [
        ChangeType::Add,
        ChangeType::Update,
        ChangeType::Keep,
        ChangeType::Leave,
        ChangeType::Del,
        ChangeType::Swap,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Add => "ADD",
            Self::Update => "UPDATE",
            Self::Keep => "KEEP",
            Self::Leave => "LEAVE",
            Self::Del => "DEL",
            Self::Swap => "SWAP",
        }
    }

    /// Whether this change requires a call to the live system.
    pub fn is_actionable(&self) -> bool {
        matches!(self, Self::Add | Self::Update | Self::Del | Self::Swap)
    }

    /// Position in [`ChangeType::ALL`], used for counting arrays.
    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ChangeType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let upper = s.trim().to_uppercase();
        if upper == "NO_UPDATE" {
            return Ok(Self::Keep);
        }
        Self::ALL
            .into_iter()
            .find(|t| t.label() == upper)
            .ok_or_else(|| Error::Invocation(format!("unknown change type {s}")))
    }
}

/// The set of change types a run is allowed to carry out.
///
/// A computed change whose type is not selected is downgraded to
/// [`ChangeType::Leave`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeTypes {
    selected: BTreeSet<ChangeType>,
}

impl ChangeTypes {
    /// Add and update only; undeclared tags are left alone.
    pub fn incremental() -> Self {
        Self::from_iter([
            ChangeType::Add,
            ChangeType::Update,
            ChangeType::Keep,
            ChangeType::Leave,
            ChangeType::Swap,
        ])
    }

    /// Full reconciliation; undeclared tags are deleted.
    pub fn all() -> Self {
        Self::from_iter([
            ChangeType::Add,
            ChangeType::Update,
            ChangeType::Keep,
            ChangeType::Del,
            ChangeType::Swap,
        ])
    }

    pub fn contains(&self, change: ChangeType) -> bool {
        self.selected.contains(&change)
    }

    /// Full mode replaces whole tag sets so undeclared tags disappear.
    pub fn is_full(&self) -> bool {
        self.contains(ChangeType::Del)
    }
}

impl Default for ChangeTypes {
    fn default() -> Self {
        Self::incremental()
    }
}

impl FromIterator<ChangeType> for ChangeTypes {
    fn from_iter<I: IntoIterator<Item = ChangeType>>(iter: I) -> Self {
        Self {
            selected: iter.into_iter().collect(),
        }
    }
}

impl FromStr for ChangeTypes {
    type Err = Error;

    /// Parse `inc`, `all`, or a comma separated list such as `ADD,UPDATE`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::Invocation(
                "at least one change type must be specified".to_string(),
            ));
        }
        match s.to_lowercase().as_str() {
            "inc" => return Ok(Self::incremental()),
            "all" => return Ok(Self::all()),
            _ => {}
        }

        let mut selected = BTreeSet::new();
        for part in s.split(',').filter(|p| !p.trim().is_empty()) {
            let change: ChangeType = part.parse()?;
            if !selected.insert(change) {
                return Err(Error::Invocation(format!("duplicate type {}", part.trim())));
            }
        }
        if selected.is_empty() {
            return Err(Error::Invocation("no change types defined".to_string()));
        }
        Ok(Self { selected })
    }
}

// ============================================================================
// Run options
// ============================================================================

/// Inclusive window of id depths that may be changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScopeBounds {
    pub min: Option<usize>,
    pub max: Option<usize>,
}

impl ScopeBounds {
    /// Create bounds, rejecting a window that admits nothing.
    pub fn new(min: Option<usize>, max: Option<usize>) -> Result<Self> {
        if let (Some(lo), Some(hi)) = (min, max)
            && lo > hi
        {
            return Err(Error::Invocation(format!(
                "minimum scope {lo} is greater than maximum scope {hi}"
            )));
        }
        Ok(Self { min, max })
    }

    pub fn below_min(&self, depth: usize) -> bool {
        self.min.is_some_and(|min| depth < min)
    }

    pub fn above_max(&self, depth: usize) -> bool {
        self.max.is_some_and(|max| depth > max)
    }
}

/// Parameters of a single reconciliation run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Change types the run may carry out
    pub change_types: ChangeTypes,
    /// Depth window for changes
    pub scope: ScopeBounds,
    /// Every regex must match a resource key for it to be changed
    pub id_filters: Vec<Regex>,
    /// Resources carrying any of these tags are skipped
    pub skip_tags: Vec<String>,
    /// Verbosity level for reports
    pub verbose: u8,
}

impl RunOptions {
    /// Compile `--limit` style patterns into id filters.
    pub fn with_id_filters<S: AsRef<str>>(mut self, patterns: &[S]) -> Result<Self> {
        self.id_filters = patterns
            .iter()
            .map(|p| {
                Regex::new(p.as_ref())
                    .map_err(|e| Error::Invocation(format!("bad id filter {}: {e}", p.as_ref())))
            })
            .collect::<Result<_>>()?;
        Ok(self)
    }
}

/// Options for the applier
#[derive(Debug, Clone)]
pub struct ApplyOptions {
    /// Describe updates instead of running them
    pub dry_run: bool,
    /// Abort once more than this many resource updates have failed
    pub max_failures: usize,
    /// Replace whole tag sets instead of merging
    pub full: bool,
    /// Pause between the two phases of a tag-name case swap
    pub swap_settle: Duration,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            max_failures: 10,
            full: false,
            swap_settle: Duration::from_secs(10),
        }
    }
}
