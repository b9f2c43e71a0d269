//! Azure CLI adapter: live inventory queries and tag updates through `az`.

use crate::runner::{self, Finished};
use std::time::Duration;
use tagkit::{Error, RecordKind, Result, StateSource, TagBackend, TagUpdate, UpdateMode};

/// Fixed per-call timeout for `az`.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Ids deeper than this are updated with `az tag update`.
const TAG_UPDATE_MIN_DEPTH: usize = 6;

/// Runs `az` commands with a fixed timeout
pub struct AzCli {
    program: String,
    timeout: Duration,
}

impl AzCli {
    pub fn new(timeout: Duration) -> Self {
        Self {
            program: "az".to_string(),
            timeout,
        }
    }

    /// Run a query; anything but clean success is a query error.
    fn query(&self, args: &[String]) -> Result<String> {
        match self.run(args)? {
            Ok(stdout) => Ok(stdout),
            Err(stderr) => Err(Error::Query {
                message: format!("{}: {}", self.command_line(args), stderr.trim()),
            }),
        }
    }

    /// Outer error: fatal (spawn failure, timeout). Inner error: stderr of a
    /// command that exited unsuccessfully.
    fn run(&self, args: &[String]) -> Result<std::result::Result<String, String>> {
        let finished =
            runner::run_bounded(&self.program, args, self.timeout).map_err(|e| Error::Query {
                message: format!("failed to execute {}: {e}", self.program),
            })?;
        match finished {
            Finished::TimedOut => Err(Error::Timeout {
                command: self.command_line(args),
                secs: self.timeout.as_secs(),
            }),
            Finished::Completed(output) if output.success() => Ok(Ok(output.stdout)),
            Finished::Completed(output) => Ok(Err(output.stderr)),
        }
    }

    fn command_line(&self, args: &[String]) -> String {
        std::iter::once(self.program.as_str())
            .chain(args.iter().map(String::as_str))
            .map(quote)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Default for AzCli {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl StateSource for AzCli {
    fn fetch(&mut self, subscription_id: &str, kind: RecordKind) -> Result<String> {
        log::info!("Retrieving azure {kind} for subscription {subscription_id}");
        self.query(&query_args(subscription_id, kind))
    }
}

impl TagBackend for AzCli {
    fn describe(&self, update: &TagUpdate) -> String {
        self.command_line(&update_args(update))
    }

    fn update(&mut self, update: &TagUpdate) -> Result<()> {
        match self.run(&update_args(update))? {
            Ok(_) => Ok(()),
            Err(stderr) => Err(Error::Update {
                resource: update.id.to_string(),
                message: stderr.trim().to_string(),
            }),
        }
    }
}

fn query_args(subscription_id: &str, kind: RecordKind) -> Vec<String> {
    let command: &[&str] = match kind {
        RecordKind::Resource => &["resource", "list"],
        RecordKind::ResourceGroup => &["group", "list"],
        RecordKind::Subscription => &["account", "show"],
    };
    command
        .iter()
        .copied()
        .chain(["--subscription", subscription_id, "--output", "json"])
        .map(str::to_string)
        .collect()
}

/// Arguments for one tag update.
///
/// Resources below a resource group go through `az tag update`, which
/// handles nested resource ids; resource groups through `az resource tag`.
pub fn update_args(update: &TagUpdate) -> Vec<String> {
    let id = &update.id;
    let tags: Vec<String> = update
        .tags
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect();

    let mut args: Vec<String> = Vec::new();
    if id.depth() >= TAG_UPDATE_MIN_DEPTH {
        if tags.is_empty() && update.mode == UpdateMode::Replace {
            args.extend(["tag", "delete", "--yes", "--resource-id"].map(String::from));
            args.push(id.to_string());
        } else {
            args.extend(["tag", "update", "--resource-id"].map(String::from));
            args.push(id.to_string());
            args.push("--operation".to_string());
            args.push(update.mode.to_string());
            args.push("--tags".to_string());
            args.extend(tags);
        }
    } else {
        args.extend(["resource", "tag", "--ids"].map(String::from));
        args.push(id.to_string());
        if update.mode == UpdateMode::Merge {
            args.push("--is-incremental".to_string());
        }
        args.push("--tags".to_string());
        if tags.is_empty() {
            args.push(String::new());
        } else {
            args.extend(tags);
        }
    }
    args.push("--subscription".to_string());
    args.push(id.subscription_id().to_string());
    args.push("--output".to_string());
    args.push("none".to_string());
    args
}

/// Single-quote an argument for display when the shell would split it.
fn quote(arg: &str) -> String {
    if !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@,+".contains(c))
    {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}
