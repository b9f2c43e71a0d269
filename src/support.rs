//! Tag support table: from a local file, or the published default list.

use anyhow::{Context, Result};
use std::path::Path;
use tagkit::{DEFAULT_SUPPORT_URL, SupportTable};

/// Upper bound for the downloaded CSV.
const MAX_DOWNLOAD_SIZE: u64 = 16 * 1024 * 1024;

/// Load the support table from `path`, or download the default one.
pub fn load(path: Option<&Path>) -> Result<SupportTable> {
    match path {
        Some(path) => {
            log::info!("Parsing tag support file {}", path.display());
            SupportTable::load(path)
                .with_context(|| format!("Failed to load tag support file {}", path.display()))
        }
        None => {
            log::info!("Downloading tag support list from {DEFAULT_SUPPORT_URL}");
            let body = download_text(DEFAULT_SUPPORT_URL)?;
            SupportTable::from_csv(Path::new(DEFAULT_SUPPORT_URL), &body)
                .context("Downloaded tag support list is malformed")
        }
    }
}

fn download_text(url: &str) -> Result<String> {
    let agent = ureq::Agent::new_with_defaults();

    let mut response = agent
        .get(url)
        .header("User-Agent", "tagsync")
        .call()
        .with_context(|| format!("Failed to download {url}"))?;

    response
        .body_mut()
        .with_config()
        .limit(MAX_DOWNLOAD_SIZE)
        .read_to_string()
        .context("Failed to read response body")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tag-support.csv");
        std::fs::write(
            &path,
            "providerName,resourceType,supportsTags\nMicrosoft.Web,sites,true\n",
        )
        .unwrap();
        let table = load(Some(&path)).unwrap();
        assert_eq!(table.lookup("microsoft.web/sites"), Some(true));
    }

    #[test]
    fn test_missing_local_file_has_context() {
        let err = load(Some(Path::new("/nonexistent/tag-support.csv"))).unwrap_err();
        assert!(err.to_string().contains("Failed to load tag support file"));
    }
}
