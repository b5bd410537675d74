//! Site directory over the content root: every top-level directory is a site.
//!
//! Naming conventions: a `!` prefix marks a system site, a `~` prefix a
//! user's personal site. A `.nosearch` file in the site directory means the
//! site has no search tool.

use std::fs;
use std::path::PathBuf;

use sitesearch_indexing::{ContentError, SiteDirectory, SiteInfo};
use tracing::debug;

const NO_SEARCH_MARKER: &str = ".nosearch";

pub struct FsSiteDirectory {
    root: PathBuf,
}

impl FsSiteDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl SiteDirectory for FsSiteDirectory {
    fn sites(&self) -> Result<Vec<SiteInfo>, ContentError> {
        let entries = fs::read_dir(&self.root).map_err(|err| {
            ContentError::Unavailable(format!("{}: {}", self.root.display(), err))
        })?;

        let mut sites = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let id = entry.file_name().to_string_lossy().into_owned();
            if id.starts_with('.') {
                continue;
            }
            sites.push(SiteInfo {
                system: id.starts_with('!'),
                user: id.starts_with('~'),
                has_search_tool: !entry.path().join(NO_SEARCH_MARKER).exists(),
                id,
            });
        }
        sites.sort_by(|a, b| a.id.cmp(&b.id));
        debug!(root = %self.root.display(), count = sites.len(), "Listed sites");
        Ok(sites)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_site_attributes() {
        let dir = TempDir::new().unwrap();
        for name in ["siteB", "siteA", "!admin", "~jdoe", ".cache"] {
            fs::create_dir(dir.path().join(name)).unwrap();
        }
        fs::write(dir.path().join("siteB/.nosearch"), "").unwrap();
        fs::write(dir.path().join("stray.txt"), "not a site").unwrap();

        let sites = FsSiteDirectory::new(dir.path()).sites().unwrap();
        let ids: Vec<&str> = sites.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["!admin", "siteA", "siteB", "~jdoe"]);

        assert!(sites[0].system);
        assert!(!sites[1].system && !sites[1].user && sites[1].has_search_tool);
        assert!(!sites[2].has_search_tool);
        assert!(sites[3].user);
    }

    #[test]
    fn test_missing_root_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let result = FsSiteDirectory::new(dir.path().join("absent")).sites();
        assert!(matches!(result, Err(ContentError::Unavailable(_))));
    }
}
