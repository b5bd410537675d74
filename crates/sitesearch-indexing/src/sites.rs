//! Site directory and the policy deciding which sites are indexable.

use sitesearch_types::SearchSettings;
use tracing::debug;

use crate::error::ContentError;

/// One site as reported by the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteInfo {
    pub id: String,
    /// Reserved/system site; never indexed
    pub system: bool,
    /// Personal site of one user
    pub user: bool,
    pub has_search_tool: bool,
}

impl SiteInfo {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            system: false,
            user: false,
            has_search_tool: true,
        }
    }
}

/// Lists every site in the repository.
pub trait SiteDirectory: Send + Sync {
    fn sites(&self) -> Result<Vec<SiteInfo>, ContentError>;
}

/// Filters for whole-collection rebuilds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SitePolicy {
    pub exclude_user_sites: bool,
    pub require_search_tool: bool,
}

impl Default for SitePolicy {
    fn default() -> Self {
        Self::from(&SearchSettings::default())
    }
}

impl From<&SearchSettings> for SitePolicy {
    fn from(settings: &SearchSettings) -> Self {
        Self {
            exclude_user_sites: settings.exclude_user_sites,
            require_search_tool: settings.require_search_tool,
        }
    }
}

impl SitePolicy {
    pub fn is_indexable(&self, site: &SiteInfo) -> bool {
        !site.system
            && !(self.exclude_user_sites && site.user)
            && !(self.require_search_tool && !site.has_search_tool)
    }

    /// Ids of the directory's indexable sites, in directory order.
    pub fn indexable_sites(&self, directory: &dyn SiteDirectory) -> Result<Vec<String>, ContentError> {
        let sites = directory.sites()?;
        let total = sites.len();
        let ids: Vec<String> = sites
            .into_iter()
            .filter(|site| self.is_indexable(site))
            .map(|site| site.id)
            .collect();
        debug!(total, indexable = ids.len(), "Selected indexable sites");
        Ok(ids)
    }
}
