//! Content source over a directory tree.
//!
//! Layout: `<root>/<site>/<path>` is published as reference
//! `/content/<site>/<path>`. A sidecar `<file>.props.json` holding a JSON
//! object supplies custom properties for `<file>`. Hidden entries and
//! sidecars are never indexed. Files without the world-read bit are
//! restricted: only elevated contexts may read them.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};

use serde_json::Value;
use sitesearch_indexing::{
    ContentError, ContentMetadata, ContentSource, DocumentContent, SiteReferences, TaskContext,
};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// Reference prefix served by [`FsContentSource`].
pub const CONTENT_PREFIX: &str = "/content/";

const PROPS_SUFFIX: &str = ".props.json";

pub struct FsContentSource {
    root: PathBuf,
}

impl FsContentSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Reference for a file below the root, if it lies inside a site.
    pub fn reference_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        reference_from_relative(relative)
    }

    /// Split a reference into site id and path below the site.
    fn parse<'r>(&self, reference: &'r str) -> Option<(&'r str, &'r str)> {
        let rest = reference.strip_prefix(CONTENT_PREFIX)?;
        let (site, path) = rest.split_once('/')?;
        if site.is_empty() || path.is_empty() {
            return None;
        }
        // No escaping the site directory
        let safe = Path::new(path)
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        safe.then_some((site, path))
    }

    fn resolve(&self, reference: &str) -> Result<(String, PathBuf), ContentError> {
        let (site, path) = self
            .parse(reference)
            .ok_or_else(|| ContentError::NotFound(reference.to_string()))?;
        Ok((site.to_string(), self.root.join(site).join(path)))
    }

    fn custom_properties(&self, path: &Path) -> Result<BTreeMap<String, Value>, ContentError> {
        let sidecar = sidecar_path(path);
        let raw = match fs::read_to_string(&sidecar) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(err) => return Err(err.into()),
        };
        serde_json::from_str(&raw)
            .map_err(|e| ContentError::Invalid(format!("{}: {}", sidecar.display(), e)))
    }
}

impl ContentSource for FsContentSource {
    fn name(&self) -> &str {
        "filesystem"
    }

    fn matches(&self, reference: &str) -> bool {
        self.parse(reference).is_some()
    }

    fn is_for_index(&self, reference: &str) -> bool {
        let Some((site, path)) = self.parse(reference) else {
            return false;
        };
        if site.starts_with(['!', '.']) || path.ends_with(PROPS_SUFFIX) {
            return false;
        }
        if path.split('/').any(|part| part.starts_with('.')) {
            return false;
        }
        self.root.join(site).join(path).is_file()
    }

    fn can_read(&self, reference: &str, ctx: &TaskContext) -> bool {
        let Ok((_, path)) = self.resolve(reference) else {
            return false;
        };
        if File::open(&path).is_err() {
            return false;
        }
        ctx.is_elevated() || !is_restricted(&path)
    }

    fn metadata(&self, reference: &str) -> Result<ContentMetadata, ContentError> {
        let (site_id, path) = self.resolve(reference)?;
        if !path.is_file() {
            return Err(ContentError::NotFound(reference.to_string()));
        }

        let title = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let container = reference
            .rsplit_once('/')
            .map(|(parent, _)| parent.to_string())
            .unwrap_or_default();

        Ok(ContentMetadata {
            container,
            doc_type: content_type(&path).to_string(),
            title,
            tool: "content".to_string(),
            url: format!("/access{}", reference),
            site_id,
            custom_properties: self.custom_properties(&path)?,
        })
    }

    fn content(&self, reference: &str) -> Result<DocumentContent, ContentError> {
        let (_, path) = self.resolve(reference)?;
        let file = File::open(&path).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => ContentError::NotFound(reference.to_string()),
            io::ErrorKind::PermissionDenied => ContentError::Unreadable(reference.to_string()),
            _ => ContentError::Io(err),
        })?;

        let content_type = content_type(&path);
        if is_text(content_type) {
            Ok(DocumentContent::Reader(Box::new(file)))
        } else {
            Ok(DocumentContent::Binary {
                stream: Box::new(file),
                content_type: content_type.to_string(),
            })
        }
    }

    fn site_references(&self, site_id: &str) -> Result<SiteReferences<'_>, ContentError> {
        let site_dir = self.root.join(site_id);
        if !site_dir.is_dir() {
            return Err(ContentError::NotFound(format!("site {}", site_id)));
        }
        debug!(site_id, path = %site_dir.display(), "Walking site");

        let root = self.root.clone();
        let walker = WalkDir::new(site_dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry));

        let references = walker.filter_map(move |entry| match entry {
            Ok(entry) => {
                if !entry.file_type().is_file() || is_sidecar(&entry) {
                    return None;
                }
                let relative = entry.path().strip_prefix(&root).ok()?;
                reference_from_relative(relative).map(Ok)
            }
            Err(err) => {
                warn!(error = %err, "Failed to read site entry");
                let err = err
                    .into_io_error()
                    .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "filesystem loop"));
                Some(Err(ContentError::Io(err)))
            }
        });
        Ok(Box::new(references))
    }
}

fn reference_from_relative(relative: &Path) -> Option<String> {
    let parts: Vec<String> = relative
        .components()
        .map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Option<_>>()?;
    if parts.len() < 2 {
        return None;
    }
    Some(format!("{}{}", CONTENT_PREFIX, parts.join("/")))
}

fn sidecar_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(PROPS_SUFFIX);
    PathBuf::from(name)
}

#[cfg(unix)]
fn is_restricted(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|meta| meta.permissions().mode() & 0o004 == 0)
        .unwrap_or(true)
}

#[cfg(not(unix))]
fn is_restricted(_path: &Path) -> bool {
    false
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}

fn is_sidecar(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().ends_with(PROPS_SUFFIX)
}

/// Content type by file extension.
pub fn content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "txt" | "text" | "log" => "text/plain",
        "md" | "markdown" => "text/markdown",
        "html" | "htm" => "text/html",
        "csv" => "text/csv",
        "json" => "application/json",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        _ => "application/octet-stream",
    }
}

/// Types read directly instead of going through the extractor.
pub fn is_text(content_type: &str) -> bool {
    content_type.starts_with("text/")
}
