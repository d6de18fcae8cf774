//! Discovery Module
//!
//! Directory-backed [`ResourceStore`]. Sources are read from one root, outputs
//! written under another, and pages are discovered by walking a pages
//! directory.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::cache::PipelineCache;
use crate::error::{PipelineError, Result};
use crate::resources::{ResourceKind, ResourceStore};

/// Directory created resources are written into, relative to the output root.
const ASSET_DIR: &str = "assets";

/// Hex digits of the content hash used in created file names.
const NAME_HASH_LEN: usize = 8;

#[derive(Debug, Clone)]
pub struct FsStore {
    source_root: PathBuf,
    output_root: PathBuf,
    pages_dir: PathBuf,
}

impl FsStore {
    /// Pages default to the `pages` directory under `source_root`.
    pub fn new(source_root: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            source_root: source_root.into(),
            output_root: output_root.into(),
            pages_dir: PathBuf::from("pages"),
        }
    }

    /// Relative to the source root. An empty path treats every file as a page.
    pub fn with_pages_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.pages_dir = dir.into();
        self
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// `path` joined onto `root`, or `None` when it would leave `root`.
    fn resolve(root: &Path, path: &str) -> Option<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        let contained = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        contained.then(|| root.join(relative))
    }

    fn write(&self, path: &str, text: &str) -> Result<()> {
        let target = Self::resolve(&self.output_root, path).ok_or_else(|| PipelineError::Io {
            path: path.to_string(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "path escapes the output root"),
        })?;
        let io_err = |source: io::Error| PipelineError::Io {
            path: target.to_string_lossy().to_string(),
            source,
        };
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        fs::write(&target, text).map_err(io_err)
    }
}

/// Forward-slash path of `path` relative to `root`.
fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    Some(parts.join("/"))
}

impl ResourceStore for FsStore {
    fn get_resource(&self, kind: ResourceKind, path: &str) -> Result<String> {
        let source = Self::resolve(&self.source_root, path)
            .ok_or_else(|| PipelineError::not_found(kind, path))?;
        fs::read_to_string(&source).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => PipelineError::not_found(kind, path),
            _ => PipelineError::Io {
                path: source.to_string_lossy().to_string(),
                source: e,
            },
        })
    }

    fn write_resource(&self, _kind: ResourceKind, path: &str, text: &str) -> Result<()> {
        self.write(path, text)
    }

    /// Written as `assets/<stem>-<hash>.<ext>`, where `stem` is the file stem
    /// of the resource it was extracted from.
    fn create_resource(&self, kind: ResourceKind, text: &str, source_path: &str) -> Result<String> {
        let stem = Path::new(source_path)
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .unwrap_or("resource");
        let mut hash = PipelineCache::compute_hash(text);
        hash.truncate(NAME_HASH_LEN);
        let path = format!("/{}/{}-{}.{}", ASSET_DIR, stem, hash, kind.extension());
        self.write(&path, text)?;
        debug!(path = %path, source = source_path, "created resource file");
        Ok(path)
    }

    fn list_pages(&self) -> Result<Vec<String>> {
        let dir = self.source_root.join(&self.pages_dir);
        if !dir.exists() {
            warn!(dir = %dir.display(), "pages directory does not exist");
            return Ok(Vec::new());
        }

        let mut pages = Vec::new();
        for entry in WalkDir::new(&dir).follow_links(true) {
            let entry = entry.map_err(|e| PipelineError::Io {
                path: dir.to_string_lossy().to_string(),
                source: e.into(),
            })?;
            if entry.file_type().is_file() {
                if let Some(key) = relative_key(&self.source_root, entry.path()) {
                    pages.push(key);
                }
            }
        }
        pages.sort();
        Ok(pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, TempDir, FsStore) {
        let src = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        fs::create_dir_all(src.path().join("pages/blog")).unwrap();
        fs::create_dir_all(src.path().join("parts")).unwrap();
        fs::write(src.path().join("pages/index.html"), "<p>home</p>").unwrap();
        fs::write(src.path().join("pages/blog/post.html"), "<p>post</p>").unwrap();
        fs::write(src.path().join("parts/nav.html"), "<nav></nav>").unwrap();
        let store = FsStore::new(src.path(), out.path());
        (src, out, store)
    }

    #[test]
    fn lists_pages_under_the_pages_dir() {
        let (_src, _out, store) = setup();
        assert_eq!(
            store.list_pages().unwrap(),
            vec!["pages/blog/post.html", "pages/index.html"]
        );
    }

    #[test]
    fn reads_sources_and_reports_missing_ones() {
        let (_src, _out, store) = setup();
        assert_eq!(
            store.get_resource(ResourceKind::Markup, "/parts/nav.html").unwrap(),
            "<nav></nav>"
        );
        assert!(matches!(
            store.get_resource(ResourceKind::Markup, "parts/missing.html"),
            Err(PipelineError::ResourceNotFound { .. })
        ));
    }

    #[test]
    fn paths_cannot_leave_their_roots() {
        let (src, out, store) = setup();
        fs::write(src.path().join("secret.txt"), "TOP SECRET").unwrap();
        let nested = FsStore::new(src.path().join("parts"), out.path().join("site"));

        assert!(matches!(
            nested.get_resource(ResourceKind::Markup, "../secret.txt"),
            Err(PipelineError::ResourceNotFound { .. })
        ));
        assert!(matches!(
            store.get_resource(ResourceKind::Markup, "pages/../../secret.txt"),
            Err(PipelineError::ResourceNotFound { .. })
        ));
        assert!(matches!(
            nested.write_resource(ResourceKind::Markup, "../escaped.html", "x"),
            Err(PipelineError::Io { .. })
        ));
        assert!(!out.path().join("escaped.html").exists());
        assert_eq!(
            store.get_resource(ResourceKind::Markup, "./parts/nav.html").unwrap(),
            "<nav></nav>"
        );
    }

    #[test]
    fn writes_outputs_and_named_resources() {
        let (_src, out, store) = setup();
        store
            .write_resource(ResourceKind::Markup, "pages/index.html", "<html></html>")
            .unwrap();
        assert_eq!(
            fs::read_to_string(out.path().join("pages/index.html")).unwrap(),
            "<html></html>"
        );

        let path = store
            .create_resource(ResourceKind::Style, "p{}", "components/card.html")
            .unwrap();
        assert!(path.starts_with("/assets/card-"));
        assert!(path.ends_with(".css"));
        assert_eq!(
            fs::read_to_string(out.path().join(path.trim_start_matches('/'))).unwrap(),
            "p{}"
        );
    }
}
