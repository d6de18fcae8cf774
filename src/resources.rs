//! Resource backend contract.
//!
//! The pipeline never touches storage directly; it reads sources and writes
//! outputs through a [`ResourceStore`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Markup,
    Script,
    Style,
}

impl ResourceKind {
    /// Output file extension for created resources of this kind.
    pub fn extension(self) -> &'static str {
        match self {
            ResourceKind::Markup => "html",
            ResourceKind::Script => "js",
            ResourceKind::Style => "css",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResourceKind::Markup => "markup",
            ResourceKind::Script => "script",
            ResourceKind::Style => "style",
        })
    }
}

pub trait ResourceStore {
    fn get_resource(&self, kind: ResourceKind, path: &str) -> Result<String>;

    fn write_resource(&self, kind: ResourceKind, path: &str, text: &str) -> Result<()>;

    /// Materialize a new incidental resource and return its output path.
    fn create_resource(&self, kind: ResourceKind, text: &str, source_path: &str) -> Result<String>;

    /// Give an already-created resource a path specific to a new origin.
    /// `None` means the backend does not relink and the original path is kept.
    fn relink_created_resource(
        &self,
        _kind: ResourceKind,
        _text: &str,
        _source_path: &str,
        _original_path: &str,
    ) -> Option<Result<String>> {
        None
    }

    /// Paths of every page the backend knows about.
    fn list_pages(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedResource {
    pub kind: ResourceKind,
    pub source_path: String,
    pub path: String,
}

/// In-memory backend. Records every write and create call.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sources: HashMap<(ResourceKind, String), String>,
    pages: Vec<String>,
    relink: bool,
    writes: RefCell<Vec<(ResourceKind, String, String)>>,
    created: RefCell<Vec<CreatedResource>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resource(mut self, kind: ResourceKind, path: &str, text: &str) -> Self {
        self.insert(kind, path, text);
        self
    }

    pub fn with_markup(self, path: &str, text: &str) -> Self {
        self.with_resource(ResourceKind::Markup, path, text)
    }

    /// Register a markup source and list it as a page.
    pub fn with_page(mut self, path: &str, text: &str) -> Self {
        self.insert(ResourceKind::Markup, path, text);
        self.pages.push(path.to_string());
        self
    }

    /// Relink created resources per distinct source path.
    pub fn with_relinking(mut self) -> Self {
        self.relink = true;
        self
    }

    pub fn insert(&mut self, kind: ResourceKind, path: &str, text: &str) {
        self.sources.insert((kind, path.to_string()), text.to_string());
    }

    pub fn writes(&self) -> Vec<(ResourceKind, String, String)> {
        self.writes.borrow().clone()
    }

    /// Text written to `path`, if any. The latest write wins.
    pub fn written(&self, path: &str) -> Option<String> {
        self.writes
            .borrow()
            .iter()
            .rev()
            .find(|(_, p, _)| p == path)
            .map(|(_, _, text)| text.clone())
    }

    pub fn created(&self) -> Vec<CreatedResource> {
        self.created.borrow().clone()
    }
}

impl ResourceStore for MemoryStore {
    fn get_resource(&self, kind: ResourceKind, path: &str) -> Result<String> {
        self.sources
            .get(&(kind, path.to_string()))
            .cloned()
            .ok_or_else(|| PipelineError::not_found(kind, path))
    }

    fn write_resource(&self, kind: ResourceKind, path: &str, text: &str) -> Result<()> {
        self.writes
            .borrow_mut()
            .push((kind, path.to_string(), text.to_string()));
        Ok(())
    }

    fn create_resource(&self, kind: ResourceKind, text: &str, source_path: &str) -> Result<String> {
        let mut created = self.created.borrow_mut();
        let path = format!("/generated/{}-{}.{}", kind, created.len(), kind.extension());
        created.push(CreatedResource {
            kind,
            source_path: source_path.to_string(),
            path: path.clone(),
        });
        self.writes
            .borrow_mut()
            .push((kind, path.clone(), text.to_string()));
        Ok(path)
    }

    fn relink_created_resource(
        &self,
        _kind: ResourceKind,
        _text: &str,
        source_path: &str,
        original_path: &str,
    ) -> Option<Result<String>> {
        if !self.relink {
            return None;
        }
        Some(Ok(format!("{}?from={}", original_path, source_path)))
    }

    fn list_pages(&self) -> Result<Vec<String>> {
        Ok(self.pages.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_resources_are_not_found() {
        let store = MemoryStore::new().with_markup("a.html", "<p>a</p>");
        assert_eq!(store.get_resource(ResourceKind::Markup, "a.html").unwrap(), "<p>a</p>");
        let err = store.get_resource(ResourceKind::Script, "a.html").unwrap_err();
        assert!(matches!(
            err,
            PipelineError::ResourceNotFound { kind: ResourceKind::Script, .. }
        ));
    }

    #[test]
    fn create_records_calls_and_output() {
        let store = MemoryStore::new();
        let path = store
            .create_resource(ResourceKind::Style, "p{}", "card.html")
            .unwrap();
        assert_eq!(path, "/generated/style-0.css");
        assert_eq!(store.created().len(), 1);
        assert_eq!(store.written(&path).as_deref(), Some("p{}"));
    }

    #[test]
    fn relinking_is_opt_in() {
        let plain = MemoryStore::new();
        assert!(plain
            .relink_created_resource(ResourceKind::Style, "", "b.html", "/x.css")
            .is_none());

        let relinking = MemoryStore::new().with_relinking();
        let path = relinking
            .relink_created_resource(ResourceKind::Style, "", "b.html", "/x.css")
            .unwrap()
            .unwrap();
        assert_eq!(path, "/x.css?from=b.html");
    }
}
