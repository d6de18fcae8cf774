//! Pipeline cache: memoized masters, compiled units and content links.
//!
//! Owned by exactly one [`crate::Pipeline`]. Fragment and component reads hand
//! out deep clones so callers can mutate freely; the masters stay untouched.

use std::collections::HashMap;
use std::rc::Rc;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::component::{Component, Fragment};
use crate::error::{PipelineError, Result};
use crate::evaluator::Invocable;
use crate::resources::ResourceKind;

/// Hex digits kept from the content digest.
const HASH_LEN: usize = 16;

/// A created incidental resource, keyed in the cache by content hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkEntry {
    pub kind: ResourceKind,
    pub source_path: String,
    pub path: String,
}

#[derive(Debug, Default)]
pub struct PipelineCache {
    pages: HashMap<String, Fragment>,
    fragments: HashMap<String, Fragment>,
    components: HashMap<String, Component>,
    expressions: HashMap<String, Rc<dyn Invocable>>,
    scripts: HashMap<String, Rc<dyn Invocable>>,
    external_scripts: HashMap<String, String>,
    links: HashMap<String, LinkEntry>,
}

impl PipelineCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compute_hash(content: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        let mut hex = format!("{:x}", hasher.finalize());
        hex.truncate(HASH_LEN);
        hex
    }

    // Pages

    pub fn has_page(&self, path: &str) -> bool {
        self.pages.contains_key(path)
    }

    pub fn get_page(&self, path: &str) -> Result<Fragment> {
        self.pages
            .get(path)
            .map(Fragment::duplicate)
            .ok_or_else(|| PipelineError::cache_miss("page", path))
    }

    pub fn store_page(&mut self, fragment: Fragment) {
        debug!(path = %fragment.path, "cached page");
        self.pages.insert(fragment.path.clone(), fragment);
    }

    // Fragments

    pub fn has_fragment(&self, path: &str) -> bool {
        self.fragments.contains_key(path)
    }

    pub fn get_fragment(&self, path: &str) -> Result<Fragment> {
        self.fragments
            .get(path)
            .map(Fragment::duplicate)
            .ok_or_else(|| PipelineError::cache_miss("fragment", path))
    }

    pub fn store_fragment(&mut self, fragment: Fragment) {
        debug!(path = %fragment.path, "cached fragment");
        self.fragments.insert(fragment.path.clone(), fragment);
    }

    // Components

    pub fn has_component(&self, path: &str) -> bool {
        self.components.contains_key(path)
    }

    pub fn get_component(&self, path: &str) -> Result<Component> {
        self.components
            .get(path)
            .map(Component::duplicate)
            .ok_or_else(|| PipelineError::cache_miss("component", path))
    }

    pub fn store_component(&mut self, component: Component) {
        debug!(path = %component.path, "cached component");
        self.components.insert(component.path.clone(), component);
    }

    // Compiled units, keyed by literal text

    pub fn has_expression(&self, text: &str) -> bool {
        self.expressions.contains_key(text)
    }

    pub fn get_expression(&self, text: &str) -> Result<Rc<dyn Invocable>> {
        self.expressions
            .get(text)
            .cloned()
            .ok_or_else(|| PipelineError::cache_miss("expression", text))
    }

    pub fn store_expression(&mut self, text: &str, unit: Rc<dyn Invocable>) {
        self.expressions.insert(text.to_string(), unit);
    }

    pub fn has_script(&self, text: &str) -> bool {
        self.scripts.contains_key(text)
    }

    pub fn get_script(&self, text: &str) -> Result<Rc<dyn Invocable>> {
        self.scripts
            .get(text)
            .cloned()
            .ok_or_else(|| PipelineError::cache_miss("script", text))
    }

    pub fn store_script(&mut self, text: &str, unit: Rc<dyn Invocable>) {
        self.scripts.insert(text.to_string(), unit);
    }

    // External script text, keyed by resource path

    pub fn has_external_script(&self, path: &str) -> bool {
        self.external_scripts.contains_key(path)
    }

    pub fn get_external_script(&self, path: &str) -> Result<String> {
        self.external_scripts
            .get(path)
            .cloned()
            .ok_or_else(|| PipelineError::cache_miss("external script", path))
    }

    pub fn store_external_script(&mut self, path: &str, text: String) {
        self.external_scripts.insert(path.to_string(), text);
    }

    // Content links, keyed by content hash

    pub fn has_link(&self, hash: &str) -> bool {
        self.links.contains_key(hash)
    }

    pub fn get_link(&self, hash: &str) -> Result<LinkEntry> {
        self.links
            .get(hash)
            .cloned()
            .ok_or_else(|| PipelineError::cache_miss("link", hash))
    }

    pub fn store_link(&mut self, hash: &str, entry: LinkEntry) {
        self.links.insert(hash.to_string(), entry);
    }

    /// Empty every mapping.
    pub fn clear(&mut self) {
        self.pages.clear();
        self.fragments.clear();
        self.components.clear();
        self.expressions.clear();
        self.scripts.clear();
        self.external_scripts.clear();
        self.links.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
            && self.fragments.is_empty()
            && self.components.is_empty()
            && self.expressions.is_empty()
            && self.scripts.is_empty()
            && self.external_scripts.is_empty()
            && self.links.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Document, NodeKind};

    fn fragment(path: &str, text: &str) -> Fragment {
        let mut document = Document::new();
        let node = document.create(NodeKind::text(text));
        document.append_child(document.root(), node).unwrap();
        Fragment::new(path, document)
    }

    #[test]
    fn get_without_store_is_a_cache_miss() {
        let cache = PipelineCache::new();
        assert!(!cache.has_fragment("a.html"));
        assert!(matches!(
            cache.get_fragment("a.html"),
            Err(PipelineError::CacheMiss { kind: "fragment", .. })
        ));
        assert!(cache.get_link("abc").is_err());
    }

    #[test]
    fn fragment_reads_are_independent_clones() {
        let mut cache = PipelineCache::new();
        cache.store_fragment(fragment("a.html", "hello"));

        let mut first = cache.get_fragment("a.html").unwrap();
        let second = cache.get_fragment("a.html").unwrap();
        assert_eq!(first.document, second.document);

        let root = first.document.root();
        let child = first.document.children(root)[0];
        first.document.set_kind(child, NodeKind::text("changed"));
        assert_eq!(
            cache.get_fragment("a.html").unwrap().document.text_content(root),
            "hello"
        );
    }

    #[test]
    fn clear_empties_everything() {
        let mut cache = PipelineCache::new();
        cache.store_page(fragment("index.html", "x"));
        cache.store_external_script("a.js", "let a = 1;".into());
        cache.store_link(
            "h",
            LinkEntry {
                kind: ResourceKind::Style,
                source_path: "a.html".into(),
                path: "/a.css".into(),
            },
        );
        assert!(!cache.is_empty());
        cache.clear();
        assert!(cache.is_empty());
        assert!(!cache.has_page("index.html"));
    }

    #[test]
    fn hashes_are_short_and_stable() {
        let a = PipelineCache::compute_hash("p { color: red }");
        assert_eq!(a.len(), HASH_LEN);
        assert_eq!(a, PipelineCache::compute_hash("p { color: red }"));
        assert_ne!(a, PipelineCache::compute_hash("p { color: blue }"));
    }
}
